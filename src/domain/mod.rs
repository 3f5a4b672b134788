pub mod fixture;
pub mod prediction;

pub use fixture::*;
pub use prediction::*;
