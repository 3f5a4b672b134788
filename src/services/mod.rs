pub mod lock;
pub mod settlement;
pub mod sync;

pub use lock::{LockGate, LockSweeper};
pub use settlement::{SettlementEngine, SettlementReport, SettlementStore};
pub use sync::{CachePolicy, CycleEntry, FixtureSync, SyncReport, SyncSource, SyncStore};
