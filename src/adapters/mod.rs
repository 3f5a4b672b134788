pub mod football_api;
pub mod postgres;

pub use football_api::{
    ApiFixture, ApiFootballClient, Envelope, FixtureProvider, LeagueHit,
};
pub use postgres::PostgresStore;
