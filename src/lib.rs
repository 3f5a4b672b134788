pub mod adapters;
pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;

pub use adapters::{ApiFootballClient, FixtureProvider, PostgresStore};
pub use config::AppConfig;
pub use domain::{
    LockReason, Match, MatchStatus, MatchUpsert, Outcome, Prediction, Slip, Tournament,
};
pub use error::{ProdeError, Result};
pub use services::{
    CachePolicy, FixtureSync, LockGate, LockSweeper, SettlementEngine, SettlementStore,
    SyncReport, SyncSource, SyncStore,
};
