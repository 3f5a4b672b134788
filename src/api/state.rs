use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::adapters::{ApiFootballClient, PostgresStore};
use crate::config::AppConfig;

/// Shared application state for API handlers
#[derive(Clone)]
pub struct AppState {
    /// Canonical match store
    pub store: PostgresStore,

    /// Upstream fixture provider client
    pub client: ApiFootballClient,

    /// Loaded configuration
    pub config: Arc<AppConfig>,

    /// Application start time
    pub start_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(store: PostgresStore, client: ApiFootballClient, config: Arc<AppConfig>) -> Self {
        Self {
            store,
            client,
            config,
            start_time: Utc::now(),
        }
    }

    /// Get system uptime in seconds
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.start_time).num_seconds()
    }
}
