use thiserror::Error;

use crate::domain::LockReason;

/// Main error type for the fixture pipeline
#[derive(Error, Debug)]
pub enum ProdeError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// A required credential or mapping is absent. Fatal, never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// HTTP-level failure against the fixture provider. Recoverable at
    /// day granularity during a window scan.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The provider answered HTTP 200 but reported a logical failure in
    /// the response envelope (rate limits and plan restrictions arrive
    /// this way). Recoverable, but logged distinctly from transport
    /// failures.
    #[error("Provider error: {0}")]
    ProviderLogic(String),

    /// A prediction write was rejected by the lock gate. User-facing,
    /// not a system fault.
    #[error("Predictions locked: {0}")]
    Locked(LockReason),

    #[error("Not found: {0}")]
    NotFound(String),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl ProdeError {
    /// Whether a window scan may skip past this failure and continue
    /// with the next day. Everything else aborts the cycle.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ProdeError::Transport(_) | ProdeError::ProviderLogic(_))
    }
}

impl From<reqwest::Error> for ProdeError {
    fn from(err: reqwest::Error) -> Self {
        ProdeError::Transport(err.to_string())
    }
}

/// Result type alias for ProdeError
pub type Result<T> = std::result::Result<T, ProdeError>;
