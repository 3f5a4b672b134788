use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub lock: LockConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Upstream fixture provider settings
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// REST base URL of the fixture provider
    #[serde(default = "default_api_base_url")]
    pub base_url: String,
    /// Host header value expected by the provider
    #[serde(default = "default_api_host")]
    pub host: String,
    /// Provider API key. Absence is a fatal configuration error at call
    /// time, checked before any network traffic.
    #[serde(default)]
    pub key: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base_url(),
            host: default_api_host(),
            key: None,
        }
    }
}

fn default_api_base_url() -> String {
    "https://v3.football.api-sports.io".to_string()
}

fn default_api_host() -> String {
    "v3.football.api-sports.io".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

/// Day-window and cache-freshness settings for the sync engine
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Days scanned into the past (results catch-up)
    #[serde(default = "default_back_days")]
    pub back_days: u32,
    /// Days scanned into the future (fixture discovery)
    #[serde(default = "default_forward_days")]
    pub forward_days: u32,
    /// TTL when the tournament has a match today
    #[serde(default = "default_live_ttl_minutes")]
    pub live_ttl_minutes: u64,
    /// TTL when nothing is scheduled today
    #[serde(default = "default_idle_ttl_hours")]
    pub idle_ttl_hours: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            back_days: default_back_days(),
            forward_days: default_forward_days(),
            live_ttl_minutes: default_live_ttl_minutes(),
            idle_ttl_hours: default_idle_ttl_hours(),
        }
    }
}

fn default_back_days() -> u32 {
    3
}

fn default_forward_days() -> u32 {
    14
}

fn default_live_ttl_minutes() -> u64 {
    10
}

fn default_idle_ttl_hours() -> u64 {
    24
}

/// Betting-lock cutoffs
#[derive(Debug, Clone, Deserialize)]
pub struct LockConfig {
    /// Minutes before kickoff at which submissions are rejected
    #[serde(default = "default_submission_cutoff_minutes")]
    pub submission_cutoff_minutes: i64,
    /// Minutes before kickoff at which the batch sweep flips the stored
    /// flag (coarser than the submission gate, guards client clock skew)
    #[serde(default = "default_sweep_cutoff_minutes")]
    pub sweep_cutoff_minutes: i64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            submission_cutoff_minutes: default_submission_cutoff_minutes(),
            sweep_cutoff_minutes: default_sweep_cutoff_minutes(),
        }
    }
}

fn default_submission_cutoff_minutes() -> i64 {
    30
}

fn default_sweep_cutoff_minutes() -> i64 {
    15
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    /// Points awarded per exact outcome pick
    #[serde(default = "default_points_exact")]
    pub points_exact: i32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            points_exact: default_points_exact(),
        }
    }
}

fn default_points_exact() -> i32 {
    3
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Shared secret expected as a bearer token on the cron trigger
    /// endpoints. When unset the triggers are open (dev mode).
    #[serde(default)]
    pub cron_secret: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            cron_secret: None,
        }
    }
}

fn default_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("database.max_connections", 5)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g. config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("PRODE_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (PRODE__API__KEY, etc.)
            .add_source(
                Environment::with_prefix("PRODE")
                    .separator("__")
                    .try_parsing(true),
            );

        let mut cfg: AppConfig = builder.build()?.try_deserialize()?;

        // Credential fallback kept for compatibility with existing
        // deployments that export the provider's conventional variable.
        if cfg.api.key.is_none() {
            cfg.api.key = std::env::var("API_FOOTBALL_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty());
        }

        Ok(cfg)
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.database.url.trim().is_empty() {
            errors.push("database.url must not be empty".to_string());
        }

        if self.database.max_connections == 0 {
            errors.push("database.max_connections must be positive".to_string());
        }

        if self.sync.forward_days == 0 {
            errors.push("sync.forward_days must be positive".to_string());
        }

        if self.sync.live_ttl_minutes == 0 || self.sync.idle_ttl_hours == 0 {
            errors.push("sync TTLs must be positive".to_string());
        }

        if self.lock.submission_cutoff_minutes <= 0 {
            errors.push("lock.submission_cutoff_minutes must be positive".to_string());
        }

        if self.lock.sweep_cutoff_minutes <= 0 {
            errors.push("lock.sweep_cutoff_minutes must be positive".to_string());
        }

        if self.lock.sweep_cutoff_minutes > self.lock.submission_cutoff_minutes {
            errors.push(
                "lock.sweep_cutoff_minutes must not exceed lock.submission_cutoff_minutes"
                    .to_string(),
            );
        }

        if self.scoring.points_exact <= 0 {
            errors.push("scoring.points_exact must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
