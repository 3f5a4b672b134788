use clap::{Parser, Subcommand};
use uuid::Uuid;

/// Fixture sync, lock, and settlement pipeline
#[derive(Debug, Parser)]
#[command(name = "prode-pipeline", version, about)]
pub struct Cli {
    /// Directory with default.toml / <env>.toml configuration files
    #[arg(long, default_value = "config", env = "PRODE_CONFIG_DIR")]
    pub config_dir: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP server exposing scheduler triggers and admin entry points
    Serve,

    /// Run one sync cycle (all active tournaments, or a single one)
    Sync {
        /// Tournament id; omit to sync every active tournament
        #[arg(long)]
        tournament: Option<Uuid>,
    },

    /// Flip the stored lock flag for matches about to start
    LockSweep,

    /// Settle every prediction of a slip
    Settle {
        /// Slip id
        slip: Uuid,
    },

    /// Run database migrations and exit
    Migrate,
}
