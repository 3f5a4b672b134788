use clap::Parser;
use prode_pipeline::adapters::{ApiFootballClient, PostgresStore};
use prode_pipeline::api::{create_router, AppState};
use prode_pipeline::cli::{Cli, Command};
use prode_pipeline::config::AppConfig;
use prode_pipeline::error::{ProdeError, Result};
use prode_pipeline::services::{FixtureSync, LockSweeper, SettlementEngine};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config_dir)?;
    init_logging(&config);

    if let Err(errors) = config.validate() {
        for e in &errors {
            error!("config: {e}");
        }
        return Err(ProdeError::Validation(format!(
            "invalid configuration ({} problems)",
            errors.len()
        )));
    }

    let store = PostgresStore::new(&config.database.url, config.database.max_connections).await?;
    let client = ApiFootballClient::new(&config.api);

    match cli.command {
        Command::Migrate => {
            store.migrate().await?;
        }
        Command::Sync { tournament } => {
            store.migrate().await?;
            let sync = FixtureSync::new(client, store, &config.sync);
            match tournament {
                Some(id) => {
                    let report = sync.sync_tournament(id).await?;
                    info!(source = ?report.source, merged = report.merged, "sync finished");
                }
                None => {
                    let entries = sync.sync_all().await?;
                    for entry in &entries {
                        match &entry.report {
                            Ok(report) => info!(
                                tournament = %entry.tournament,
                                source = ?report.source,
                                merged = report.merged,
                                "synced"
                            ),
                            Err(err) => warn!(tournament = %entry.tournament, error = %err, "sync failed"),
                        }
                    }
                }
            }
        }
        Command::LockSweep => {
            let sweeper = LockSweeper::new(store, &config.lock);
            let locked = sweeper.run_once().await?;
            info!(locked, "lock sweep finished");
        }
        Command::Settle { slip } => {
            let engine = SettlementEngine::new(store, config.scoring.points_exact);
            let report = engine.settle_slip(slip).await?;
            info!(
                settled = report.settled,
                scored_matches = report.scored_matches,
                "settlement finished"
            );
        }
        Command::Serve => {
            store.migrate().await?;

            let port = config.server.port;
            let state = AppState::new(store, client, Arc::new(config));
            let router = create_router(state);

            let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
            info!(%addr, "starting HTTP server");

            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
    }

    Ok(())
}

fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "info,prode_pipeline={},sqlx=warn",
            config.logging.level
        ))
    });

    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
