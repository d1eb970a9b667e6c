use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use barberbook::config::Config;
use barberbook::engine::spawn_cleanup_task;
use barberbook::realtime::{start_watchers, ChangeFeed, SqliteChangeFeed};
use barberbook::startup::run_startup_checks;
use barberbook::AppState;

#[derive(Parser, Debug)]
#[command(name = "barberbook")]
#[command(author, version, about = "Barbershop booking server with a live staff feed", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "barberbook.toml", env = "BARBERBOOK_CONFIG")]
    config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)?;

    // Initialize logging
    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting BarberBook v{}", env!("CARGO_PKG_VERSION"));

    // Initialize database (creates the data directory)
    let db = barberbook::db::init(&config.server.data_dir).await?;
    barberbook::db::seed_defaults(&db).await?;

    let feed: Arc<dyn ChangeFeed> = Arc::new(SqliteChangeFeed::new(
        db.clone(),
        Duration::from_millis(config.watchers.poll_interval_ms.max(10)),
    ));

    let report = run_startup_checks(&config, &db, feed.as_ref()).await;
    if !report.all_critical_passed {
        anyhow::bail!("Startup checks failed: {}", report.summary);
    }

    let metrics_handle = barberbook::api::metrics::init_metrics()?;
    let state = Arc::new(
        AppState::new(config.clone(), db.clone())
            .context("Invalid scheduling configuration")?
            .with_metrics(metrics_handle),
    );

    // Change feed -> realtime hub
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let watchers = match report.feed_capability.as_ref() {
        Some(capability) if config.watchers.enabled => start_watchers(
            feed,
            capability,
            state.hub.clone(),
            Duration::from_secs(config.watchers.retry_delay_secs),
            shutdown_rx,
        ),
        _ => {
            tracing::warn!("Change watchers disabled; dashboards will not receive live updates");
            Vec::new()
        }
    };

    spawn_cleanup_task(db.clone(), config.cleanup.clone());

    let app = barberbook::api::create_router(state.clone());

    let api_addr = format!("{}:{}", config.server.host, config.server.api_port);
    let listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("Failed to bind {}", api_addr))?;

    tracing::info!("API server listening on http://{}", api_addr);
    tracing::info!("Realtime socket at ws://{}/socket", api_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop watchers before the pool goes away
    let _ = shutdown_tx.send(true);
    for handle in watchers {
        let collection = handle.collection;
        if let Err(e) = handle.task.await {
            tracing::warn!(collection = %collection, error = %e, "Watcher task ended abnormally");
        }
    }

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
