//! mixcritic-jobs - Track critique job pipeline
//!
//! Registers uploaded tracks, queues analysis/critique jobs, runs them
//! against the critique service and exposes their progress over HTTP
//! (polling view + SSE).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mixcritic_common::config::{default_config_path, load_toml_config};
use mixcritic_common::events::EventBus;
use mixcritic_jobs::config::{log_filter_directive, resolve_critic_api_key, ServiceConfig};
use mixcritic_jobs::services::{Critic, HttpCritic};
use mixcritic_jobs::workflow::{JobService, JobServiceConfig, PollingPolicy, Transitions, Watchdog};
use mixcritic_jobs::AppState;

/// Event bus capacity; slow SSE clients beyond this lag and skip ahead
const EVENT_BUS_CAPACITY: usize = 256;

/// Command-line arguments for mixcritic-jobs
#[derive(Parser, Debug)]
#[command(name = "mixcritic-jobs")]
#[command(about = "Track critique job pipeline")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "MIXCRITIC_JOBS_PORT")]
    port: Option<u16>,

    /// Root folder holding the database
    #[arg(short, long, env = "MIXCRITIC_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// TOML config file (default: ~/.config/mixcritic/mixcritic-jobs.toml)
    #[arg(short, long, env = "MIXCRITIC_JOBS_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args
        .config
        .clone()
        .or_else(|| default_config_path("mixcritic-jobs"));
    let toml_config = match &config_path {
        Some(path) => load_toml_config(path).context("Failed to load config file")?,
        None => Default::default(),
    };

    // Initialize tracing (RUST_LOG wins over the TOML level)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter_directive(&toml_config.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting mixcritic-jobs");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &config_path {
        info!("Config file: {}", path.display());
    }

    let config = ServiceConfig::resolve(args.port, args.root_folder.as_deref(), toml_config);
    info!("Root folder: {}", config.root_folder.display());
    info!("Database: {}", config.database_path.display());

    let db_pool = mixcritic_common::db::init_database(&config.database_path)
        .await
        .context("Failed to initialize database")?;
    info!("Database connection established");

    let event_bus = EventBus::new(EVENT_BUS_CAPACITY);

    let api_key = resolve_critic_api_key(&config.toml);
    let critic: Arc<dyn Critic> = Arc::new(
        HttpCritic::new(&config.toml.critic, api_key).context("Failed to create critic client")?,
    );
    info!("Critique service: {}", config.toml.critic.base_url);

    let transitions = Transitions::new(db_pool, event_bus, config.toml.jobs.max_lock_wait_ms);
    let jobs = Arc::new(JobService::new(
        transitions.clone(),
        critic,
        JobServiceConfig::from_toml(&config.toml),
    ));

    let report = jobs
        .recover_on_startup()
        .await
        .context("Failed to recover jobs from previous run")?;
    info!(
        interrupted = report.interrupted,
        requeued = report.requeued,
        "Startup recovery complete"
    );

    let shutdown = CancellationToken::new();
    let watchdog = Watchdog::from_config(transitions, &config.toml.jobs).spawn(shutdown.clone());

    let polling = PollingPolicy::new(Duration::from_millis(config.toml.jobs.poll_interval_ms));
    let state = AppState::new(jobs, polling);
    let app = mixcritic_jobs::build_router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    shutdown.cancel();
    if let Err(e) = watchdog.await {
        tracing::warn!(error = %e, "Watchdog task ended abnormally");
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
