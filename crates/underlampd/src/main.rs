//! underlampd - lifecycle controller for a rented game server
//!
//! Wires together:
//! - Configuration loading
//! - Audit store
//! - Cloud resource, daemon manager and notifier
//! - Lifecycle core and expiry dispatch
//! - IPC server

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use underlamp_config::load_config;
use underlamp_core::MonotonicClock;
use underlamp_host_cloud::{AliyunEcs, McsDaemon, notifier_from_config};
use underlamp_ipc::IpcServer;
use underlamp_store::{AuditEventType, SqliteStore, Store};
use underlamp_util::{default_config_path, is_mock_time_active};
use underlampd::{Collaborators, Service};

/// How often expired verification codes are purged
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(60);

/// underlampd - start, extend and stop a cloud-hosted game server on request
#[derive(Parser, Debug)]
#[command(name = "underlampd")]
#[command(about = "Lifecycle controller for a cloud-hosted game server", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/underlamp/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Socket path override (or set UNDERLAMP_SOCKET env var)
    #[arg(short, long, env = "UNDERLAMP_SOCKET")]
    socket: Option<PathBuf>,

    /// Data directory override (or set UNDERLAMP_DATA_DIR env var)
    #[arg(short, long, env = "UNDERLAMP_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log as JSON lines
    #[arg(long)]
    json_logs: bool,
}

async fn run(args: Args) -> Result<()> {
    let config = load_config(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    info!(
        config_path = %args.config.display(),
        operators = config.access.operators.len(),
        instance = %config.service.instance_name,
        "Configuration loaded"
    );

    let socket_path = args
        .socket
        .clone()
        .unwrap_or_else(|| config.service.socket_path.clone());
    let data_dir = args
        .data_dir
        .clone()
        .unwrap_or_else(|| config.service.data_dir.clone());

    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

    let db_path = data_dir.join("underlampd.db");
    let store: Arc<dyn Store> = Arc::new(
        SqliteStore::open(&db_path)
            .with_context(|| format!("Failed to open database {:?}", db_path))?,
    );
    info!(db_path = %db_path.display(), "Store initialized");

    let collaborators = Collaborators {
        resource: Arc::new(AliyunEcs::new(&config.resource)),
        daemon: Arc::new(
            McsDaemon::new(&config.daemon).context("Failed to set up daemon manager client")?,
        ),
        notifier: notifier_from_config(&config.notify)
            .context("Failed to set up notifier")?,
    };

    let mut ipc = IpcServer::new(&socket_path);
    ipc.start()
        .await
        .with_context(|| format!("Failed to bind socket {:?}", socket_path))?;
    let ipc = Arc::new(ipc);

    let (service, mut expiries) = Service::new(
        &config,
        collaborators,
        Arc::new(MonotonicClock::new()),
        store,
        ipc.clone(),
    );
    service.audit(AuditEventType::ServiceStarted {
        instance_name: config.service.instance_name.clone(),
    });

    let mut messages = ipc
        .take_message_receiver()
        .await
        .context("IPC message receiver already taken")?;

    let ipc_accept = ipc.clone();
    tokio::spawn(async move {
        if let Err(e) = ipc_accept.run().await {
            error!(error = %e, "IPC server error");
        }
    });

    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
    let mut sigint =
        signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
    let mut housekeeping = tokio::time::interval(HOUSEKEEPING_INTERVAL);

    info!(socket_path = %socket_path.display(), "Service running");

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
                break;
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down");
                break;
            }

            Some(fired) = expiries.recv() => {
                let service = service.clone();
                tokio::spawn(async move { service.handle_expiry(fired).await });
            }

            Some(msg) = messages.recv() => {
                service.handle_message(msg).await;
            }

            _ = housekeeping.tick() => {
                service.tick();
            }
        }
    }

    // In-flight sequences are abandoned, the next start re-reads the provider
    let state = service.orchestrator().lifecycle().state();
    if state.is_transitional() {
        info!(state = %state, "Exiting with an operation in flight");
    }

    service.announce_shutdown();
    service.audit(AuditEventType::ServiceStopped);
    ipc.shutdown();

    info!("Shutdown complete");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    if args.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }

    info!(version = env!("CARGO_PKG_VERSION"), "underlampd starting");
    if is_mock_time_active() {
        warn!("Mock time is active, displayed times are not real");
    }

    run(args).await
}
