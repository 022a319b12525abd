//! cadenced - the cadence maintenance service
//!
//! It wires together:
//! - Configuration loading
//! - Store initialization
//! - The maintenance sweep, shared by the scheduler and the HTTP trigger
//! - One-shot maintenance commands

use anyhow::{Context, Result};
use cadence_config::{load_config, ServiceConfig};
use cadence_core::{MaintenanceSweep, SessionActions, SessionLifecycle, SweepTrigger};
use cadence_store::{AuditEvent, AuditEventType, SqliteStore, Store};
use cadence_util::default_config_path;
use cadenced::http::{build_router, request_timeout, AppState};
use cadenced::scheduler;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// cadenced - session lifecycle and schedule maintenance
#[derive(Parser, Debug)]
#[command(name = "cadenced")]
#[command(about = "Session lifecycle and recurring-schedule maintenance service", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/cadence/config.toml)
    #[arg(short, long, env = "CADENCE_CONFIG", default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Data directory override (or set CADENCE_DATA_DIR env var)
    #[arg(short, long, env = "CADENCE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP trigger and the daily scheduled sweep (default)
    Serve {
        /// Trigger address override (or set CADENCE_BIND env var)
        #[arg(short, long, env = "CADENCE_BIND")]
        bind: Option<SocketAddr>,
    },

    /// Run one maintenance sweep and exit; fails on a fatal phase
    Sweep,

    /// Grant the missing star of every completed session
    BackfillStars,
}

struct Service {
    config: ServiceConfig,
    store: Arc<dyn Store>,
    sweep: Arc<MaintenanceSweep>,
}

impl Service {
    fn new(args: &Args) -> Result<Self> {
        let mut config = if args.config.exists() {
            let config = load_config(&args.config)
                .with_context(|| format!("Failed to load config from {:?}", args.config))?;
            info!(config_path = %args.config.display(), "Configuration loaded");
            config
        } else {
            warn!(
                config_path = %args.config.display(),
                "Config file not found, using defaults"
            );
            ServiceConfig::default()
        };

        if let Some(data_dir) = &args.data_dir {
            config.service.data_dir = data_dir.clone();
        }

        let data_dir = &config.service.data_dir;
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        let db_path = config.service.database_path();
        let store: Arc<dyn Store> = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );
        info!(db_path = %db_path.display(), "Store initialized");

        let sweep = Arc::new(MaintenanceSweep::new(store.clone(), config.sweep.clone()));

        Ok(Self {
            config,
            store,
            sweep,
        })
    }

    async fn serve(self, bind: Option<SocketAddr>) -> Result<()> {
        let bind = bind.unwrap_or(self.config.service.bind);
        let cron_secret = self.config.service.cron_secret();
        if cron_secret.is_none() {
            warn!(
                env = %self.config.service.cron_secret_env,
                "No cron secret configured, the maintenance trigger is open"
            );
        }

        self.store
            .append_audit(AuditEvent::new(AuditEventType::ServiceStarted))?;

        let cancel = CancellationToken::new();
        let scheduler_handle = tokio::spawn(scheduler::run(
            self.sweep.clone(),
            self.config.service.sweep_at,
            cancel.clone(),
        ));

        let state = AppState {
            sweep: self.sweep.clone(),
            store: self.store.clone(),
            cron_secret: cron_secret.map(Arc::from),
        };
        let app = build_router(state, request_timeout(self.config.sweep.phase_timeout));

        let listener = tokio::net::TcpListener::bind(bind)
            .await
            .with_context(|| format!("Failed to bind {}", bind))?;
        info!(%bind, "Maintenance trigger listening");

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
        let shutdown = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully"),
                _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully"),
            }
            shutdown.cancel();
        });

        info!("Service running");
        axum::serve(listener, app)
            .with_graceful_shutdown(cancel.clone().cancelled_owned())
            .await
            .context("HTTP server error")?;

        cancel.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(5), scheduler_handle).await;

        if let Err(e) = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::ServiceStopped))
        {
            warn!(error = %e, "Failed to log service shutdown");
        }
        info!("Shutdown complete");
        Ok(())
    }

    async fn sweep_once(self) -> Result<()> {
        let report = self
            .sweep
            .run(cadence_util::now(), SweepTrigger::Manual)
            .await
            .context("Maintenance sweep failed")?;

        for warning in &report.warnings {
            warn!(warning = %warning, "Sweep completed with warning");
        }
        println!("{}", serde_json::to_string_pretty(&report.to_response())?);
        Ok(())
    }

    fn backfill_stars(self) -> Result<()> {
        let actions = SessionActions::new(self.store, SessionLifecycle::new(self.config.lifecycle));
        let granted = actions
            .backfill_star_awards(cadence_util::now().naive_local())
            .context("Star backfill failed")?;
        println!("Granted {} missing star(s)", granted);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "cadenced starting");
    if cadence_util::is_mock_time_active() {
        warn!(now = %cadence_util::now(), "Mock time is active");
    }

    let service = Service::new(&args)?;
    let result = match args.command {
        None => service.serve(None).await,
        Some(Command::Serve { bind }) => service.serve(bind).await,
        Some(Command::Sweep) => service.sweep_once().await,
        Some(Command::BackfillStars) => service.backfill_stars(),
    };

    if let Err(e) = &result {
        error!(error = %format!("{:#}", e), "cadenced failed");
    }
    result
}
