//! ringlinkd - The ringlink background service
//!
//! Wires together:
//! - Configuration loading
//! - Store initialization
//! - HTTP metric source (relay proxy or direct)
//! - Display link server
//! - The bridge (configuration state, fetch cycles, delivery)
//! - Periodic refresh scheduling

use anyhow::{Context, Result};
use clap::Parser;
use ringlink_config::load_config;
use ringlink_core::{Bridge, CycleOutcome, FollowUp, RefreshScheduler};
use ringlink_http::HttpSource;
use ringlink_ipc::{DisplayServer, ServerMessage};
use ringlink_store::{SqliteStore, Store};
use ringlink_util::{
    default_config_path, is_mock_time_active, now, RINGLINK_DATA_DIR_ENV, RINGLINK_SOCKET_ENV,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// ringlinkd - Ring metrics bridge for a watch display
#[derive(Parser, Debug)]
#[command(name = "ringlinkd")]
#[command(about = "Fetches ring metrics and delivers them to the watch display", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/ringlink/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Socket path override (or set RINGLINK_SOCKET env var)
    #[arg(short, long, env = RINGLINK_SOCKET_ENV)]
    socket: Option<PathBuf>,

    /// Data directory override (or set RINGLINK_DATA_DIR env var)
    #[arg(short, long, env = RINGLINK_DATA_DIR_ENV)]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

struct Service {
    bridge: Arc<Bridge>,
    display: Arc<DisplayServer>,
}

impl Service {
    async fn new(args: &Args) -> Result<Self> {
        let config = load_config(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?;

        info!(config_path = %args.config.display(), "Configuration loaded");

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

        let db_path = data_dir.join("ringlink.db");
        let store: Arc<dyn Store> = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );

        if store.is_healthy() {
            info!(db_path = %db_path.display(), "Store initialized");
        } else {
            warn!(db_path = %db_path.display(), "Store health check failed");
        }

        let source = HttpSource::new(&config.upstream).context("Failed to create HTTP source")?;

        let mut display = DisplayServer::new(&socket_path, config.delivery.ack_timeout);
        display.start().await?;
        let display = Arc::new(display);

        info!(socket_path = %socket_path.display(), "Display link started");

        let bridge = Arc::new(Bridge::new(
            store,
            Arc::new(source),
            display.clone(),
            &config,
        ));

        Ok(Self { bridge, display })
    }

    async fn run(self) -> Result<()> {
        let mut messages = self
            .display
            .take_message_receiver()
            .context("Display message receiver already taken")?;

        let display_accept = self.display.clone();
        tokio::spawn(async move {
            if let Err(e) = display_accept.run().await {
                error!(error = %e, "Display link error");
            }
        });

        let mut sigterm = signal(SignalKind::terminate())
            .context("Failed to create SIGTERM handler")?;
        let mut sigint = signal(SignalKind::interrupt())
            .context("Failed to create SIGINT handler")?;
        let mut sighup = signal(SignalKind::hangup())
            .context("Failed to create SIGHUP handler")?;

        let mut scheduler = RefreshScheduler::new(self.bridge.refresh_period());

        info!(
            refresh_minutes = scheduler.period().as_secs() / 60,
            "Service running"
        );

        spawn_refresh(&self.bridge, "startup");

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP, shutting down gracefully");
                    break;
                }

                _ = scheduler.wait() => {
                    if self.bridge.is_refresh_due(now()) {
                        spawn_refresh(&self.bridge, "schedule");
                    } else {
                        debug!("Data still fresh, skipping scheduled refresh");
                    }
                }

                Some(msg) = messages.recv() => {
                    self.handle_message(msg, &mut scheduler);
                }
            }
        }

        info!("Shutting down ringlinkd");
        self.display.shutdown();
        info!("Shutdown complete");
        Ok(())
    }

    fn handle_message(&self, msg: ServerMessage, scheduler: &mut RefreshScheduler) {
        match msg {
            ServerMessage::DisplayConnected { client_id } => {
                info!(client_id = %client_id, "Display attached");
                spawn_refresh(&self.bridge, "display connected");
            }
            ServerMessage::DisplayDisconnected { client_id } => {
                info!(client_id = %client_id, "Display detached");
            }
            ServerMessage::RequestData { client_id } => {
                info!(client_id = %client_id, "Display requested data");
                spawn_refresh(&self.bridge, "display request");
            }
            ServerMessage::ConfigurationClosed { client_id, response } => {
                info!(
                    client_id = %client_id,
                    has_response = response.is_some(),
                    "Configuration closed"
                );

                let outcome = self.bridge.apply_settings(response.as_deref());

                if outcome.change.frequency_changed {
                    scheduler.rearm(self.bridge.refresh_period());
                }

                match outcome.follow_up {
                    FollowUp::Refresh => spawn_refresh(&self.bridge, "settings"),
                    FollowUp::Rejected(reason) => warn!(reason = %reason, "Settings ignored"),
                    other => debug!(follow_up = ?other, "Settings applied"),
                }
            }
        }
    }
}

fn spawn_refresh(bridge: &Arc<Bridge>, trigger: &'static str) {
    let bridge = bridge.clone();
    tokio::spawn(async move {
        match bridge.refresh().await {
            CycleOutcome::Delivered { cycle_id, attempts } => {
                info!(trigger, cycle = %cycle_id, attempts, "Refresh delivered");
            }
            CycleOutcome::DeliveryFailed { cycle_id, error } => {
                warn!(trigger, cycle = %cycle_id, error = %error, "Refresh not delivered");
            }
            CycleOutcome::Superseded { cycle_id } => {
                debug!(trigger, cycle = %cycle_id, "Refresh superseded");
            }
            CycleOutcome::NotConfigured(reason) => {
                info!(trigger, reason = %reason, "Refresh skipped");
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "ringlinkd starting"
    );

    if is_mock_time_active() {
        warn!(now = %now(), "Mock time is active; upstream dates follow it");
    }

    let service = Service::new(&args).await?;
    service.run().await
}
