//! Main application entry point for the position server
//!
//! Loads configuration, publishes the shared area, runs the proximity service
//! and feeds it trigger updates read from stdin until a shutdown signal.

mod cli;
mod config;
mod feed;
mod logging;
mod signals;
mod simulation;

use anyhow::{anyhow, Context};
use cli::CliArgs;
use config::AppConfig;
use position_system::{
    create_position_store, spawn_proximity_service, PositionStore, ProximityHandle, StoreEvent,
};
use std::path::Path;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

// ============================================================================
// Application
// ============================================================================

pub struct Application {
    config: AppConfig,
    store: Arc<PositionStore>,
    proximity: ProximityHandle,
    proximity_task: JoinHandle<()>,
}

impl Application {
    pub async fn new(args: CliArgs) -> anyhow::Result<Self> {
        // Load configuration first (before logging setup)
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }
        if args.json_logs {
            config.logging.json_format = true;
        }
        if let Some(players) = args.players {
            config.simulation.players = players;
        }
        if let Some(radius) = args.radius {
            config.proximity.radius = radius;
        }

        config
            .validate()
            .map_err(|e| anyhow!("Configuration validation failed: {}", e))?;

        logging::setup_logging(&config.logging)?;

        let base_dir = args
            .config_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let options = config.to_area_options(base_dir).await?;

        let store = create_position_store();
        let area = store.configure(&options).context("publishing area")?;

        let policy = config.policy().map_err(|e| anyhow!(e))?;
        let (proximity, proximity_task) =
            spawn_proximity_service(Arc::clone(&store), config.trigger_set(&area), policy)?;

        info!(
            "📂 Config: {} | Radius: {} | Policy: {:?}",
            args.config_path.display(),
            config.proximity.radius,
            policy
        );

        Ok(Self {
            config,
            store,
            proximity,
            proximity_task,
        })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        info!("🌟 Starting position server");

        let observer = tokio::spawn(observe_store(Arc::clone(&self.store)));

        let mut players = simulation::spawn_players(
            &self.store,
            self.config.simulation.players,
            self.config.attach_timeout(),
        )
        .await?;

        // Initial triggers get their first pass once players are placed.
        if !self.config.proximity.initial_triggers.is_empty() {
            let triggers = self.config.proximity.initial_triggers.clone();
            self.proximity
                .apply(position_system::TriggerCommand::SetTriggers(triggers))
                .await?;
        }

        let feed = {
            let proximity = self.proximity.clone();
            tokio::spawn(async move {
                let stdin = BufReader::new(tokio::io::stdin());
                if let Err(e) = feed::run_control_feed(stdin, proximity).await {
                    error!("❌ Control feed stopped: {:#}", e);
                }
            })
        };

        info!("✅ Position server is running with {} clients", self.store.client_count());
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        let received = signals::wait_for_shutdown().await?;

        info!("🛑 Received {}, detaching clients...", received);
        feed.abort();
        simulation::stop_players(&mut players);
        self.proximity_task.abort();
        observer.abort();

        info!("✅ Position server shutdown complete");
        Ok(())
    }
}

/// Logs store changes, resyncing from a snapshot after lag.
async fn observe_store(store: Arc<PositionStore>) {
    let mut events = store.subscribe();
    loop {
        match events.recv().await {
            Ok(StoreEvent::Attached(client_id)) => debug!("👀 {} attached", client_id),
            Ok(StoreEvent::Updated { client_id, record }) => debug!(
                "👀 {} moved to normalized ({:?}, {:?})",
                client_id, record.norm_x, record.norm_y
            ),
            Ok(StoreEvent::ProximityChanged {
                client_id,
                proximity,
            }) => info!("👀 {} proximity: {:?}", client_id, proximity),
            Ok(StoreEvent::Detached(client_id)) => debug!("👀 {} detached", client_id),
            Err(RecvError::Lagged(skipped)) => {
                let snapshot = store.snapshot();
                let active = snapshot
                    .iter()
                    .filter(|client| client.proximity.is_some_and(|p| p.is_active()))
                    .count();
                warn!(
                    "👀 Observer skipped {} events; resynced {} clients ({} active)",
                    skipped,
                    snapshot.len(),
                    active
                );
            }
            Err(RecvError::Closed) => break,
        }
    }
}

// ============================================================================
// Entry Point
// ============================================================================

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:#}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("❌ Failed to start application: {:#}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}
