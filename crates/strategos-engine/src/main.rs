//! Engine binary for the Strategos simulation core.
//!
//! Hosts the tick scheduler over every active session. It loads
//! configuration and the command catalog, opens the configured store,
//! brings authority cards in line with the catalog, and runs the scheduler
//! until Ctrl-C.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `STRATEGOS_CONFIG` (default
//!    `strategos-config.yaml`)
//! 2. Initialize structured logging (tracing)
//! 3. Load the catalog fragments
//! 4. Open the store (in-memory or `PostgreSQL`)
//! 5. Provision authority cards for active sessions
//! 6. Run the scheduler until shutdown

mod error;

use std::path::PathBuf;
use std::sync::Arc;

use strategos_catalog::CatalogIndex;
use strategos_core::alerts::{Alerter, StandardAlertSink};
use strategos_core::config::{EngineConfig, LogFormat, LoggingConfig, StorageBackend};
use strategos_core::scheduler::Scheduler;
use strategos_core::service::CardService;
use strategos_core::storage::{MemoryStore, Store, bounded};
use strategos_db::PgStore;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

/// Config file used when `STRATEGOS_CONFIG` is unset.
const DEFAULT_CONFIG_PATH: &str = "strategos-config.yaml";

/// Application entry point for the engine.
///
/// # Errors
///
/// Returns an error if any startup step fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::var("STRATEGOS_CONFIG")
        .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let config = EngineConfig::load_or_default(&config_path).map_err(EngineError::from)?;

    init_logging(&config.logging);
    info!(
        config = %config_path.display(),
        tick_interval_ms = config.scheduler.tick_interval_ms,
        backend = ?config.storage.backend,
        "strategos-engine starting"
    );

    let catalog = Arc::new(CatalogIndex::load(&config.catalog.sources()).map_err(EngineError::from)?);
    info!(
        catalog_version = catalog.version(),
        commands = catalog.command_count(),
        "Catalog loaded"
    );

    match config.storage.backend {
        StorageBackend::Memory => {
            warn!("Using in-memory storage; state is lost on exit");
            run(Arc::new(MemoryStore::new()), &config, catalog).await?;
        }
        StorageBackend::Postgres => {
            let store = Arc::new(
                PgStore::connect(&config.storage)
                    .await
                    .map_err(EngineError::from)?,
            );
            run(Arc::clone(&store), &config, catalog).await?;
            store.close().await;
        }
    }

    info!("strategos-engine shutdown complete");
    Ok(())
}

/// Install the tracing subscriber. `RUST_LOG` wins over the configured
/// level.
fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    match config.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

/// Provision cards, then drive the scheduler until Ctrl-C.
async fn run<S: Store>(
    store: Arc<S>,
    config: &EngineConfig,
    catalog: Arc<CatalogIndex>,
) -> Result<(), EngineError> {
    let timeout = config.scheduler.storage_timeout();

    let cards = CardService::new(Arc::clone(&store), catalog, timeout);
    let sessions = bounded(timeout, "list_active_sessions", store.list_active_sessions()).await?;
    for session in &sessions {
        match cards.provision(session.id).await {
            Ok(report) if report.created == 0 && report.updated == 0 => {}
            Ok(report) => info!(
                session_id = %session.id,
                created = report.created,
                updated = report.updated,
                "Session cards refreshed"
            ),
            Err(err) => warn!(session_id = %session.id, %err, "Card provisioning failed"),
        }
    }
    info!(sessions = sessions.len(), "Startup provisioning complete");

    let alerter = Arc::new(Alerter::new(
        StandardAlertSink::from_config(&config.alerts),
        &config.alerts,
    ));
    let scheduler = Scheduler::new(store, alerter, config.scheduler.clone());
    scheduler.run(shutdown_signal()).await;
    Ok(())
}

/// Resolves on Ctrl-C. If the handler cannot be installed the engine runs
/// until killed.
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(%err, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
