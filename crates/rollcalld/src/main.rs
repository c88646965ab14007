use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use rollcall_core::{
    AccessLedger, DecisionCore, Error, EventLocks, EventRegistry, IdentityStore, Notifier,
};
use rollcall_store::SqliteStore;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod embedder;
mod engine;

use config::{Bus, Config};
use dbus_interface::{AttendanceService, BUS_NAME, OBJECT_PATH};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("rollcalld starting");

    let config = Config::load().context("failed to load configuration")?;
    tracing::info!(
        db = %config.db_path.display(),
        bus = ?config.bus,
        threshold = config.similarity_threshold,
        margin = config.ambiguity_margin,
        dim = config.embedding_dim,
        "configuration loaded"
    );

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let store = Arc::new(
        SqliteStore::open(&config.db_path)
            .await
            .context("failed to open database")?,
    );

    let identities = IdentityStore::new(Arc::clone(&store), config.embedding_dim);
    if let Some(name) = &config.admin_name {
        match identities.provision_admin(name, Utc::now()).await {
            Ok(admin) => tracing::info!(id = %admin.id, "administrator bootstrapped"),
            Err(Error::AdminAlreadyProvisioned) => {
                tracing::debug!("administrator already provisioned")
            }
            Err(err) => return Err(err).context("failed to provision administrator"),
        }
    }

    let engine = engine::spawn_engine(embedder::PrecomputedEmbedder, config.detection_timeout())
        .context("failed to start embedding engine")?;

    let locks = EventLocks::new();
    let service = AttendanceService {
        identities,
        ledger: AccessLedger::new(Arc::clone(&store)),
        registry: EventRegistry::new(Arc::clone(&store), locks.clone()),
        core: DecisionCore::new(
            Arc::clone(&store),
            locks,
            config.match_policy(),
            config.embedding_dim,
        ),
        notices: Notifier::new(Arc::clone(&store)),
        engine,
    };

    let builder = match config.bus {
        Bus::System => zbus::connection::Builder::system()?,
        Bus::Session => zbus::connection::Builder::session()?,
    };
    let _conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await
        .context("failed to register on D-Bus")?;

    tracing::info!(name = BUS_NAME, path = OBJECT_PATH, "rollcalld ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("rollcalld shutting down");

    Ok(())
}
