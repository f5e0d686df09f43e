use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
mod kiosk;
mod notify;
mod provider;
mod scheduler;

use config::{BusKind, Config};
use presence_core::{DataLayout, EuclideanMatcher, Store};
use provider::HttpEmbeddingProvider;

const BUS_NAME: &str = "org.presence.Attendance1";
const OBJECT_PATH: &str = "/org/presence/Attendance1";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "presenced starting");

    let config = Config::load().context("failed to load configuration")?;
    tracing::info!(
        data_dir = %config.data_dir.display(),
        provider = %config.provider_url,
        tolerance = config.tolerance,
        "configuration loaded"
    );

    let store = Store::open(
        DataLayout::new(&config.data_dir),
        EuclideanMatcher::new(config.tolerance, config.embedding_dim),
    )
    .context("failed to open data directory")?;

    let provider_url = config.provider_url.clone();
    let timeout = Duration::from_secs(config.provider_timeout_secs);
    let engine = engine::spawn_engine(store, move || {
        HttpEmbeddingProvider::new(&provider_url, timeout)
    })
    .await
    .context("failed to start engine")?;

    let service = dbus_interface::AttendanceService::new(
        engine.clone(),
        config.provider_url.clone(),
        config.kiosk.enabled,
    );
    let builder = match config.bus {
        BusKind::System => zbus::connection::Builder::system()?,
        BusKind::Session => zbus::connection::Builder::session()?,
    };
    let _conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await
        .with_context(|| format!("failed to register {BUS_NAME} on the {:?} bus", config.bus))?;

    let scheduler = scheduler::spawn_absence_scheduler(
        engine.clone(),
        Duration::from_secs(config.absence_interval_secs.max(1)),
    );

    let quit = Arc::new(AtomicBool::new(false));
    let kiosk = if config.kiosk.enabled {
        let notifier = notify::from_config(config.notify_command.as_deref());
        Some(
            kiosk::spawn_kiosk(config.kiosk.clone(), engine.clone(), notifier, quit.clone())
                .context("failed to start kiosk")?,
        )
    } else {
        None
    };

    tracing::info!(bus = ?config.bus, name = BUS_NAME, "presenced ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("presenced shutting down");

    quit.store(true, Ordering::Relaxed);
    scheduler.abort();
    if let Some(handle) = kiosk {
        // The kiosk may be waiting on a check-in; join off the runtime.
        tokio::task::spawn_blocking(move || handle.join())
            .await?
            .map_err(|_| anyhow::anyhow!("kiosk thread panicked"))?;
    }

    Ok(())
}
