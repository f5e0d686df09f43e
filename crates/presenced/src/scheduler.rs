//! Periodic absence snapshot regeneration.

use crate::engine::EngineHandle;
use chrono::Local;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Regenerate today's absences every `period` until the engine goes away.
pub fn spawn_absence_scheduler(engine: EngineHandle, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let today = Local::now().date_naive();
            match engine
                .with_store(move |s| s.generate_absences(today).map(<[_]>::len))
                .await
            {
                Ok(absent) => tracing::debug!(%today, absent, "absence snapshot refreshed"),
                Err(crate::engine::EngineError::ChannelClosed) => {
                    tracing::info!("engine gone; absence scheduler stopping");
                    break;
                }
                Err(e) => tracing::error!(error = %e, "absence snapshot failed"),
            }
        }
    })
}
