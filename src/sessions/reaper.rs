//! Background expiry of idle conversation state

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::StateStore;

/// Periodically reset users idle longer than `idle_timeout` to the greeting
pub fn spawn_reaper(
    store: Arc<dyn StateStore>,
    idle_timeout: Duration,
    every: Duration,
) -> JoinHandle<()> {
    tracing::info!(
        idle_timeout_secs = idle_timeout.as_secs(),
        interval_secs = every.as_secs(),
        "session reaper enabled"
    );

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // Skip the first immediate tick
        interval.tick().await;

        loop {
            interval.tick().await;
            match store.reap_idle(idle_timeout).await {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, "reaped idle conversations"),
                Err(e) => tracing::warn!(error = %e, "session reaping failed"),
            }
        }
    })
}
