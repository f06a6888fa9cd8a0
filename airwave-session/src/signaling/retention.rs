use crate::signaling::SignalBus;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    pub sweep_interval: Duration,
    pub max_age: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(30),
            max_age: Duration::from_secs(60),
        }
    }
}

/// Periodically deletes stale signaling rows. Never synchronised with any
/// handshake; abort the handle to stop it.
pub fn spawn_retention_sweep(bus: Arc<dyn SignalBus>, policy: RetentionPolicy) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(policy.sweep_interval);
        // First tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match bus.purge_older_than(policy.max_age).await {
                Ok(0) => {}
                Ok(n) => debug!(purged = n, "retention sweep"),
                Err(e) => warn!("Retention sweep failed: {}", e),
            }
        }
    })
}
