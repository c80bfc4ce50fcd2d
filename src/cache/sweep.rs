use super::TtlCache;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(600_000);

/// Spawn the periodic sweep. Runs until `shutdown` is cancelled.
pub fn spawn_sweeper<V>(
    cache: Arc<TtlCache<V>>,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()>
where
    V: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // The first tick fires immediately; nothing can be stale yet.
        interval.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("cache sweeper shutting down");
                    break;
                }
                _ = interval.tick() => {
                    let removed = cache.sweep_expired();
                    if removed > 0 {
                        debug!(removed, remaining = cache.len(), "swept expired cache entries");
                    }
                }
            }
        }
    })
}
