//! Background sweeps: stale-match force draws and completed-match
//! eviction.  Per-match errors are swallowed; the sweeps always keep
//! running.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info};

use crate::context::ApplicationContext;

const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// Completed matches are evicted from memory after this long; the
/// database rows remain.
const COMPLETED_RETENTION_MS: u64 = 30 * 60 * 1000;

pub fn start_sweepers(ctx: Arc<ApplicationContext>) -> JoinHandle<()> {
    let mut shutdown_rx = ctx.shutdown_receiver();
    tokio::spawn(async move {
        let mut ticker = interval(SWEEP_INTERVAL);
        ticker.tick().await; // the immediate first tick
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    info!("Stopping sweepers");
                    break;
                }
                _ = ticker.tick() => {
                    let stale = ctx
                        .cleanup_stale_matches(ctx.config.stale_match_timeout_ms)
                        .await;
                    let evicted = ctx.cleanup_completed_matches(COMPLETED_RETENTION_MS).await;
                    debug!("Sweep done: {stale} stale, {evicted} evicted");
                }
            }
        }
    })
}
