use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::ReconcilerConfig;
use crate::state::ApiCache;
use crate::voting::ledger::VoteLedger;

/// Periodically rewrites `vote_count` from the vote table, repairing drift
/// left by increments that failed after their ballot was stored.
pub struct CountReconciler {
    ledger: VoteLedger,
    interval: Duration,
    cache: Arc<ApiCache>,
}

impl CountReconciler {
    pub fn new(ledger: VoteLedger, config: &ReconcilerConfig, cache: Arc<ApiCache>) -> Self {
        Self {
            ledger,
            interval: config.interval(),
            cache,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            "Starting vote count reconciler every {}s",
            self.interval.as_secs()
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    match changed {
                        Ok(_) => {
                            if *shutdown.borrow() {
                                info!("Reconciler shutdown signal received");
                                break;
                            }
                        }
                        Err(_) => {
                            warn!("Shutdown channel closed unexpectedly. Exiting reconciler loop");
                            break;
                        }
                    }
                }
                _ = sleep(self.interval) => {
                    self.tick().await;
                }
            }
        }

        Ok(())
    }

    /// A failed pass is logged and retried on the next interval.
    async fn tick(&self) -> u64 {
        match self.ledger.reconcile_counts().await {
            Ok(0) => {
                debug!("Vote counters consistent");
                0
            }
            Ok(repaired) => {
                self.cache.invalidate_listings();
                info!("Reconciler repaired {repaired} vote counters");
                repaired
            }
            Err(err) => {
                warn!("Vote count reconciliation failed: {err}");
                0
            }
        }
    }
}
