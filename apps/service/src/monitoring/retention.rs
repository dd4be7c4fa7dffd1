//! Pruning of old ping history.
//!
//! Only the newest `keep_per_monitor` results of each monitor are retained.
//! The pass runs on a fixed interval as a background task.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::database::Database;

/// How much history to keep and how often to enforce it
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    pub keep_per_monitor: usize,
    pub interval: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self { keep_per_monitor: 100, interval: Duration::from_secs(3600) }
    }
}

/// Cleanup manager for old ping results
pub struct RetentionCleanup {
    database: Arc<dyn Database>,
    policy: RetentionPolicy,
}

impl RetentionCleanup {
    pub fn new(database: Arc<dyn Database>, policy: RetentionPolicy) -> Self {
        Self { database, policy }
    }

    /// One pruning pass. Returns the number of deleted rows.
    pub async fn prune(&self) -> Result<u64> {
        let deleted = self.database.prune_ping_results(self.policy.keep_per_monitor).await?;

        if deleted > 0 {
            info!(deleted, keep = self.policy.keep_per_monitor, "Pruned ping history");
        }
        Ok(deleted)
    }

    /// Start background cleanup task
    pub fn start_periodic_cleanup(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.policy.interval);

            loop {
                interval.tick().await;

                match self.prune().await {
                    Ok(_) => debug!("Periodic history cleanup completed"),
                    Err(e) => warn!("Periodic history cleanup failed: {:#}", e),
                }
            }
        })
    }
}
