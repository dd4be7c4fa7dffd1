use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::types::CheckResult;
use crate::database::{Database, NewPingResult};

/// Folds check results into a monitor's counters and history.
///
/// Results for the same monitor are applied one at a time; different
/// monitors never wait on each other.
pub struct ReliabilityAggregator {
    db: Arc<dyn Database>,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl ReliabilityAggregator {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db, locks: Mutex::new(HashMap::new()) }
    }

    /// Hold the update lock of one monitor.
    pub async fn lock(&self, monitor_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(monitor_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Drop the lock entry of a deleted monitor.
    pub async fn forget(&self, monitor_id: Uuid) {
        self.locks.lock().await.remove(&monitor_id);
    }

    /// Apply one result. Returns false when the monitor is gone, in which
    /// case nothing is written.
    pub async fn record(&self, result: &CheckResult) -> Result<bool> {
        let _guard = self.lock(result.monitor_id).await;

        let updated = self
            .db
            .update_monitor_status(result.monitor_id, result.status, result.response_time, result.timestamp)
            .await?;

        if !updated {
            tracing::debug!(monitor_id = %result.monitor_id, "monitor disappeared before its result was recorded");
            return Ok(false);
        }

        self.db
            .create_ping_result(NewPingResult {
                monitor_id: result.monitor_id,
                status: result.status,
                response_time: result.response_time,
                timestamp: result.timestamp,
            })
            .await?;

        Ok(true)
    }
}
