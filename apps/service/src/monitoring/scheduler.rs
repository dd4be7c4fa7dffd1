use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use chrono::Utc;
use futures::future::join_all;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use uuid::Uuid;

use super::aggregator::ReliabilityAggregator;
use super::checker::Checker;
use super::types::CheckResult;
use crate::database::Database;

/// Background loop handle, present while the scheduler runs
struct Running {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Periodically probes every due monitor and records the outcome
pub struct PingService {
    db: Arc<dyn Database>,
    checker: Arc<dyn Checker>,
    aggregator: Arc<ReliabilityAggregator>,
    tick: Duration,
    running: Mutex<Option<Running>>,
}

impl PingService {
    pub fn new(
        db: Arc<dyn Database>,
        checker: Arc<dyn Checker>,
        aggregator: Arc<ReliabilityAggregator>,
        tick: Duration,
    ) -> Self {
        Self { db, checker, aggregator, tick, running: Mutex::new(None) }
    }

    pub fn aggregator(&self) -> &Arc<ReliabilityAggregator> {
        &self.aggregator
    }

    /// Start the tick loop. A second call while running does nothing and
    /// returns false.
    pub async fn start(self: &Arc<Self>) -> bool {
        let mut running = self.running.lock().await;
        if running.is_some() {
            tracing::debug!("ping service already running");
            return false;
        }

        let (shutdown, mut shutdown_rx) = oneshot::channel();
        let service = self.clone();

        let handle = tokio::spawn(async move {
            // The first tick completes immediately, giving the initial full pass.
            let mut timer = interval(service.tick);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = timer.tick() => {
                        // Ticks keep their cadence even when a pass runs long.
                        let service = service.clone();
                        tokio::spawn(async move {
                            if let Err(e) = service.check_all_monitors().await {
                                tracing::error!("Scheduled check pass failed: {:#}", e);
                            }
                        });
                    }
                }
            }

            tracing::info!("Ping service stopped");
        });

        *running = Some(Running { shutdown, handle });
        tracing::info!(tick_seconds = self.tick.as_secs(), "Ping service started");
        true
    }

    /// Cancel the timer. Checks already in flight finish on their own.
    pub async fn stop(&self) {
        if let Some(Running { shutdown, handle }) = self.running.lock().await.take() {
            let _ = shutdown.send(());
            if let Err(e) = handle.await {
                tracing::warn!("Ping service loop ended abnormally: {}", e);
            }
        }
    }

    #[cfg(test)]
    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Probe one monitor now. A monitor deleted in the meantime is a no-op
    /// and yields `None`.
    pub async fn check_monitor(&self, monitor_id: Uuid) -> Result<Option<CheckResult>> {
        let Some(monitor) = self.db.get_monitor(monitor_id).await? else {
            tracing::debug!(%monitor_id, "skipping check of unknown monitor");
            return Ok(None);
        };

        let outcome = self.checker.probe(&monitor.url).await;
        let result = CheckResult::new(monitor_id).with_outcome(outcome);

        tracing::debug!(
            %monitor_id,
            url = %monitor.url,
            status = %result.status,
            response_time = ?result.response_time,
            "check finished"
        );

        if self.aggregator.record(&result).await? { Ok(Some(result)) } else { Ok(None) }
    }

    /// One scheduler pass: probe every due monitor concurrently and wait
    /// for all of them. Returns how many monitors were checked.
    pub async fn check_all_monitors(&self) -> Result<usize> {
        let now = Utc::now();
        let due: Vec<Uuid> = self
            .db
            .get_all_monitors()
            .await?
            .into_iter()
            .filter(|monitor| monitor.is_due(now))
            .map(|monitor| monitor.id)
            .collect();

        let results = join_all(due.iter().map(|id| self.check_monitor(*id))).await;

        for (monitor_id, result) in due.iter().zip(&results) {
            if let Err(e) = result {
                tracing::error!(%monitor_id, "Error checking monitor: {:#}", e);
            }
        }

        Ok(due.len())
    }

    /// Check a monitor in the background, logging instead of returning errors.
    pub fn spawn_check(self: &Arc<Self>, monitor_id: Uuid) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            if let Err(e) = service.check_monitor(monitor_id).await {
                tracing::error!(%monitor_id, "Initial check failed: {:#}", e);
            }
        })
    }

    /// Fail loudly when a caller asks for a monitor that does not exist.
    pub async fn check_existing(&self, monitor_id: Uuid) -> Result<CheckResult> {
        self.check_monitor(monitor_id).await?.ok_or_else(|| anyhow!("monitor {monitor_id} not found"))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use chrono::{DateTime, Duration as ChronoDuration};

    use super::*;
    use crate::database::{DatabaseImpl, Monitor, MonitorUpdate, NewMonitor, NewPingResult, PingResult};
    use crate::monitoring::types::{MonitorStatus, ProbeOutcome};
    use crate::test_support::create_test_database;

    /// Answers `Up` for everything and remembers what it was asked.
    #[derive(Default)]
    struct FakeChecker {
        probed: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl Checker for FakeChecker {
        async fn probe(&self, url: &str) -> ProbeOutcome {
            self.probed.lock().unwrap().push(url.to_string());
            ProbeOutcome::up(7)
        }
    }

    fn service(db: Arc<DatabaseImpl>, checker: Arc<FakeChecker>) -> Arc<PingService> {
        let aggregator = Arc::new(ReliabilityAggregator::new(db.clone()));
        Arc::new(PingService::new(db, checker, aggregator, Duration::from_secs(30)))
    }

    async fn seed(db: &DatabaseImpl, url: &str, interval: u32) -> Uuid {
        db.create_monitor(NewMonitor { name: url.into(), url: url.into(), interval, password_hash: "h".into() })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn only_due_monitors_are_probed() {
        let (db, _dir) = create_test_database().await;
        let every_minute = seed(&db, "https://fast.example", 1).await;
        let hourly = seed(&db, "https://slow.example", 60).await;
        let fresh = seed(&db, "https://new.example", 60).await;

        let two_minutes_ago = Utc::now() - ChronoDuration::minutes(2);
        for id in [every_minute, hourly] {
            db.update_monitor_status(id, MonitorStatus::Up, Some(1), two_minutes_ago).await.unwrap();
        }

        let checker = Arc::new(FakeChecker::default());
        let checked = service(db.clone(), checker.clone()).check_all_monitors().await.unwrap();

        assert_eq!(checked, 2);
        let probed: HashSet<String> = checker.probed.lock().unwrap().iter().cloned().collect();
        assert_eq!(probed, HashSet::from(["https://fast.example".to_string(), "https://new.example".to_string()]));

        let fresh = db.get_monitor(fresh).await.unwrap().unwrap();
        assert_eq!(fresh.status, MonitorStatus::Up);
        assert_eq!(fresh.response_time, Some(7));
        let hourly = db.get_monitor(hourly).await.unwrap().unwrap();
        assert_eq!(hourly.total_checks, 1);
    }

    #[tokio::test]
    async fn checking_a_deleted_monitor_does_nothing() {
        let (db, _dir) = create_test_database().await;
        let checker = Arc::new(FakeChecker::default());

        let result = service(db, checker.clone()).check_monitor(Uuid::new_v4()).await.unwrap();

        assert!(result.is_none());
        assert!(checker.probed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn start_is_idempotent_and_runs_an_initial_pass() {
        let (db, _dir) = create_test_database().await;
        let id = seed(&db, "https://a.example", 5).await;
        let service = service(db.clone(), Arc::new(FakeChecker::default()));

        assert!(service.start().await);
        assert!(!service.start().await);

        let mut checked = false;
        for _ in 0..50 {
            if db.get_monitor(id).await.unwrap().unwrap().total_checks > 0 {
                checked = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(checked);

        service.stop().await;
        assert!(!service.is_running().await);
        assert!(service.start().await);
        service.stop().await;
    }

    #[tokio::test]
    async fn spawned_check_records_the_result() {
        let (db, _dir) = create_test_database().await;
        let id = seed(&db, "https://a.example", 5).await;
        let service = service(db.clone(), Arc::new(FakeChecker::default()));

        service.spawn_check(id).await.unwrap();

        assert_eq!(db.get_ping_results(id, 24).await.unwrap().len(), 1);
        assert!(service.check_existing(Uuid::new_v4()).await.is_err());
    }

    /// Storage whose lookups fail for one monitor.
    struct BrokenLookup {
        inner: Arc<DatabaseImpl>,
        broken: Uuid,
    }

    #[async_trait::async_trait]
    impl Database for BrokenLookup {
        async fn get_all_monitors(&self) -> Result<Vec<Monitor>> {
            self.inner.get_all_monitors().await
        }

        async fn get_monitor(&self, id: Uuid) -> Result<Option<Monitor>> {
            if id == self.broken {
                anyhow::bail!("storage unavailable for {id}");
            }
            self.inner.get_monitor(id).await
        }

        async fn create_monitor(&self, monitor: NewMonitor) -> Result<Monitor> {
            self.inner.create_monitor(monitor).await
        }

        async fn update_monitor(&self, id: Uuid, update: MonitorUpdate) -> Result<bool> {
            self.inner.update_monitor(id, update).await
        }

        async fn delete_monitor(&self, id: Uuid) -> Result<bool> {
            self.inner.delete_monitor(id).await
        }

        async fn update_monitor_status(
            &self,
            id: Uuid,
            status: MonitorStatus,
            response_time: Option<u64>,
            timestamp: DateTime<Utc>,
        ) -> Result<bool> {
            self.inner.update_monitor_status(id, status, response_time, timestamp).await
        }

        async fn create_ping_result(&self, result: NewPingResult) -> Result<PingResult> {
            self.inner.create_ping_result(result).await
        }

        async fn get_ping_results(&self, monitor_id: Uuid, limit: usize) -> Result<Vec<PingResult>> {
            self.inner.get_ping_results(monitor_id, limit).await
        }

        async fn get_all_ping_results(&self, limit: usize) -> Result<HashMap<Uuid, Vec<PingResult>>> {
            self.inner.get_all_ping_results(limit).await
        }

        async fn prune_ping_results(&self, keep: usize) -> Result<u64> {
            self.inner.prune_ping_results(keep).await
        }

        async fn check_duplicate_url(&self, url: &str, exclude: Option<Uuid>) -> Result<bool> {
            self.inner.check_duplicate_url(url, exclude).await
        }
    }

    #[tokio::test]
    async fn one_failing_monitor_does_not_stop_the_others() {
        let (db, _dir) = create_test_database().await;
        let failing = seed(&db, "https://failing.example", 5).await;
        let healthy = seed(&db, "https://healthy.example", 5).await;

        let storage = Arc::new(BrokenLookup { inner: db.clone(), broken: failing });
        let aggregator = Arc::new(ReliabilityAggregator::new(storage.clone()));
        let service = PingService::new(storage, Arc::new(FakeChecker::default()), aggregator, Duration::from_secs(30));

        assert_eq!(service.check_all_monitors().await.unwrap(), 2);

        assert_eq!(db.get_monitor(failing).await.unwrap().unwrap().total_checks, 0);
        assert_eq!(db.get_monitor(healthy).await.unwrap().unwrap().total_checks, 1);
    }
}
