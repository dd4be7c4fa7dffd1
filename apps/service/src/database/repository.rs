use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Row, params};
use uuid::Uuid;

use super::models::{Monitor, MonitorUpdate, NewMonitor, NewPingResult, PingResult};
use crate::monitoring::types::MonitorStatus;
use crate::pool::LibsqlPool;

const MONITOR_COLUMNS: &str = "id, name, url, interval_minutes, status, last_checked, response_time, \
     total_checks, successful_checks, uptime_percentage, password_hash, created_at";

/// Latest `?1` rows per monitor, numbered newest first.
const RANKED_PINGS: &str = "SELECT id, monitor_id, status, response_time, timestamp, rowid AS seq, \
     ROW_NUMBER() OVER (PARTITION BY monitor_id ORDER BY timestamp DESC, rowid DESC) AS position \
     FROM ping_results";

/// Another monitor already watches this URL.
#[derive(Debug, thiserror::Error)]
#[error("a monitor for {0} already exists")]
pub struct UrlTaken(pub String);

/// Turn the unique URL index firing into [`UrlTaken`].
fn map_url_conflict(error: libsql::Error, url: Option<&str>) -> anyhow::Error {
    match (&error, url) {
        (libsql::Error::SqliteFailure(_, message), Some(url)) if message.contains("UNIQUE constraint failed") => {
            UrlTaken(url.to_string()).into()
        }
        _ => error.into(),
    }
}

/// Database trait for abstracting database operations
#[async_trait]
pub trait Database: Send + Sync {
    /// Get every registered monitor, oldest registration first
    async fn get_all_monitors(&self) -> Result<Vec<Monitor>>;

    /// Get a monitor by id
    async fn get_monitor(&self, id: Uuid) -> Result<Option<Monitor>>;

    /// Insert a monitor in the `checking` state
    async fn create_monitor(&self, monitor: NewMonitor) -> Result<Monitor>;

    /// Apply a partial edit. Returns false when the monitor does not exist.
    async fn update_monitor(&self, id: Uuid, update: MonitorUpdate) -> Result<bool>;

    /// Delete a monitor and its ping history. Returns false when nothing was deleted.
    async fn delete_monitor(&self, id: Uuid) -> Result<bool>;

    /// Record one check against the monitor's counters in a single statement.
    /// Returns false when the monitor no longer exists.
    async fn update_monitor_status(
        &self,
        id: Uuid,
        status: MonitorStatus,
        response_time: Option<u64>,
        timestamp: DateTime<Utc>,
    ) -> Result<bool>;

    /// Append a ping result
    async fn create_ping_result(&self, result: NewPingResult) -> Result<PingResult>;

    /// Latest `limit` results for a monitor, oldest first
    async fn get_ping_results(&self, monitor_id: Uuid, limit: usize) -> Result<Vec<PingResult>>;

    /// Latest `limit` results of every monitor, oldest first per monitor
    async fn get_all_ping_results(&self, limit: usize) -> Result<HashMap<Uuid, Vec<PingResult>>>;

    /// Keep only the newest `keep` results per monitor
    async fn prune_ping_results(&self, keep: usize) -> Result<u64>;

    /// Whether another monitor already watches `url`
    async fn check_duplicate_url(&self, url: &str, exclude: Option<Uuid>) -> Result<bool>;
}

/// LibSQL database implementation
pub struct DatabaseImpl {
    pool: LibsqlPool,
}

impl DatabaseImpl {
    /// Create a new database instance from a pool
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<deadpool::managed::Object<crate::pool::LibsqlManager>> {
        Ok(self.pool.get().await?)
    }
}

fn monitor_from_row(row: &Row) -> Result<Monitor> {
    let id: String = row.get(0)?;
    let status: String = row.get(4)?;
    let last_checked: Option<i64> = row.get(5)?;
    let response_time: Option<i64> = row.get(6)?;

    Ok(Monitor {
        id: Uuid::parse_str(&id)?,
        name: row.get(1)?,
        url: row.get(2)?,
        interval: row.get::<i64>(3)? as u32,
        status: status.parse()?,
        last_checked: last_checked.map(Monitor::i64_to_timestamp),
        response_time: response_time.map(|v| v as u64),
        total_checks: row.get::<i64>(7)? as u64,
        successful_checks: row.get::<i64>(8)? as u64,
        uptime_percentage: row.get::<i64>(9)? as u8,
        password_hash: row.get(10)?,
        created_at: Monitor::i64_to_timestamp(row.get(11)?),
    })
}

fn ping_from_row(row: &Row) -> Result<PingResult> {
    let id: String = row.get(0)?;
    let monitor_id: String = row.get(1)?;
    let status: String = row.get(2)?;
    let response_time: Option<i64> = row.get(3)?;

    Ok(PingResult {
        id: Uuid::parse_str(&id)?,
        monitor_id: Uuid::parse_str(&monitor_id)?,
        status: status.parse()?,
        response_time: response_time.map(|v| v as u64),
        timestamp: Monitor::i64_to_timestamp(row.get(4)?),
    })
}

#[async_trait]
impl Database for DatabaseImpl {
    async fn get_all_monitors(&self) -> Result<Vec<Monitor>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(&format!("SELECT {MONITOR_COLUMNS} FROM monitors ORDER BY created_at ASC, rowid ASC"), ())
            .await?;

        let mut monitors = Vec::new();
        while let Some(row) = rows.next().await? {
            monitors.push(monitor_from_row(&row)?);
        }
        Ok(monitors)
    }

    async fn get_monitor(&self, id: Uuid) -> Result<Option<Monitor>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(&format!("SELECT {MONITOR_COLUMNS} FROM monitors WHERE id = ?"), params![id.to_string()])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(monitor_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn create_monitor(&self, monitor: NewMonitor) -> Result<Monitor> {
        let conn = self.get_conn().await?;
        let created = Monitor {
            id: Uuid::new_v4(),
            name: monitor.name,
            url: monitor.url,
            interval: monitor.interval,
            status: MonitorStatus::Checking,
            last_checked: None,
            response_time: None,
            total_checks: 0,
            successful_checks: 0,
            uptime_percentage: 100,
            password_hash: monitor.password_hash,
            created_at: Utc::now(),
        };

        conn.execute(
            "INSERT INTO monitors (id, name, url, interval_minutes, status, password_hash, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                created.id.to_string(),
                created.name.clone(),
                created.url.clone(),
                i64::from(created.interval),
                created.status.as_str(),
                created.password_hash.clone(),
                Monitor::timestamp_to_i64(created.created_at)
            ],
        )
        .await
        .map_err(|e| map_url_conflict(e, Some(created.url.as_str())))?;

        Ok(created)
    }

    async fn update_monitor(&self, id: Uuid, update: MonitorUpdate) -> Result<bool> {
        let conn = self.get_conn().await?;
        let url = update.url.clone();
        let changed = conn
            .execute(
                "UPDATE monitors SET name = COALESCE(?1, name), url = COALESCE(?2, url), \
                 interval_minutes = COALESCE(?3, interval_minutes) WHERE id = ?4",
                params![update.name, update.url, update.interval.map(i64::from), id.to_string()],
            )
            .await
            .map_err(|e| map_url_conflict(e, url.as_deref()))?;
        Ok(changed > 0)
    }

    async fn delete_monitor(&self, id: Uuid) -> Result<bool> {
        let conn = self.get_conn().await?;
        let tx = conn.transaction().await?;

        tx.execute("DELETE FROM ping_results WHERE monitor_id = ?", params![id.to_string()]).await?;
        let deleted = tx.execute("DELETE FROM monitors WHERE id = ?", params![id.to_string()]).await?;

        tx.commit().await?;
        Ok(deleted > 0)
    }

    async fn update_monitor_status(
        &self,
        id: Uuid,
        status: MonitorStatus,
        response_time: Option<u64>,
        timestamp: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.get_conn().await?;
        let success = i64::from(status.is_up());

        // SET expressions see the pre-update row, so the counters and the
        // rounded percentage move together.
        let changed = conn
            .execute(
                "UPDATE monitors SET \
                    status = ?1, \
                    response_time = ?2, \
                    last_checked = ?3, \
                    total_checks = total_checks + 1, \
                    successful_checks = successful_checks + ?4, \
                    uptime_percentage = (200 * (successful_checks + ?4) + (total_checks + 1)) / (2 * (total_checks + 1)) \
                 WHERE id = ?5",
                params![
                    status.as_str(),
                    response_time.map(|v| v as i64),
                    Monitor::timestamp_to_i64(timestamp),
                    success,
                    id.to_string()
                ],
            )
            .await?;
        Ok(changed > 0)
    }

    async fn create_ping_result(&self, result: NewPingResult) -> Result<PingResult> {
        let conn = self.get_conn().await?;
        let ping = PingResult {
            id: Uuid::new_v4(),
            monitor_id: result.monitor_id,
            status: result.status,
            response_time: result.response_time,
            timestamp: result.timestamp,
        };

        conn.execute(
            "INSERT INTO ping_results (id, monitor_id, status, response_time, timestamp) VALUES (?, ?, ?, ?, ?)",
            params![
                ping.id.to_string(),
                ping.monitor_id.to_string(),
                ping.status.as_str(),
                ping.response_time.map(|v| v as i64),
                Monitor::timestamp_to_i64(ping.timestamp)
            ],
        )
        .await?;

        Ok(ping)
    }

    async fn get_ping_results(&self, monitor_id: Uuid, limit: usize) -> Result<Vec<PingResult>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, monitor_id, status, response_time, timestamp FROM ping_results \
                 WHERE monitor_id = ? ORDER BY timestamp DESC, rowid DESC LIMIT ?",
                params![monitor_id.to_string(), limit as i64],
            )
            .await?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            results.push(ping_from_row(&row)?);
        }
        results.reverse();
        Ok(results)
    }

    async fn get_all_ping_results(&self, limit: usize) -> Result<HashMap<Uuid, Vec<PingResult>>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT id, monitor_id, status, response_time, timestamp FROM ({RANKED_PINGS}) \
                     WHERE position <= ?1 ORDER BY monitor_id, timestamp ASC, seq ASC"
                ),
                params![limit as i64],
            )
            .await?;

        let mut grouped: HashMap<Uuid, Vec<PingResult>> = HashMap::new();
        while let Some(row) = rows.next().await? {
            let ping = ping_from_row(&row)?;
            grouped.entry(ping.monitor_id).or_default().push(ping);
        }
        Ok(grouped)
    }

    async fn prune_ping_results(&self, keep: usize) -> Result<u64> {
        let conn = self.get_conn().await?;
        Ok(conn
            .execute(
                &format!("DELETE FROM ping_results WHERE id IN (SELECT id FROM ({RANKED_PINGS}) WHERE position > ?1)"),
                params![keep as i64],
            )
            .await?)
    }

    async fn check_duplicate_url(&self, url: &str, exclude: Option<Uuid>) -> Result<bool> {
        let conn = self.get_conn().await?;
        let exclude = exclude.map(|id| id.to_string()).unwrap_or_default();
        let mut rows = conn
            .query("SELECT 1 FROM monitors WHERE url = ? AND id != ? LIMIT 1", params![url, exclude])
            .await?;
        Ok(rows.next().await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::test_support::create_test_database;

    fn new_monitor(url: &str) -> NewMonitor {
        NewMonitor { name: "site".into(), url: url.into(), interval: 5, password_hash: "hash".into() }
    }

    #[tokio::test]
    async fn created_monitor_starts_in_checking() {
        let (db, _dir) = create_test_database().await;
        let monitor = db.create_monitor(new_monitor("https://a.example")).await.unwrap();

        let stored = db.get_monitor(monitor.id).await.unwrap().unwrap();
        assert_eq!(stored.status, MonitorStatus::Checking);
        assert_eq!(stored.total_checks, 0);
        assert_eq!(stored.uptime_percentage, 100);
        assert!(stored.last_checked.is_none());
        assert_eq!(stored.password_hash, "hash");
    }

    #[tokio::test]
    async fn status_update_moves_counters_together() {
        let (db, _dir) = create_test_database().await;
        let monitor = db.create_monitor(new_monitor("https://a.example")).await.unwrap();
        let now = Utc::now();

        assert!(db.update_monitor_status(monitor.id, MonitorStatus::Up, Some(120), now).await.unwrap());
        assert!(db.update_monitor_status(monitor.id, MonitorStatus::Down, None, now).await.unwrap());
        assert!(db.update_monitor_status(monitor.id, MonitorStatus::Up, Some(80), now).await.unwrap());

        let stored = db.get_monitor(monitor.id).await.unwrap().unwrap();
        assert_eq!(stored.total_checks, 3);
        assert_eq!(stored.successful_checks, 2);
        assert_eq!(stored.uptime_percentage, 67);
        assert_eq!(stored.status, MonitorStatus::Up);
        assert_eq!(stored.response_time, Some(80));
        assert_eq!(stored.last_checked.map(Monitor::timestamp_to_i64), Some(Monitor::timestamp_to_i64(now)));
    }

    #[tokio::test]
    async fn stored_uptime_rounds_to_nearest_percent() {
        let (db, _dir) = create_test_database().await;

        for (i, (total, successful, expected)) in
            [(3u64, 2u64, 67u8), (3, 1, 33), (8, 1, 13), (200, 1, 1), (4, 3, 75), (5, 5, 100)].into_iter().enumerate()
        {
            let monitor = db.create_monitor(new_monitor(&format!("https://{i}.example"))).await.unwrap();
            for check in 0..total {
                let status = if check < successful { MonitorStatus::Up } else { MonitorStatus::Down };
                db.update_monitor_status(monitor.id, status, None, Utc::now()).await.unwrap();
            }

            let stored = db.get_monitor(monitor.id).await.unwrap().unwrap();
            assert_eq!(stored.uptime_percentage, expected, "{successful}/{total}");
        }
    }

    #[tokio::test]
    async fn unique_index_rejects_a_second_monitor_for_the_same_url() {
        let (db, _dir) = create_test_database().await;
        db.create_monitor(new_monitor("https://a.example")).await.unwrap();
        let other = db.create_monitor(new_monitor("https://b.example")).await.unwrap();

        let err = db.create_monitor(new_monitor("https://a.example")).await.unwrap_err();
        assert!(err.downcast_ref::<UrlTaken>().is_some());

        let steal = MonitorUpdate { url: Some("https://a.example".into()), ..Default::default() };
        let err = db.update_monitor(other.id, steal).await.unwrap_err();
        assert!(err.downcast_ref::<UrlTaken>().is_some());
    }

    #[tokio::test]
    async fn status_update_on_missing_monitor_reports_false() {
        let (db, _dir) = create_test_database().await;
        assert!(!db.update_monitor_status(Uuid::new_v4(), MonitorStatus::Up, Some(1), Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn history_is_latest_window_oldest_first() {
        let (db, _dir) = create_test_database().await;
        let monitor = db.create_monitor(new_monitor("https://a.example")).await.unwrap();
        let start = Utc::now();

        for minute in 0..5 {
            db.create_ping_result(NewPingResult {
                monitor_id: monitor.id,
                status: MonitorStatus::Up,
                response_time: Some(minute),
                timestamp: start + Duration::minutes(minute as i64),
            })
            .await
            .unwrap();
        }

        let history = db.get_ping_results(monitor.id, 3).await.unwrap();
        let times: Vec<_> = history.iter().map(|p| p.response_time).collect();
        assert_eq!(times, vec![Some(2), Some(3), Some(4)]);

        let all = db.get_all_ping_results(2).await.unwrap();
        let times: Vec<_> = all[&monitor.id].iter().map(|p| p.response_time).collect();
        assert_eq!(times, vec![Some(3), Some(4)]);
    }

    #[tokio::test]
    async fn delete_cascades_to_history() {
        let (db, _dir) = create_test_database().await;
        let doomed = db.create_monitor(new_monitor("https://a.example")).await.unwrap();
        let kept = db.create_monitor(new_monitor("https://b.example")).await.unwrap();

        for id in [doomed.id, kept.id] {
            db.create_ping_result(NewPingResult {
                monitor_id: id,
                status: MonitorStatus::Down,
                response_time: None,
                timestamp: Utc::now(),
            })
            .await
            .unwrap();
        }

        assert!(db.delete_monitor(doomed.id).await.unwrap());
        assert!(!db.delete_monitor(doomed.id).await.unwrap());

        assert!(db.get_monitor(doomed.id).await.unwrap().is_none());
        assert!(db.get_ping_results(doomed.id, 24).await.unwrap().is_empty());
        assert_eq!(db.get_ping_results(kept.id, 24).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn prune_keeps_newest_rows_per_monitor() {
        let (db, _dir) = create_test_database().await;
        let a = db.create_monitor(new_monitor("https://a.example")).await.unwrap();
        let b = db.create_monitor(new_monitor("https://b.example")).await.unwrap();
        let start = Utc::now();

        for i in 0..6 {
            for id in [a.id, b.id] {
                db.create_ping_result(NewPingResult {
                    monitor_id: id,
                    status: MonitorStatus::Up,
                    response_time: Some(i),
                    timestamp: start + Duration::seconds(i as i64),
                })
                .await
                .unwrap();
            }
        }

        assert_eq!(db.prune_ping_results(4).await.unwrap(), 4);
        let left = db.get_ping_results(a.id, 100).await.unwrap();
        assert_eq!(left.first().and_then(|p| p.response_time), Some(2));
        assert_eq!(db.get_ping_results(b.id, 100).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn duplicate_url_ignores_the_excluded_monitor() {
        let (db, _dir) = create_test_database().await;
        let monitor = db.create_monitor(new_monitor("https://a.example")).await.unwrap();

        assert!(db.check_duplicate_url("https://a.example", None).await.unwrap());
        assert!(!db.check_duplicate_url("https://a.example", Some(monitor.id)).await.unwrap());
        assert!(!db.check_duplicate_url("https://b.example", None).await.unwrap());
    }

    #[tokio::test]
    async fn partial_update_leaves_other_fields() {
        let (db, _dir) = create_test_database().await;
        let monitor = db.create_monitor(new_monitor("https://a.example")).await.unwrap();

        let update = MonitorUpdate { interval: Some(15), ..Default::default() };
        assert!(db.update_monitor(monitor.id, update).await.unwrap());

        let stored = db.get_monitor(monitor.id).await.unwrap().unwrap();
        assert_eq!(stored.interval, 15);
        assert_eq!(stored.url, "https://a.example");
        assert!(!db.update_monitor(Uuid::new_v4(), MonitorUpdate::default()).await.unwrap());
    }
}
