use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::monitoring::types::MonitorStatus;

/// Default check interval in minutes
pub const DEFAULT_INTERVAL_MINUTES: u32 = 5;

/// A registered URL and its reliability counters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Monitor {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    /// Minutes between checks, 1..=60
    pub interval: u32,
    pub status: MonitorStatus,
    pub last_checked: Option<DateTime<Utc>>,
    pub response_time: Option<u64>,
    pub total_checks: u64,
    pub successful_checks: u64,
    pub uptime_percentage: u8,
    #[serde(skip)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl Monitor {
    /// A monitor is due once its interval has fully elapsed since the last
    /// check. Never-checked monitors are always due.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_checked {
            None => true,
            Some(last) => {
                let interval_ms = i64::from(self.interval) * 60_000;
                (now - last).num_milliseconds() >= interval_ms
            }
        }
    }

    /// Convert a timestamp to epoch milliseconds
    pub fn timestamp_to_i64(time: DateTime<Utc>) -> i64 {
        time.timestamp_millis()
    }

    /// Convert epoch milliseconds back to a timestamp
    pub fn i64_to_timestamp(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(millis).single().unwrap_or_default()
    }
}

/// Fields needed to register a monitor
#[derive(Debug, Clone)]
pub struct NewMonitor {
    pub name: String,
    pub url: String,
    pub interval: u32,
    pub password_hash: String,
}

/// Partial edit of a monitor; `None` leaves the field alone
#[derive(Debug, Clone, Default)]
pub struct MonitorUpdate {
    pub name: Option<String>,
    pub url: Option<String>,
    pub interval: Option<u32>,
}

impl MonitorUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.url.is_none() && self.interval.is_none()
    }
}

/// One recorded check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResult {
    pub id: Uuid,
    pub monitor_id: Uuid,
    pub status: MonitorStatus,
    pub response_time: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPingResult {
    pub monitor_id: Uuid,
    pub status: MonitorStatus,
    pub response_time: Option<u64>,
    pub timestamp: DateTime<Utc>,
}
