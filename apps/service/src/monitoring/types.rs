use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a monitor, as last observed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStatus {
    /// Registered but never checked.
    #[default]
    Checking,
    Up,
    Down,
}

impl MonitorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorStatus::Checking => "checking",
            MonitorStatus::Up => "up",
            MonitorStatus::Down => "down",
        }
    }

    pub fn is_up(&self) -> bool {
        matches!(self, MonitorStatus::Up)
    }
}

impl std::fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown monitor status `{0}`")]
pub struct UnknownStatus(pub String);

impl FromStr for MonitorStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "checking" => Ok(MonitorStatus::Checking),
            "up" => Ok(MonitorStatus::Up),
            "down" => Ok(MonitorStatus::Down),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// What a single probe observed. Probes never fail, they report `Down`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub status: MonitorStatus,
    /// Milliseconds since the probe started; absent when the deadline ran out.
    pub response_time: Option<u64>,
}

impl ProbeOutcome {
    pub fn up(response_time: u64) -> Self {
        Self { status: MonitorStatus::Up, response_time: Some(response_time) }
    }

    pub fn down(response_time: Option<u64>) -> Self {
        Self { status: MonitorStatus::Down, response_time }
    }
}

/// Result of a monitoring check, ready to be aggregated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    /// Monitor that was checked
    pub monitor_id: Uuid,

    /// When the check finished
    pub timestamp: DateTime<Utc>,

    pub status: MonitorStatus,

    /// Response time in milliseconds
    pub response_time: Option<u64>,
}

impl CheckResult {
    pub fn new(monitor_id: Uuid) -> Self {
        Self { monitor_id, timestamp: Utc::now(), status: MonitorStatus::Checking, response_time: None }
    }

    /// Stamp the result with what the probe saw
    pub fn with_outcome(mut self, outcome: ProbeOutcome) -> Self {
        self.status = outcome.status;
        self.response_time = outcome.response_time;
        self
    }
}
