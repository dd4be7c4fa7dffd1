//! The report returned by [`crate::Analyzer`].

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fingerprint::TechStack;
use crate::headers::SecurityHeaders;
use crate::scoring::Grade;

/// Reachability verdict of an ad-hoc test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteStatus {
    Up,
    Down,
}

impl fmt::Display for SiteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SiteStatus::Up => write!(f, "up"),
            SiteStatus::Down => write!(f, "down"),
        }
    }
}

/// Leaf certificate and session details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SslInfo {
    pub valid: bool,
    pub issuer: Option<String>,
    pub subject: Option<String>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
    pub days_until_expiry: Option<i64>,
    pub protocol: Option<String>,
    pub cipher: Option<String>,
}

/// Millisecond breakdown of the load. Any phase may be unmeasured.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
    pub dns: Option<u64>,
    pub connection: Option<u64>,
    pub tls: Option<u64>,
    pub ttfb: Option<u64>,
    pub download: Option<u64>,
    pub total: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteReport {
    pub url: String,
    pub status: SiteStatus,
    pub response_time: Option<u64>,
    pub status_code: Option<u16>,
    pub status_text: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub server_info: Option<String>,
    pub content_type: Option<String>,
    pub ip_address: Option<String>,
    pub hostname: Option<String>,
    pub protocol: String,
    pub tested_at: DateTime<Utc>,
    pub dns_time: Option<u64>,
    pub ttfb: Option<u64>,
    pub is_secure: bool,
    pub security_headers: SecurityHeaders,
    pub performance_score: u8,
    pub redirected: bool,
    pub redirect_count: usize,
    pub compression: Option<String>,
    pub cache_control: Option<String>,
    pub ssl_info: Option<SslInfo>,
    pub tech_stack: TechStack,
    pub timing: Timing,
    pub content_length: Option<u64>,
    pub load_grade: Grade,
    pub http2: bool,
}

impl SiteReport {
    /// The worst-case report: down, zeroed scores, grade F, nothing measured.
    pub fn unreachable(url: impl Into<String>, tested_at: DateTime<Utc>) -> Self {
        Self {
            url: url.into(),
            status: SiteStatus::Down,
            response_time: None,
            status_code: None,
            status_text: None,
            headers: BTreeMap::new(),
            server_info: None,
            content_type: None,
            ip_address: None,
            hostname: None,
            protocol: String::new(),
            tested_at,
            dns_time: None,
            ttfb: None,
            is_secure: false,
            security_headers: SecurityHeaders::default(),
            performance_score: 0,
            redirected: false,
            redirect_count: 0,
            compression: None,
            cache_control: None,
            ssl_info: None,
            tech_stack: TechStack::default(),
            timing: Timing::default(),
            content_length: None,
            load_grade: Grade::F,
            http2: false,
        }
    }
}
