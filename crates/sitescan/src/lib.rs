//! sitescan - one-shot diagnostics for a single website.
//!
//! [`Analyzer::analyze`] resolves the host, inspects its TLS certificate,
//! downloads the page, audits security headers, fingerprints the technology
//! stack and condenses everything into a [`SiteReport`]. Every step degrades
//! independently: a failing step leaves its fields empty instead of aborting
//! the analysis, so callers always receive a report.

pub mod analyzer;
pub mod error;
pub mod fetch;
pub mod fingerprint;
pub mod headers;
pub mod net;
pub mod report;
pub mod scoring;
pub mod tls;

pub use analyzer::{Analyzer, AnalyzerOptions, test_url, validate_target};
pub use error::ScanError;
pub use fingerprint::TechStack;
pub use headers::SecurityHeaders;
pub use report::{SiteReport, SiteStatus, SslInfo, Timing};
pub use scoring::Grade;

/// User agent sent by every request the analyzer makes.
pub const DEFAULT_USER_AGENT: &str = "DxMonitor/1.0 (Uptime Monitoring)";
