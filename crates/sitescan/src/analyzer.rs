//! Orchestrates the individual analysis steps into a [`SiteReport`].

use std::net::SocketAddr;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info};
use url::{Host, Url};

use crate::DEFAULT_USER_AGENT;
use crate::error::ScanError;
use crate::fetch::{self, FetchResult};
use crate::fingerprint::TechStack;
use crate::headers::SecurityHeaders;
use crate::net::{self, DnsLookup};
use crate::report::{SiteReport, SiteStatus, Timing};
use crate::scoring::{Grade, performance_score};
use crate::tls::{self, TlsInspection};

/// Deadlines and identity used by the analyzer.
#[derive(Debug, Clone)]
pub struct AnalyzerOptions {
    pub fetch_timeout: Duration,
    pub tls_timeout: Duration,
    pub dns_timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(30),
            tls_timeout: Duration::from_secs(5),
            dns_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Runs one-shot diagnostics against a URL.
#[derive(Debug, Clone, Default)]
pub struct Analyzer {
    options: AnalyzerOptions,
}

/// Analyze `url` with default options.
pub async fn test_url(url: &str) -> SiteReport {
    Analyzer::default().analyze(url).await
}

impl Analyzer {
    pub fn new(options: AnalyzerOptions) -> Self {
        Self { options }
    }

    /// Produce a report for `raw_url`. Never fails; broken steps leave gaps.
    pub async fn analyze(&self, raw_url: &str) -> SiteReport {
        let tested_at = Utc::now();

        let url = match validate_target(raw_url) {
            Ok(url) => url,
            Err(e) => {
                debug!(url = raw_url, "Rejecting analysis target: {e}");
                return SiteReport::unreachable(raw_url, tested_at);
            }
        };

        // validate_target guarantees a host and a known default port
        let host = target_host(&url);
        let port = url.port_or_known_default().unwrap_or(80);
        let is_secure = url.scheme() == "https";

        info!(url = %url, "Analyzing site");

        let lookup = net::resolve(&host, port, self.options.dns_timeout)
            .await
            .inspect_err(|e| debug!(host = %host, "DNS step failed: {e}"))
            .ok();

        let (connection, tls, fetched) = tokio::join!(
            self.connect_step(lookup, port),
            self.tls_step(&host, port, is_secure),
            fetch::fetch(&url, &self.options.user_agent, self.options.fetch_timeout),
        );

        let fetched = fetched.inspect_err(|e| debug!(url = %url, "Content fetch failed: {e}")).ok();

        let mut report = SiteReport::unreachable(raw_url, tested_at);
        report.hostname = Some(host);
        report.protocol = url.scheme().to_string();
        report.is_secure = is_secure;
        report.ip_address = lookup
            .map(|l| l.address)
            .or_else(|| fetched.as_ref().and_then(|f| f.remote_addr))
            .map(|ip| ip.to_string());
        report.dns_time = lookup.map(|l| l.elapsed_ms);
        report.timing = Timing {
            dns: lookup.map(|l| l.elapsed_ms),
            connection,
            tls: tls.as_ref().map(|t| t.handshake_ms),
            ..Timing::default()
        };
        report.http2 = tls.as_ref().is_some_and(|t| t.http2);
        report.ssl_info = tls.map(|t| t.info);

        if let Some(fetched) = fetched {
            apply_fetch(&mut report, fetched);
        }

        report
    }

    async fn connect_step(&self, lookup: Option<DnsLookup>, port: u16) -> Option<u64> {
        let lookup = lookup?;
        net::connect(SocketAddr::new(lookup.address, port), self.options.connect_timeout)
            .await
            .inspect_err(|e| debug!(address = %lookup.address, "Connect step failed: {e}"))
            .ok()
    }

    async fn tls_step(&self, host: &str, port: u16, is_secure: bool) -> Option<TlsInspection> {
        if !is_secure {
            return None;
        }
        tls::inspect(host, port, self.options.tls_timeout)
            .await
            .inspect_err(|e| debug!(host, "TLS inspection failed: {e}"))
            .ok()
    }
}

/// Accept only absolute http(s) URLs with a host.
pub fn validate_target(raw_url: &str) -> Result<Url, ScanError> {
    let url = Url::parse(raw_url.trim()).map_err(|e| ScanError::UnsupportedUrl(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(ScanError::UnsupportedUrl(format!("scheme {other}"))),
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(ScanError::UnsupportedUrl("missing host".into()));
    }
    Ok(url)
}

/// Host as the resolver and TLS layer expect it, IPv6 literals unbracketed.
fn target_host(url: &Url) -> String {
    match url.host() {
        Some(Host::Ipv6(addr)) => addr.to_string(),
        Some(host) => host.to_string(),
        None => String::new(),
    }
}

/// Fill the fetch-derived fields and compute the scores.
fn apply_fetch(report: &mut SiteReport, fetched: FetchResult) {
    let total = fetched.total_ms();
    let compression = fetched.header("content-encoding").map(str::to_string);
    let security_headers = SecurityHeaders::audit(&fetched.headers);

    report.status =
        if fetched.status_code < 400 { SiteStatus::Up } else { SiteStatus::Down };
    report.response_time = Some(total);
    report.status_code = Some(fetched.status_code);
    report.status_text = fetched.status_text.clone();
    report.server_info = fetched.header("server").map(str::to_string);
    report.content_type = fetched.header("content-type").map(str::to_string);
    report.cache_control = fetched.header("cache-control").map(str::to_string);
    report.ttfb = Some(fetched.ttfb_ms);
    report.timing.ttfb = Some(fetched.ttfb_ms);
    report.timing.download = Some(fetched.download_ms);
    report.timing.total = Some(total);
    report.redirected = fetched.redirected();
    report.redirect_count = fetched.redirect_count;
    report.content_length = fetched.content_length;
    report.tech_stack = TechStack::detect(&fetched.headers);
    report.performance_score =
        performance_score(Some(total), report.is_secure, compression.is_some(), security_headers.score);
    report.load_grade = Grade::from_load(Some(total), report.is_secure, compression.is_some());
    report.security_headers = security_headers;
    report.compression = compression;
    report.headers = fetched.headers;
}
