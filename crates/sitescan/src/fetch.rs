//! Full page download with redirect tracking and phase timing.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use reqwest::header::{ACCEPT_ENCODING, HeaderMap};
use reqwest::redirect::Policy;
use tokio::time::timeout;
use url::Url;

use crate::error::ScanError;

const MAX_REDIRECTS: usize = 10;
const ACCEPT_ENCODING_HINT: &str = "gzip, deflate, br";

/// What the content fetch observed.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub status_code: u16,
    pub status_text: Option<String>,
    /// Lower-cased header names; repeated headers are joined with `, `.
    pub headers: BTreeMap<String, String>,
    pub final_url: Url,
    pub redirect_count: usize,
    pub remote_addr: Option<IpAddr>,
    /// Time until the response head arrived.
    pub ttfb_ms: u64,
    /// Time spent reading the body after the head.
    pub download_ms: u64,
    pub content_length: Option<u64>,
}

impl FetchResult {
    pub fn redirected(&self) -> bool {
        self.redirect_count > 0
    }

    pub fn total_ms(&self) -> u64 {
        self.ttfb_ms + self.download_ms
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// GET `url`, following redirects, with `deadline` covering the whole exchange.
pub async fn fetch(url: &Url, user_agent: &str, deadline: Duration) -> Result<FetchResult, ScanError> {
    timeout(deadline, fetch_inner(url, user_agent))
        .await
        .map_err(|_| ScanError::Timeout("content fetch"))?
}

async fn fetch_inner(url: &Url, user_agent: &str) -> Result<FetchResult, ScanError> {
    let hops = Arc::new(AtomicUsize::new(0));
    let counter = hops.clone();
    let policy = Policy::custom(move |attempt| {
        let previous = attempt.previous().len();
        counter.store(previous, Ordering::Relaxed);
        if previous > MAX_REDIRECTS {
            attempt.error("too many redirects")
        } else {
            attempt.follow()
        }
    });

    let client = reqwest::Client::builder().user_agent(user_agent).redirect(policy).build()?;

    let start = Instant::now();
    let mut response =
        client.get(url.clone()).header(ACCEPT_ENCODING, ACCEPT_ENCODING_HINT).send().await?;
    let ttfb_ms = start.elapsed().as_millis() as u64;

    let status = response.status();
    let headers = fold_headers(response.headers());
    let final_url = response.url().clone();
    let remote_addr = response.remote_addr().map(|addr| addr.ip());
    let declared_length = response.content_length();

    let body_start = Instant::now();
    let mut received: u64 = 0;
    while let Some(chunk) = response.chunk().await? {
        received += chunk.len() as u64;
    }
    let download_ms = body_start.elapsed().as_millis() as u64;

    Ok(FetchResult {
        status_code: status.as_u16(),
        status_text: status.canonical_reason().map(str::to_string),
        headers,
        final_url,
        redirect_count: hops.load(Ordering::Relaxed),
        remote_addr,
        ttfb_ms,
        download_ms,
        content_length: if received > 0 { Some(received) } else { declared_length },
    })
}

fn fold_headers(map: &HeaderMap) -> BTreeMap<String, String> {
    let mut headers: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in map {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        headers
            .entry(name.as_str().to_ascii_lowercase())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    headers
}
