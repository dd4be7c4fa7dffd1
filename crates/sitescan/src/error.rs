use std::io;

use thiserror::Error;

/// Failure of a single analysis step.
///
/// These never leave the crate through [`crate::Analyzer`]; they are logged and
/// turned into empty report fields.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("unsupported url: {0}")]
    UnsupportedUrl(String),
    #[error("{0} timed out")]
    Timeout(&'static str),
    #[error("dns lookup failed: {0}")]
    Dns(String),
    #[error("connection failed: {0}")]
    Connect(#[from] io::Error),
    #[error("tls error: {0}")]
    Tls(String),
    #[error("certificate could not be parsed: {0}")]
    Certificate(String),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
}
