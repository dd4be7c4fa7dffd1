//! Name resolution and raw TCP connect timing.

use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use tokio::net::{TcpStream, lookup_host};
use tokio::time::timeout;

use crate::error::ScanError;

/// Outcome of a successful DNS lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DnsLookup {
    /// First address returned by the resolver.
    pub address: IpAddr,
    pub elapsed_ms: u64,
}

/// Resolve `host` and measure how long the lookup took.
pub async fn resolve(host: &str, port: u16, deadline: Duration) -> Result<DnsLookup, ScanError> {
    let start = Instant::now();

    let mut addrs = timeout(deadline, lookup_host((host, port)))
        .await
        .map_err(|_| ScanError::Timeout("dns lookup"))?
        .map_err(|e| ScanError::Dns(e.to_string()))?;

    let addr = addrs.next().ok_or_else(|| ScanError::Dns(format!("no addresses for {host}")))?;

    Ok(DnsLookup { address: addr.ip(), elapsed_ms: start.elapsed().as_millis() as u64 })
}

/// Open (and immediately drop) a TCP connection, returning the connect time in ms.
pub async fn connect(addr: SocketAddr, deadline: Duration) -> Result<u64, ScanError> {
    let start = Instant::now();

    timeout(deadline, TcpStream::connect(addr))
        .await
        .map_err(|_| ScanError::Timeout("tcp connect"))??;

    Ok(start.elapsed().as_millis() as u64)
}
