use std::time::{Duration, Instant};

use anyhow::Result;
use reqwest::{Method, StatusCode};
use tokio::time::timeout;

use super::types::ProbeOutcome;

/// Checker trait for reachability probes
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    /// Probe `url`. Never fails: unreachable targets come back as `Down`.
    async fn probe(&self, url: &str) -> ProbeOutcome;
}

/// HEAD first, one GET retry when the server rejects HEAD
pub struct HttpChecker {
    client: reqwest::Client,
    timeout_duration: Duration,
}

/// Why an attempt produced no status code
#[derive(Debug)]
enum AttemptError {
    TimedOut,
    Transport(reqwest::Error),
}

impl HttpChecker {
    pub fn new(timeout_duration: Duration, user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder().user_agent(user_agent).build()?;

        Ok(Self { client, timeout_duration })
    }

    async fn attempt(&self, method: Method, url: &str) -> Result<StatusCode, AttemptError> {
        let request = self.client.request(method, url).send();

        match timeout(self.timeout_duration, request).await {
            Ok(Ok(response)) => Ok(response.status()),
            Ok(Err(e)) => Err(AttemptError::Transport(e)),
            Err(_) => Err(AttemptError::TimedOut),
        }
    }

    /// Elapsed time is only meaningful when the deadline did not fire.
    fn failed(&self, url: &str, start: Instant, error: AttemptError) -> ProbeOutcome {
        let elapsed = start.elapsed();
        match &error {
            AttemptError::TimedOut => tracing::debug!(url, "probe deadline reached"),
            AttemptError::Transport(e) => tracing::debug!(url, error = %e, "probe transport failure"),
        }

        if elapsed < self.timeout_duration {
            ProbeOutcome::down(Some(elapsed.as_millis() as u64))
        } else {
            ProbeOutcome::down(None)
        }
    }
}

#[async_trait::async_trait]
impl Checker for HttpChecker {
    async fn probe(&self, url: &str) -> ProbeOutcome {
        let start = Instant::now();

        let head = match self.attempt(Method::HEAD, url).await {
            Ok(status) => status,
            Err(error) => return self.failed(url, start, error),
        };

        if head.as_u16() < 400 {
            return ProbeOutcome::up(start.elapsed().as_millis() as u64);
        }

        tracing::debug!(url, status = head.as_u16(), "HEAD rejected, retrying with GET");

        match self.attempt(Method::GET, url).await {
            Ok(status) => {
                let elapsed = start.elapsed().as_millis() as u64;
                if status.as_u16() < 400 { ProbeOutcome::up(elapsed) } else { ProbeOutcome::down(Some(elapsed)) }
            }
            Err(error) => self.failed(url, start, error),
        }
    }
}
