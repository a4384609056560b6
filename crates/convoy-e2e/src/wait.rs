//! Poll-with-deadline wait for HTTP endpoints.

use std::time::Duration;

use anyhow::bail;
use tokio::time::Instant;
use tracing::{debug, info};

pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_WAIT_INTERVAL_MS: u64 = 200;

/// Waits until every URI answers with a non-error status.
#[derive(Debug, Clone)]
pub struct UriWaiter {
    client: reqwest::Client,
    timeout: Duration,
    interval: Duration,
}

impl UriWaiter {
    pub fn new(timeout: Duration, interval: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(interval.max(Duration::from_millis(500)))
            .build()?;
        Ok(Self {
            client,
            timeout,
            interval,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// One HEAD request. Connection failures count as "not yet available".
    pub async fn is_available(&self, uri: &str) -> bool {
        match self.client.head(uri).send().await {
            Ok(response) => {
                let status = response.status();
                debug!(uri = %uri, status = %status, "uri answered");
                !(status.is_client_error() || status.is_server_error())
            }
            Err(e) => {
                debug!(uri = %uri, error = %e, "uri check failed");
                false
            }
        }
    }

    async fn wait_one(&self, uri: &str) -> anyhow::Result<()> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if self.is_available(uri).await {
                return Ok(());
            }
            if Instant::now() >= deadline {
                bail!(
                    "{uri} not available: the max timeout limit of {}ms reached",
                    self.timeout.as_millis()
                );
            }
            tokio::time::sleep(self.interval).await;
        }
    }

    /// Wait for all `uris` concurrently; the first one to time out fails
    /// the wait.
    pub async fn wait_all(&self, uris: &[String]) -> anyhow::Result<()> {
        if uris.is_empty() {
            return Ok(());
        }
        info!(uris = %uris.join(", "), "waiting for URIs to be available");
        futures::future::try_join_all(uris.iter().map(|uri| self.wait_one(uri))).await?;
        info!("all URIs are available");
        Ok(())
    }
}
