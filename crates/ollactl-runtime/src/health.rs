//! Liveness probing and control-endpoint queries for the inference server.
//!
//! The probe is intentionally minimal: a bounded-timeout GET against the
//! server root. Probe failures are transient and reported as a flag, never
//! as an error.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use tokio::time::sleep;
use tracing::{debug, info};

use ollactl_core::ports::ServerHealth;

/// Connect timeout for a single probe attempt.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
/// Full round-trip timeout for a single probe attempt.
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);
/// Delay between attempts while waiting for boot readiness.
const PROBE_INTERVAL: Duration = Duration::from_secs(1);

/// HTTP liveness probe bound to one server base URL.
#[derive(Debug, Clone)]
pub struct LivenessProbe {
    base_url: String,
}

impl LivenessProbe {
    /// Create a probe for a server at `base_url`, e.g.
    /// `http://127.0.0.1:11434`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { base_url }
    }

    fn client() -> Result<Client> {
        Ok(Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(PROBE_TIMEOUT)
            .build()?)
    }

    /// One probe attempt. Any transport error counts as unresponsive.
    pub async fn check(&self) -> bool {
        let Ok(client) = Self::client() else {
            return false;
        };
        match client.get(&self.base_url).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                debug!(status = %response.status(), "Probe returned non-success status");
                false
            }
            Err(e) => {
                debug!(error = %e, "Probe failed");
                false
            }
        }
    }

    /// Poll until the server answers or the budget elapses.
    ///
    /// Used for the boot-readiness window after a spawn. Returns whether
    /// the server became responsive within the budget.
    pub async fn wait_until_responsive(&self, budget: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + budget;
        loop {
            if self.check().await {
                info!(url = %self.base_url, "Inference server is responsive");
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                debug!(url = %self.base_url, "Server did not become responsive within budget");
                return false;
            }
            sleep(PROBE_INTERVAL).await;
        }
    }

    /// Query the server's version endpoint.
    pub async fn server_version(&self) -> Result<String> {
        let client = Self::client()?;
        let body: serde_json::Value = client
            .get(format!("{}/api/version", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body["version"].as_str().unwrap_or("unknown").to_string())
    }

    /// Query which models are currently loaded by the server.
    pub async fn running_models(&self) -> Result<Vec<String>> {
        let client = Self::client()?;
        let body: serde_json::Value = client
            .get(format!("{}/api/ps", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let names = body["models"]
            .as_array()
            .map(|models| {
                models
                    .iter()
                    .filter_map(|m| m["name"].as_str().map(ToString::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Ok(names)
    }
}

#[async_trait]
impl ServerHealth for LivenessProbe {
    async fn is_responsive(&self) -> bool {
        self.check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_server_is_not_responsive() {
        // Reserved-port URL that nothing listens on.
        let probe = LivenessProbe::new("http://127.0.0.1:1/");
        assert!(!probe.check().await);
        assert!(!probe.wait_until_responsive(Duration::from_millis(10)).await);
    }

    #[test]
    fn base_url_is_normalized() {
        let probe = LivenessProbe::new("http://127.0.0.1:11434///");
        assert_eq!(probe.base_url, "http://127.0.0.1:11434");
    }
}
