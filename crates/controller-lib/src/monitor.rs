//! Topology snapshot sources
//!
//! The controller never measures the deployment itself; it polls a monitor
//! once per tick for the input-rate history, replica counts, operator
//! output counters and a latency sample.

use crate::models::TopologySnapshot;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// Anything that can report the current state of the topology
#[async_trait]
pub trait TopologySource: Send + Sync {
    async fn snapshot(&self) -> Result<TopologySnapshot>;
}

/// Polls a monitor that serves the snapshot as JSON at a single URL
#[derive(Debug, Clone)]
pub struct HttpTopologySource {
    client: Client,
    url: Url,
}

impl HttpTopologySource {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        let url = Url::parse(url).context("Invalid monitor URL")?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl TopologySource for HttpTopologySource {
    async fn snapshot(&self) -> Result<TopologySnapshot> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .context("Failed to reach topology monitor")?;

        if !response.status().is_success() {
            anyhow::bail!("Topology monitor returned {}", response.status());
        }

        response
            .json()
            .await
            .context("Failed to parse topology snapshot")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    #[tokio::test]
    async fn test_snapshot_parsed() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/topology")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "input_rate": [10.0, 12.0, 11.5],
                    "current_input_rate": 11.5,
                    "operators": [{"name": "split", "replicas": 2, "output": 11}],
                    "latency_ms": 87.5,
                    "timestamp": 1700000000
                }"#,
            )
            .create_async()
            .await;

        let source =
            HttpTopologySource::new(&format!("{}/topology", server.url()), Duration::from_secs(5))
                .unwrap();
        let snapshot = source.snapshot().await.unwrap();

        mock.assert_async().await;
        assert_eq!(snapshot.input_rate.len(), 3);
        assert_eq!(snapshot.total_replicas(), 2);
        assert_eq!(snapshot.latency_ms, 87.5);
    }

    #[tokio::test]
    async fn test_monitor_error_status() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/topology")
            .with_status(503)
            .create_async()
            .await;

        let source =
            HttpTopologySource::new(&format!("{}/topology", server.url()), Duration::from_secs(5))
                .unwrap();
        let err = source.snapshot().await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(HttpTopologySource::new("not a url", Duration::from_secs(1)).is_err());
    }
}
