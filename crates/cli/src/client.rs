//! API client for the adaptive controller daemon

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// GET `path` relative to the base URL and decode the JSON body
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            anyhow::bail!("API error ({}): {}", status, message);
        }

        response.json().await.context("Failed to parse response")
    }

    pub async fn status(&self) -> Result<ControllerStatus> {
        self.get("api/v1/status").await
    }

    pub async fn forecast(&self, period: usize) -> Result<ForecastValue> {
        self.get(&format!("api/v1/forecast?period={}", period)).await
    }

    pub async fn ranking(&self, k: Option<usize>) -> Result<Ranking> {
        match k {
            Some(k) => self.get(&format!("api/v1/ranking?k={}", k)).await,
            None => self.get("api/v1/ranking").await,
        }
    }

    pub async fn health(&self) -> Result<HealthReport> {
        // healthz answers 503 with a full body when unhealthy; show it anyway
        let url = self.base_url.join("healthz").context("Invalid path")?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;
        response.json().await.context("Failed to parse response")
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelStatus {
    pub name: String,
    pub buffer_len: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rmse: Option<f64>,
    pub value: f64,
    pub visits: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerStatus {
    pub cycle: u64,
    pub policy: String,
    pub chosen_model: String,
    pub chosen_index: usize,
    pub bandit_round: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_decision: Option<String>,
    pub models: Vec<ModelStatus>,
    pub ranking: Vec<String>,
    pub chosen_forecast: Vec<f64>,
    pub generated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastValue {
    pub model: String,
    pub period: usize,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ranking {
    pub k: usize,
    pub ranking: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub components: BTreeMap<String, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
