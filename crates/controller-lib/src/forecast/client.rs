//! HTTP client for the external forecasting service
//!
//! Each model is served at `POST {base_url}/{model}` and answers with the
//! forecast sequence for the requested horizon.

use super::Forecaster;
use crate::models::{ForecastRequest, ForecastResponse};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Forecaster backed by the remote forecasting service
#[derive(Debug, Clone)]
pub struct HttpForecaster {
    client: Client,
    base_url: Url,
}

impl HttpForecaster {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        // A trailing slash keeps `join` from replacing the last path segment
        let mut base = base_url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).context("Invalid forecaster URL")?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

#[async_trait]
impl Forecaster for HttpForecaster {
    async fn forecast(&self, samples: &[f64], horizon: usize, model: &str) -> Result<Vec<f64>> {
        let url = self.base_url.join(model).context("Invalid model path")?;
        let body = ForecastRequest {
            samples: samples.to_vec(),
            prediction_number: horizon,
        };

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .context("Failed to reach forecasting service")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Forecasting service error ({}): {}", status, text);
        }

        let parsed: ForecastResponse = response
            .json()
            .await
            .context("Failed to parse forecast response")?;

        debug!(
            model = %model,
            horizon,
            returned = parsed.predictions.len(),
            avg_prediction = parsed.avg_prediction,
            "Forecast received"
        );
        Ok(parsed.predictions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_forecast_posts_samples() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/ann")
            .match_body(Matcher::Json(serde_json::json!({
                "samples": [1.0, 2.0, 3.0],
                "prediction_number": 2
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"avg_prediction": 4.5, "predictions": [4.0, 5.0]}"#)
            .create_async()
            .await;

        let forecaster = HttpForecaster::new(&server.url(), Duration::from_secs(5)).unwrap();
        let values = forecaster.forecast(&[1.0, 2.0, 3.0], 2, "ann").await.unwrap();

        assert_eq!(values, vec![4.0, 5.0]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_forecast_keeps_base_path() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/predict/svm")
            .with_status(200)
            .with_body(r#"{"predictions": [7.0]}"#)
            .create_async()
            .await;

        let base = format!("{}/predict", server.url());
        let forecaster = HttpForecaster::new(&base, Duration::from_secs(5)).unwrap();
        let values = forecaster.forecast(&[7.0], 1, "svm").await.unwrap();

        assert_eq!(values, vec![7.0]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_service_error_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/fft")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let forecaster = HttpForecaster::new(&server.url(), Duration::from_secs(5)).unwrap();
        let err = forecaster.forecast(&[1.0], 1, "fft").await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_malformed_body_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/ridge")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let forecaster = HttpForecaster::new(&server.url(), Duration::from_secs(5)).unwrap();
        assert!(forecaster.forecast(&[1.0], 1, "ridge").await.is_err());
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(HttpForecaster::new("not a url", Duration::from_secs(1)).is_err());
    }
}
