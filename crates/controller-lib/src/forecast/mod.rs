//! Load forecasting
//!
//! Every model in the catalog is an opaque scoring function identified by
//! name. The ensemble fans one task out per model each decision cycle and
//! appends successful forecasts to that model's buffer; the accuracy
//! estimator scores those buffers against the observed load.

mod accuracy;
mod client;
mod ensemble;
mod naive;

pub use accuracy::{rmse, AccuracyEstimator};
pub use client::HttpForecaster;
pub use ensemble::{
    EnsembleConfig, EnsembleReport, ModelForecast, PredictionEnsemble, SkipReason,
    DEFAULT_FORECAST_TIMEOUT, DEFAULT_MODELS, MULTI_MODEL,
};
pub use naive::{NaiveForecaster, BASIC_MODEL};

use anyhow::Result;
use async_trait::async_trait;

/// A source of numeric forecasts for named models
#[async_trait]
pub trait Forecaster: Send + Sync {
    /// Forecast `horizon` future values of `samples` with `model`.
    ///
    /// An empty vector means the model had nothing usable to offer.
    async fn forecast(&self, samples: &[f64], horizon: usize, model: &str) -> Result<Vec<f64>>;
}
