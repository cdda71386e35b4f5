//! Prediction ensemble
//!
//! Owns the model catalog and each model's running forecast buffer. Every
//! decision cycle it spawns one forecast task per model, waits for all of
//! them, and appends each successful result to that model's buffer.
//! Failures, empty results and tasks that miss their deadline leave the
//! buffer untouched.

use super::naive::{NaiveForecaster, BASIC_MODEL};
use super::Forecaster;
use crate::error::{ControllerError, ControllerResult};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// `predictive_model` value that keeps the whole catalog
pub const MULTI_MODEL: &str = "multi";

/// Deadline for one model's forecast before its update is skipped
pub const DEFAULT_FORECAST_TIMEOUT: Duration = Duration::from_secs(30);

/// Catalog used when none is configured
pub const DEFAULT_MODELS: [&str; 9] = [
    "basic",
    "linear_regression",
    "fft",
    "random_forest",
    "ann",
    "svm",
    "bayesian",
    "ridge",
    "sgd",
];

/// Configuration for the prediction ensemble
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    /// Model catalog, in selection order
    pub models: Vec<String>,
    /// `multi` for the whole catalog, or the name of the only model to run
    pub predictive_model: String,
    /// Observations per analysis window; buffers start with this many zeros
    pub analyze_samples: usize,
    /// Trailing observations handed to each model (W)
    pub prediction_samples: usize,
    /// Forecast horizon (K)
    pub prediction_number: usize,
    pub forecast_timeout_ms: u64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            models: DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
            predictive_model: MULTI_MODEL.to_string(),
            analyze_samples: 10,
            prediction_samples: 60,
            prediction_number: 5,
            forecast_timeout_ms: DEFAULT_FORECAST_TIMEOUT.as_millis() as u64,
        }
    }
}

impl EnsembleConfig {
    pub fn forecast_timeout(&self) -> Duration {
        Duration::from_millis(self.forecast_timeout_ms)
    }

    /// Length of the trailing window scored by the accuracy estimator
    pub fn accuracy_window(&self) -> usize {
        self.analyze_samples + self.prediction_number
    }

    /// Models that will actually run, after applying `predictive_model`
    pub fn catalog(&self) -> ControllerResult<Vec<String>> {
        if self.models.is_empty() {
            return Err(ControllerError::EmptyCatalog);
        }
        let mut seen = HashSet::new();
        for m in &self.models {
            if !seen.insert(m.as_str()) {
                return Err(ControllerError::DuplicateModel(m.clone()));
            }
        }

        if self.predictive_model == MULTI_MODEL {
            return Ok(self.models.clone());
        }
        if seen.contains(self.predictive_model.as_str()) {
            Ok(vec![self.predictive_model.clone()])
        } else {
            Err(ControllerError::UnknownModel(self.predictive_model.clone()))
        }
    }

    pub fn validate(&self) -> ControllerResult<()> {
        if self.prediction_number == 0 {
            return Err(ControllerError::InvalidConfig(
                "prediction_number must be at least 1".to_string(),
            ));
        }
        if self.prediction_samples == 0 {
            return Err(ControllerError::InvalidConfig(
                "prediction_samples must be at least 1".to_string(),
            ));
        }
        if self.forecast_timeout_ms == 0 {
            return Err(ControllerError::InvalidConfig(
                "forecast_timeout_ms must be positive".to_string(),
            ));
        }
        self.catalog().map(|_| ())
    }
}

/// One model's identity and its forecast history
#[derive(Debug, Clone)]
pub struct ModelForecast {
    name: String,
    buffer: Vec<f64>,
    error_estimate: Option<f64>,
}

impl ModelForecast {
    fn new(name: String, initial_len: usize) -> Self {
        Self {
            name,
            buffer: vec![0.0; initial_len],
            error_estimate: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Forecast values, indexed by observation period
    pub fn buffer(&self) -> &[f64] {
        &self.buffer
    }

    /// Latest RMSE computed by the accuracy estimator
    pub fn error_estimate(&self) -> Option<f64> {
        self.error_estimate
    }

    pub(crate) fn set_error_estimate(&mut self, rmse: f64) {
        self.error_estimate = Some(rmse);
    }

    /// Append a forecast whose first value targets `first_period`.
    ///
    /// Periods the buffer has not reached yet are zero-filled first, so
    /// index i stays the forecast for observation i.
    fn append_from(&mut self, first_period: usize, values: Vec<f64>) {
        if self.buffer.len() < first_period {
            self.buffer.resize(first_period, 0.0);
        }
        self.buffer.extend(values);
    }

    /// Forecast for a period; periods past the end clamp to the last value
    pub fn forecast_at(&self, period: usize) -> Option<f64> {
        let last = self.buffer.len().checked_sub(1)?;
        self.buffer.get(period.min(last)).copied()
    }
}

/// Why a model's buffer was left untouched this cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The model returned no values
    Empty,
    /// The forecaster reported an error
    Failed(String),
    /// The task missed its deadline
    TimedOut,
    /// The task panicked or was aborted
    Aborted,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Empty => write!(f, "empty forecast"),
            SkipReason::Failed(e) => write!(f, "forecast failed: {}", e),
            SkipReason::TimedOut => write!(f, "forecast timed out"),
            SkipReason::Aborted => write!(f, "forecast task aborted"),
        }
    }
}

/// Outcome of one ensemble cycle
#[derive(Debug, Clone, Default)]
pub struct EnsembleReport {
    /// Models whose buffer grew, with the number of values appended
    pub appended: Vec<(String, usize)>,
    pub skipped: Vec<(String, SkipReason)>,
    pub duration: Duration,
}

struct ModelSlot {
    forecast: ModelForecast,
    forecaster: Arc<dyn Forecaster>,
}

/// Catalog of forecasting models and their buffers
pub struct PredictionEnsemble {
    config: EnsembleConfig,
    slots: Vec<ModelSlot>,
}

impl PredictionEnsemble {
    /// Build the ensemble; `basic` runs in-process, every other model uses `remote`
    pub fn new(config: EnsembleConfig, remote: Arc<dyn Forecaster>) -> ControllerResult<Self> {
        let local: Arc<dyn Forecaster> = Arc::new(NaiveForecaster);
        let forecasters = config
            .catalog()?
            .into_iter()
            .map(|name| {
                let forecaster = if name == BASIC_MODEL {
                    local.clone()
                } else {
                    remote.clone()
                };
                (name, forecaster)
            })
            .collect();
        Self::with_forecasters(config, forecasters)
    }

    /// Build the ensemble from explicit (model, forecaster) pairs in catalog order
    pub fn with_forecasters(
        config: EnsembleConfig,
        forecasters: Vec<(String, Arc<dyn Forecaster>)>,
    ) -> ControllerResult<Self> {
        config.validate()?;
        if forecasters.is_empty() {
            return Err(ControllerError::EmptyCatalog);
        }
        let mut seen = HashSet::new();
        for (name, _) in &forecasters {
            if !seen.insert(name.as_str()) {
                return Err(ControllerError::DuplicateModel(name.clone()));
            }
        }
        let slots = forecasters
            .into_iter()
            .map(|(name, forecaster)| ModelSlot {
                forecast: ModelForecast::new(name, config.analyze_samples),
                forecaster,
            })
            .collect();
        Ok(Self { config, slots })
    }

    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_single(&self) -> bool {
        self.slots.len() == 1
    }

    pub fn names(&self) -> Vec<String> {
        self.slots.iter().map(|s| s.forecast.name.clone()).collect()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.forecast.name == name)
    }

    pub fn model(&self, index: usize) -> Option<&ModelForecast> {
        self.slots.get(index).map(|s| &s.forecast)
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelForecast> {
        self.slots.iter().map(|s| &s.forecast)
    }

    pub(crate) fn models_mut(&mut self) -> impl Iterator<Item = &mut ModelForecast> {
        self.slots.iter_mut().map(|s| &mut s.forecast)
    }

    /// The trailing `prediction_samples` observations, or all of them if fewer exist
    pub fn training_window<'a>(&self, history: &'a [f64]) -> &'a [f64] {
        let start = history.len().saturating_sub(self.config.prediction_samples);
        &history[start..]
    }

    /// Forecast every model over the trailing window of `history`.
    ///
    /// Forecasts target the periods right after the last observation.
    /// Returns once every task has finished or hit its deadline.
    pub async fn predict(&mut self, history: &[f64]) -> EnsembleReport {
        let start = Instant::now();
        let samples: Arc<[f64]> = Arc::from(self.training_window(history));
        let horizon = self.config.prediction_number;
        let deadline = self.config.forecast_timeout();

        let results: Vec<Result<Vec<f64>, SkipReason>> = if self.is_single() {
            let slot = &self.slots[0];
            vec![
                run_forecast(
                    slot.forecaster.clone(),
                    samples,
                    horizon,
                    slot.forecast.name.clone(),
                    deadline,
                )
                .await,
            ]
        } else {
            let handles: Vec<_> = self
                .slots
                .iter()
                .map(|slot| {
                    tokio::spawn(run_forecast(
                        slot.forecaster.clone(),
                        samples.clone(),
                        horizon,
                        slot.forecast.name.clone(),
                        deadline,
                    ))
                })
                .collect();

            let mut results = Vec::with_capacity(handles.len());
            for handle in handles {
                results.push(handle.await.unwrap_or(Err(SkipReason::Aborted)));
            }
            results
        };

        let mut report = EnsembleReport::default();
        for (slot, result) in self.slots.iter_mut().zip(results) {
            let name = slot.forecast.name.clone();
            match result {
                Ok(values) => {
                    report.appended.push((name, values.len()));
                    slot.forecast.append_from(history.len(), values);
                }
                Err(reason) => {
                    debug!(model = %name, reason = %reason, "Skipping forecast update");
                    report.skipped.push((name, reason));
                }
            }
        }
        report.duration = start.elapsed();

        debug!(
            appended = report.appended.len(),
            skipped = report.skipped.len(),
            elapsed_ms = report.duration.as_millis(),
            "Ensemble cycle complete"
        );
        report
    }
}

async fn run_forecast(
    forecaster: Arc<dyn Forecaster>,
    samples: Arc<[f64]>,
    horizon: usize,
    model: String,
    deadline: Duration,
) -> Result<Vec<f64>, SkipReason> {
    match tokio::time::timeout(deadline, forecaster.forecast(&samples, horizon, &model)).await {
        Err(_) => Err(SkipReason::TimedOut),
        Ok(Err(e)) => Err(SkipReason::Failed(e.to_string())),
        Ok(Ok(values)) if values.is_empty() => Err(SkipReason::Empty),
        Ok(Ok(mut values)) => {
            values.truncate(horizon);
            Ok(values)
        }
    }
}
