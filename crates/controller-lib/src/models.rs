//! Core data models shared by the controller, its API and the monitor

use serde::{Deserialize, Serialize};

/// Per-operator statistics sampled by the topology monitor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperatorStats {
    pub name: String,
    pub replicas: i64,
    /// Tuples emitted by the operator during the last tick
    pub output: i64,
}

/// One monitor tick worth of topology state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopologySnapshot {
    /// Full observed input-rate history, oldest first
    pub input_rate: Vec<f64>,
    /// Input rate observed during the current tick
    pub current_input_rate: f64,
    pub operators: Vec<OperatorStats>,
    pub latency_ms: f64,
    pub timestamp: i64,
}

impl TopologySnapshot {
    pub fn total_replicas(&self) -> i64 {
        self.operators.iter().map(|o| o.replicas).sum()
    }
}

/// Request body accepted by the forecasting service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastRequest {
    pub samples: Vec<f64>,
    pub prediction_number: usize,
}

/// Response body returned by the forecasting service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastResponse {
    #[serde(default)]
    pub avg_prediction: f64,
    pub predictions: Vec<f64>,
}

/// Per-model view exposed through the status API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelStatus {
    pub name: String,
    pub buffer_len: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rmse: Option<f64>,
    pub value: f64,
    pub visits: u64,
}

/// Snapshot of the controller published after every analyze cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerStatus {
    pub cycle: u64,
    pub policy: String,
    pub chosen_model: String,
    pub chosen_index: usize,
    pub bandit_round: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_decision: Option<String>,
    pub models: Vec<ModelStatus>,
    /// Every model ordered by current bandit score, best first
    pub ranking: Vec<String>,
    /// Forecast buffer of the chosen model, indexed by period
    pub chosen_forecast: Vec<f64>,
    pub generated_at: i64,
}

impl ControllerStatus {
    /// Forecast for a logical period; out-of-range periods clamp to the last value
    pub fn forecast_at(&self, period: usize) -> Option<f64> {
        let last = self.chosen_forecast.len().checked_sub(1)?;
        self.chosen_forecast.get(period.min(last)).copied()
    }
}
