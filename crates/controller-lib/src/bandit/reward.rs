//! Outcome sampling and reward shaping
//!
//! The monitor feeds one [`OutcomeSample`] per tick while a decision is
//! open. When the window closes the samples are averaged into an
//! [`Outcome`] and credited to the decision that caused it.

use super::config::{clamp01, RewardBounds, RewardWeights};
use super::selector::{BanditSelector, Credit};
use crate::models::TopologySnapshot;
use serde::Deserialize;
use tracing::debug;

/// Averaged outcome of one decision window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outcome {
    /// Milliseconds, lower is better
    pub latency_ms: f64,
    /// Throughput degradation ratio in [0, 1], lower is better
    pub degrade: f64,
    /// Resource saving ratio in [0, 1], higher is better
    pub saving: f64,
}

/// Scalar reward in [0, sum(weights)] for an outcome
pub fn compute_reward(outcome: &Outcome, weights: &RewardWeights, bounds: &RewardBounds) -> f64 {
    let degrade = clamp01(outcome.degrade);
    let saving = clamp01(outcome.saving);

    let latency_norm = bounds.latency.normalize(outcome.latency_ms);
    let degrade_norm = bounds.degrade.normalize(degrade);
    let saving_norm = bounds.saving.normalize(saving);

    weights.latency * (1.0 - latency_norm)
        + weights.degrade * (1.0 - degrade_norm)
        + weights.saving * saving_norm
}

/// How raw topology snapshots are turned into outcome samples
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Replica count the saving ratio is measured against; `<= 0` uses the current total
    pub baseline_replicas: i64,
    /// Operator whose output counter measures delivered throughput; `None` sums all operators
    pub output_operator: Option<String>,
}

/// One monitor tick worth of outcome metrics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutcomeSample {
    pub latency_ms: f64,
    pub degrade: f64,
    pub saving: f64,
}

impl OutcomeSample {
    pub fn from_snapshot(snapshot: &TopologySnapshot, config: &RewardConfig) -> Self {
        let total_replicas = snapshot.total_replicas();
        let baseline = if config.baseline_replicas > 0 {
            config.baseline_replicas
        } else {
            total_replicas
        };
        let saving = if baseline > 0 {
            clamp01((baseline - total_replicas) as f64 / baseline as f64)
        } else {
            0.0
        };

        let output: i64 = match config.output_operator.as_deref() {
            Some(name) => snapshot
                .operators
                .iter()
                .find(|o| o.name == name)
                .map(|o| o.output)
                .unwrap_or(0),
            None => snapshot.operators.iter().map(|o| o.output).sum(),
        };
        let input = snapshot.current_input_rate;
        let degrade = if input <= 0.0 {
            1.0
        } else {
            clamp01((input - output as f64).abs() / input)
        };

        Self {
            latency_ms: snapshot.latency_ms,
            degrade,
            saving,
        }
    }
}

/// Accumulates outcome samples for the open decision window
#[derive(Debug, Default)]
pub struct RewardAggregator {
    config: RewardConfig,
    latency: Vec<f64>,
    degrade: Vec<f64>,
    saving: Vec<f64>,
}

impl RewardAggregator {
    pub fn new(config: RewardConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &RewardConfig {
        &self.config
    }

    /// Record the outcome metrics of one monitor tick
    pub fn record_snapshot(&mut self, snapshot: &TopologySnapshot) {
        let sample = OutcomeSample::from_snapshot(snapshot, &self.config);
        self.record(sample);
    }

    pub fn record(&mut self, sample: OutcomeSample) {
        self.latency.push(sample.latency_ms);
        self.degrade.push(sample.degrade);
        self.saving.push(sample.saving);
    }

    pub fn sample_count(&self) -> usize {
        self.latency.len()
    }

    /// Mean of every buffer, or `None` if any buffer is still empty
    pub fn reduce(&self) -> Option<Outcome> {
        Some(Outcome {
            latency_ms: mean(&self.latency)?,
            degrade: mean(&self.degrade)?,
            saving: mean(&self.saving)?,
        })
    }

    /// Reduce the window and credit it to `decision_id`.
    ///
    /// With no evidence collected the decision stays open and nothing changes.
    /// Buffers are cleared only after a successful reduction.
    pub fn close_window(&mut self, bandit: &mut BanditSelector, decision_id: &str) -> Option<Credit> {
        let Some(outcome) = self.reduce() else {
            debug!(decision_id = %decision_id, "Empty outcome window, decision left open");
            return None;
        };
        let credit = bandit.close(decision_id, &outcome);
        self.clear();
        credit
    }

    pub fn clear(&mut self) {
        self.latency.clear();
        self.degrade.clear();
        self.saving.clear();
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}
