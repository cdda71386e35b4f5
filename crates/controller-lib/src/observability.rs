//! Prometheus metrics and structured event logging for the controller

use crate::bandit::{Credit, Decision};
use crate::forecast::SkipReason;
use prometheus::{
    register_gauge, register_gauge_vec, register_histogram, register_int_counter,
    register_int_counter_vec, Gauge, GaugeVec, Histogram, IntCounter, IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Analyze cycles span remote forecasts, so buckets reach well past a second
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

static GLOBAL_METRICS: OnceLock<ControllerMetricsInner> = OnceLock::new();

struct ControllerMetricsInner {
    cycle_latency_seconds: Histogram,
    forecast_latency_seconds: Histogram,
    forecasts_appended: IntCounterVec,
    forecasts_skipped: IntCounterVec,
    decisions_opened: IntCounterVec,
    decisions_closed: IntCounter,
    last_reward: Gauge,
    model_value: GaugeVec,
    model_visits: GaugeVec,
    model_rmse: GaugeVec,
    chosen_model_info: GaugeVec,
}

impl ControllerMetricsInner {
    fn new() -> Self {
        Self {
            cycle_latency_seconds: register_histogram!(
                "stream_controller_cycle_latency_seconds",
                "Time spent in one analyze cycle",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_latency_seconds"),

            forecast_latency_seconds: register_histogram!(
                "stream_controller_forecast_latency_seconds",
                "Time spent waiting for the ensemble to forecast",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register forecast_latency_seconds"),

            forecasts_appended: register_int_counter_vec!(
                "stream_controller_forecasts_appended_total",
                "Forecast updates appended to a model buffer",
                &["model"]
            )
            .expect("Failed to register forecasts_appended"),

            forecasts_skipped: register_int_counter_vec!(
                "stream_controller_forecasts_skipped_total",
                "Forecast updates skipped after a failure, timeout or empty answer",
                &["model"]
            )
            .expect("Failed to register forecasts_skipped"),

            decisions_opened: register_int_counter_vec!(
                "stream_controller_bandit_decisions_opened_total",
                "Bandit decisions opened, by selection kind",
                &["kind"]
            )
            .expect("Failed to register decisions_opened"),

            decisions_closed: register_int_counter!(
                "stream_controller_bandit_decisions_closed_total",
                "Bandit decisions closed with a reward"
            )
            .expect("Failed to register decisions_closed"),

            last_reward: register_gauge!(
                "stream_controller_bandit_last_reward",
                "Reward of the most recently closed decision"
            )
            .expect("Failed to register last_reward"),

            model_value: register_gauge_vec!(
                "stream_controller_model_value",
                "Bandit value estimate per model",
                &["model"]
            )
            .expect("Failed to register model_value"),

            model_visits: register_gauge_vec!(
                "stream_controller_model_visits",
                "Credited bandit decisions per model",
                &["model"]
            )
            .expect("Failed to register model_visits"),

            model_rmse: register_gauge_vec!(
                "stream_controller_model_rmse",
                "Latest accuracy estimate per model",
                &["model"]
            )
            .expect("Failed to register model_rmse"),

            chosen_model_info: register_gauge_vec!(
                "stream_controller_chosen_model_info",
                "Model whose forecast currently drives scaling",
                &["model", "policy"]
            )
            .expect("Failed to register chosen_model_info"),
        }
    }
}

/// Handle to the process-wide controller metrics; clones share one registration
#[derive(Clone)]
pub struct ControllerMetrics {
    _private: (),
}

impl Default for ControllerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ControllerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ControllerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ControllerMetricsInner {
        GLOBAL_METRICS.get_or_init(ControllerMetricsInner::new)
    }

    pub fn observe_cycle_latency(&self, duration_secs: f64) {
        self.inner().cycle_latency_seconds.observe(duration_secs);
    }

    pub fn observe_forecast_latency(&self, duration_secs: f64) {
        self.inner().forecast_latency_seconds.observe(duration_secs);
    }

    pub fn inc_forecast_appended(&self, model: &str) {
        self.inner().forecasts_appended.with_label_values(&[model]).inc();
    }

    pub fn inc_forecast_skipped(&self, model: &str) {
        self.inner().forecasts_skipped.with_label_values(&[model]).inc();
    }

    pub fn inc_decision_opened(&self, kind: &str) {
        self.inner().decisions_opened.with_label_values(&[kind]).inc();
    }

    pub fn record_credit(&self, reward: f64) {
        self.inner().decisions_closed.inc();
        self.inner().last_reward.set(reward);
    }

    pub fn set_model_estimate(&self, model: &str, value: f64, visits: u64) {
        self.inner().model_value.with_label_values(&[model]).set(value);
        self.inner()
            .model_visits
            .with_label_values(&[model])
            .set(visits as f64);
    }

    pub fn set_model_rmse(&self, model: &str, rmse: f64) {
        self.inner().model_rmse.with_label_values(&[model]).set(rmse);
    }

    pub fn set_chosen_model(&self, model: &str, policy: &str) {
        self.inner().chosen_model_info.reset();
        self.inner()
            .chosen_model_info
            .with_label_values(&[model, policy])
            .set(1.0);
    }
}

/// Structured logger for controller events
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn log_startup(&self, version: &str, policy: &str, models: &[String]) {
        info!(
            event = "controller_started",
            instance = %self.instance,
            version = %version,
            policy = %policy,
            models = ?models,
            "Adaptive controller started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "controller_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Adaptive controller shutting down"
        );
    }

    pub fn log_decision_opened(&self, decision: &Decision, round: u64) {
        info!(
            event = "decision_opened",
            instance = %self.instance,
            decision_id = %decision.id,
            model = %decision.model,
            kind = ?decision.kind,
            round = round,
            "Bandit decision opened"
        );
    }

    pub fn log_decision_closed(&self, credit: &Credit) {
        info!(
            event = "decision_closed",
            instance = %self.instance,
            decision_id = %credit.decision_id,
            model = %credit.model,
            reward = credit.reward,
            value = credit.value,
            credited = credit.credited,
            "Bandit decision closed"
        );
    }

    pub fn log_forecast_skipped(&self, model: &str, reason: &SkipReason) {
        warn!(
            event = "forecast_skipped",
            instance = %self.instance,
            model = %model,
            reason = %reason,
            "Forecast update skipped"
        );
    }

    pub fn log_model_selected(&self, model: &str, policy: &str, changed: bool) {
        if changed {
            info!(
                event = "model_selected",
                instance = %self.instance,
                model = %model,
                policy = %policy,
                "Active model changed"
            );
        } else {
            debug!(
                event = "model_selected",
                instance = %self.instance,
                model = %model,
                policy = %policy,
                "Active model kept"
            );
        }
    }
}
