//! The adaptive controller: ensemble, estimators and policy in one owned object
//!
//! The control loop is the only writer. Each monitor tick goes through
//! [`AdaptiveController::observe`]; each decision period runs
//! [`AdaptiveController::analyze`], which forecasts, credits the closing
//! bandit window and picks the model whose forecast the planner reads.

use crate::bandit::{BanditConfig, BanditSelector, Credit, Decision, RewardAggregator, RewardConfig};
use crate::error::ControllerResult;
use crate::forecast::{AccuracyEstimator, EnsembleConfig, EnsembleReport, Forecaster, PredictionEnsemble};
use crate::models::{ControllerStatus, ModelStatus, TopologySnapshot};
use crate::selection::{PolicyKind, PolicyRouter, Selection, SelectionConfig};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Everything the controller needs, read once at startup
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ControllerSettings {
    pub ensemble: EnsembleConfig,
    pub bandit: BanditConfig,
    pub reward: RewardConfig,
    pub selection: SelectionConfig,
}

impl ControllerSettings {
    pub fn validate(&self) -> ControllerResult<()> {
        self.ensemble.validate()?;
        self.bandit.validate()
    }
}

/// What one analyze cycle did
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle: u64,
    pub ensemble: EnsembleReport,
    /// Credit for the bandit window closed this cycle
    pub credit: Option<Credit>,
    /// Decision opened this cycle, if the bandit made a new one
    pub opened: Option<Decision>,
    pub selection: Selection,
    /// Whether the active model differs from the previous cycle's
    pub changed: bool,
    pub duration: Duration,
}

pub struct AdaptiveController {
    settings: ControllerSettings,
    ensemble: PredictionEnsemble,
    accuracy: AccuracyEstimator,
    bandit: BanditSelector,
    aggregator: RewardAggregator,
    router: PolicyRouter,
    chosen: usize,
    cycle: u64,
}

impl AdaptiveController {
    /// Build a controller whose remote models all go through `remote`
    pub fn new(settings: ControllerSettings, remote: Arc<dyn Forecaster>) -> ControllerResult<Self> {
        let ensemble = PredictionEnsemble::new(settings.ensemble.clone(), remote)?;
        Self::with_ensemble(settings, ensemble)
    }

    /// Build a controller around an already assembled ensemble
    pub fn with_ensemble(settings: ControllerSettings, ensemble: PredictionEnsemble) -> ControllerResult<Self> {
        settings.validate()?;
        let catalog = ensemble.names();
        let bandit = BanditSelector::new(&catalog, settings.bandit.clone())?;
        let router = PolicyRouter::new(&settings.selection, &catalog)?;
        let accuracy = AccuracyEstimator::new(settings.ensemble.accuracy_window());
        let aggregator = RewardAggregator::new(settings.reward.clone());

        Ok(Self {
            settings,
            ensemble,
            accuracy,
            bandit,
            aggregator,
            router,
            chosen: 0,
            cycle: 0,
        })
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn ensemble(&self) -> &PredictionEnsemble {
        &self.ensemble
    }

    pub fn bandit(&self) -> &BanditSelector {
        &self.bandit
    }

    pub fn aggregator(&self) -> &RewardAggregator {
        &self.aggregator
    }

    pub fn policy(&self) -> PolicyKind {
        self.router.kind()
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Feed one monitor tick. Outcome samples are kept only while a bandit decision is open.
    pub fn observe(&mut self, snapshot: &TopologySnapshot) -> bool {
        if self.router.kind() != PolicyKind::Bandit || !self.bandit.is_open() {
            return false;
        }
        self.aggregator.record_snapshot(snapshot);
        true
    }

    /// Run one decision cycle against the latest snapshot
    pub async fn analyze(&mut self, snapshot: &TopologySnapshot, now: DateTime<Utc>) -> CycleReport {
        let start = Instant::now();
        self.cycle += 1;

        let ensemble = self.ensemble.predict(&snapshot.input_rate).await;

        // The accuracy policy scores models itself while selecting
        if !self.ensemble.is_single() && self.router.kind() != PolicyKind::Accuracy {
            self.accuracy.estimate(&mut self.ensemble, &snapshot.input_rate);
        }

        let credit = match self.bandit.open_decision().map(|d| d.id.clone()) {
            Some(id) if self.router.kind() == PolicyKind::Bandit => {
                self.aggregator.close_window(&mut self.bandit, &id)
            }
            _ => None,
        };

        let previously_open = self.bandit.open_decision().map(|d| d.id.clone());
        let selection = self.router.select(
            &mut self.ensemble,
            &self.accuracy,
            &mut self.bandit,
            &snapshot.input_rate,
            now,
        );
        let opened = selection
            .decision
            .as_ref()
            .filter(|d| previously_open.as_deref() != Some(d.id.as_str()))
            .cloned();

        let changed = self.cycle == 1 || selection.index != self.chosen;
        self.chosen = selection.index;

        debug!(
            cycle = self.cycle,
            model = %selection.model,
            appended = ensemble.appended.len(),
            skipped = ensemble.skipped.len(),
            "Analyze cycle complete"
        );

        CycleReport {
            cycle: self.cycle,
            ensemble,
            credit,
            opened,
            selection,
            changed,
            duration: start.elapsed(),
        }
    }

    pub fn chosen_index(&self) -> usize {
        self.chosen
    }

    pub fn chosen_model(&self) -> &str {
        self.ensemble.model(self.chosen).map(|m| m.name()).unwrap_or_default()
    }

    /// The chosen model's forecast for a period; periods past the buffer clamp to its last value
    pub fn predicted_input(&self, period: usize) -> Option<f64> {
        self.ensemble.model(self.chosen)?.forecast_at(period)
    }

    /// The `k` best models by bandit score
    pub fn ranking(&self, k: usize) -> Vec<String> {
        self.bandit.rank_top_k(k)
    }

    /// Drop all learned bandit state and any collected outcome samples
    pub fn reinitialize(&mut self) {
        self.bandit.reset();
        self.aggregator = RewardAggregator::new(self.settings.reward.clone());
        debug!("Bandit and reward state reinitialized");
    }

    /// Immutable view for API readers
    pub fn status(&self) -> ControllerStatus {
        let models = self
            .ensemble
            .models()
            .map(|m| ModelStatus {
                name: m.name().to_string(),
                buffer_len: m.buffer().len(),
                rmse: m.error_estimate(),
                value: self.bandit.value(m.name()).unwrap_or(0.0),
                visits: self.bandit.visits(m.name()).unwrap_or(0),
            })
            .collect();

        ControllerStatus {
            cycle: self.cycle,
            policy: self.router.kind().as_str().to_string(),
            chosen_model: self.chosen_model().to_string(),
            chosen_index: self.chosen,
            bandit_round: self.bandit.round(),
            open_decision: self.bandit.open_decision().map(|d| d.id.clone()),
            models,
            ranking: self.bandit.rank_top_k(self.ensemble.len()),
            chosen_forecast: self
                .ensemble
                .model(self.chosen)
                .map(|m| m.buffer().to_vec())
                .unwrap_or_default(),
            generated_at: Utc::now().timestamp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::MULTI_MODEL;
    use crate::models::OperatorStats;
    use anyhow::Result;
    use async_trait::async_trait;

    struct ConstantForecaster(f64);

    #[async_trait]
    impl Forecaster for ConstantForecaster {
        async fn forecast(&self, _: &[f64], horizon: usize, _: &str) -> Result<Vec<f64>> {
            Ok(vec![self.0; horizon])
        }
    }

    /// Extends the last step of the window
    struct TrendForecaster;

    #[async_trait]
    impl Forecaster for TrendForecaster {
        async fn forecast(&self, samples: &[f64], horizon: usize, _: &str) -> Result<Vec<f64>> {
            let last = samples.last().copied().unwrap_or_default();
            let step = match samples {
                [.., prev, next] => next - prev,
                _ => 0.0,
            };
            Ok((1..=horizon).map(|i| last + step * i as f64).collect())
        }
    }

    fn settings(policy: PolicyKind, names: &[&str]) -> ControllerSettings {
        ControllerSettings {
            ensemble: EnsembleConfig {
                models: names.iter().map(|s| s.to_string()).collect(),
                predictive_model: MULTI_MODEL.to_string(),
                analyze_samples: 2,
                prediction_samples: 8,
                prediction_number: 2,
                forecast_timeout_ms: 1000,
            },
            bandit: BanditConfig {
                cold_start: true,
                epsilon: 0.0,
                ..Default::default()
            },
            reward: RewardConfig {
                baseline_replicas: 10,
                output_operator: None,
            },
            selection: SelectionConfig {
                policy,
                ..Default::default()
            },
        }
    }

    fn controller(policy: PolicyKind, models: &[(&str, f64)]) -> AdaptiveController {
        let names: Vec<&str> = models.iter().map(|(n, _)| *n).collect();
        let settings = settings(policy, &names);
        let forecasters = models
            .iter()
            .map(|(n, v)| (n.to_string(), Arc::new(ConstantForecaster(*v)) as Arc<dyn Forecaster>))
            .collect();
        let ensemble = PredictionEnsemble::with_forecasters(settings.ensemble.clone(), forecasters).unwrap();
        AdaptiveController::with_ensemble(settings, ensemble).unwrap()
    }

    fn snapshot(history: Vec<f64>) -> TopologySnapshot {
        let current = history.last().copied().unwrap_or_default();
        TopologySnapshot {
            input_rate: history,
            current_input_rate: current,
            operators: vec![OperatorStats {
                name: "sink".into(),
                replicas: 5,
                output: current as i64,
            }],
            latency_ms: 100.0,
            timestamp: 0,
        }
    }

    #[tokio::test]
    async fn test_bandit_cycle_credits_previous_window() {
        let mut c = controller(PolicyKind::Bandit, &[("a", 1.0), ("b", 2.0), ("c", 3.0)]);
        let snap = snapshot(vec![10.0, 10.0, 10.0]);

        // Nothing open yet, so ticks are not recorded
        assert!(!c.observe(&snap));

        let first = c.analyze(&snap, Utc::now()).await;
        assert_eq!(first.selection.model, "a");
        assert!(first.opened.is_some());
        assert!(first.credit.is_none());

        assert!(c.observe(&snap));
        assert!(c.observe(&snap));
        assert_eq!(c.aggregator().sample_count(), 2);

        let second = c.analyze(&snap, Utc::now()).await;
        let credit = second.credit.unwrap();
        assert_eq!(credit.model, "a");
        assert!(credit.credited);
        assert_eq!(second.selection.model, "b");
        assert_eq!(c.bandit().visits("a"), Some(1));
        assert_eq!(c.aggregator().sample_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_window_keeps_decision_open() {
        let mut c = controller(PolicyKind::Bandit, &[("a", 1.0), ("b", 2.0)]);
        let snap = snapshot(vec![5.0]);

        let first = c.analyze(&snap, Utc::now()).await;
        let id = first.opened.unwrap().id;

        // No observe in between: the same decision is still the active one
        let second = c.analyze(&snap, Utc::now()).await;
        assert!(second.credit.is_none());
        assert!(second.opened.is_none());
        assert_eq!(second.selection.decision.unwrap().id, id);
        assert_eq!(c.bandit().total_visits(), 0);
    }

    #[tokio::test]
    async fn test_accuracy_policy_and_forecast_reads() {
        let mut c = controller(PolicyKind::Accuracy, &[("far", 40.0), ("near", 9.0)]);

        c.analyze(&snapshot(vec![10.0, 10.0]), Utc::now()).await;
        let snap = snapshot(vec![10.0; 4]);
        c.analyze(&snap, Utc::now()).await;
        assert_eq!(c.chosen_model(), "near");
        // buffer: two zero pads then two forecasts per cycle
        assert_eq!(c.predicted_input(0), Some(0.0));
        assert_eq!(c.predicted_input(3), Some(9.0));
        assert_eq!(c.predicted_input(100), Some(9.0));
        assert!(!c.observe(&snap));
    }

    #[tokio::test]
    async fn test_forecasts_line_up_with_observed_periods() {
        let settings = settings(PolicyKind::Accuracy, &["flat", "trend"]);
        let forecasters: Vec<(String, Arc<dyn Forecaster>)> = vec![
            ("flat".to_string(), Arc::new(ConstantForecaster(0.0))),
            ("trend".to_string(), Arc::new(TrendForecaster)),
        ];
        let ensemble = PredictionEnsemble::with_forecasters(settings.ensemble.clone(), forecasters).unwrap();
        let mut c = AdaptiveController::with_ensemble(settings, ensemble).unwrap();

        // One observation per tick, an analyze cycle every prediction_number ticks
        for tick in 2..=8usize {
            let snap = snapshot((0..tick).map(|i| i as f64).collect());
            c.observe(&snap);
            if tick % 2 == 0 {
                c.analyze(&snap, Utc::now()).await;
            }
        }

        let trend = c.ensemble().model(1).unwrap();
        assert_eq!(trend.buffer().len(), 10);
        assert_eq!(trend.error_estimate(), Some(0.0));
        assert!(c.ensemble().model(0).unwrap().error_estimate().unwrap() > 0.0);
        assert_eq!(c.chosen_model(), "trend");
        assert_eq!(c.predicted_input(9), Some(9.0));
    }

    #[tokio::test]
    async fn test_status_reflects_cycle() {
        let mut c = controller(PolicyKind::Bandit, &[("a", 1.0), ("b", 2.0)]);
        let snap = snapshot(vec![3.0, 4.0]);
        c.analyze(&snap, Utc::now()).await;

        let status = c.status();
        assert_eq!(status.cycle, 1);
        assert_eq!(status.policy, "bandit");
        assert_eq!(status.chosen_model, "a");
        assert_eq!(status.models.len(), 2);
        assert_eq!(status.models[0].buffer_len, 4);
        assert!(status.open_decision.is_some());
        assert_eq!(status.ranking.len(), 2);
        assert_eq!(status.forecast_at(99), Some(1.0));
    }

    #[tokio::test]
    async fn test_reinitialize_clears_learning() {
        let mut c = controller(PolicyKind::Bandit, &[("a", 1.0), ("b", 2.0)]);
        let snap = snapshot(vec![3.0]);
        c.analyze(&snap, Utc::now()).await;
        c.observe(&snap);
        c.analyze(&snap, Utc::now()).await;
        assert_eq!(c.bandit().total_visits(), 1);

        c.reinitialize();
        assert_eq!(c.bandit().total_visits(), 0);
        assert_eq!(c.bandit().round(), 0);
        assert!(!c.bandit().is_open());
        assert_eq!(c.aggregator().sample_count(), 0);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let mut s = settings(PolicyKind::Bandit, &["a"]);
        s.bandit.c = -1.0;
        let remote: Arc<dyn Forecaster> = Arc::new(ConstantForecaster(0.0));
        assert!(AdaptiveController::new(s, remote).is_err());
    }
}
