//! Selection policy routing
//!
//! Exactly one policy decides, each cycle, whose forecast the planner
//! reads: a fixed model, the most accurate model, the bandit's choice, or
//! a draw from an offline-tuned probability table.

mod tables;

pub use tables::{Band, ProbabilityTable, ProbabilityTables};

use crate::bandit::{BanditSelector, Decision};
use crate::error::{ControllerError, ControllerResult};
use crate::forecast::{AccuracyEstimator, PredictionEnsemble};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Which policy picks the active model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    Fixed,
    Accuracy,
    Bandit,
    Table,
}

impl PolicyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyKind::Fixed => "fixed",
            PolicyKind::Accuracy => "accuracy",
            PolicyKind::Bandit => "bandit",
            PolicyKind::Table => "table",
        }
    }
}

/// Selection policy configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    pub policy: PolicyKind,
    /// Model used by the `fixed` policy
    pub fixed_model: Option<String>,
    /// Table key for the `table` policy, e.g. `ucb/dns`
    pub dataset: String,
    /// Extra or overriding probability tables
    pub tables: HashMap<String, Vec<Band>>,
    /// Seed of the table draw; 0 seeds from OS entropy
    pub seed: u64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            policy: PolicyKind::Accuracy,
            fixed_model: None,
            dataset: String::new(),
            tables: HashMap::new(),
            seed: 42,
        }
    }
}

/// The model chosen for one cycle
#[derive(Debug, Clone)]
pub struct Selection {
    pub index: usize,
    pub model: String,
    /// Bandit decision backing this selection, if any
    pub decision: Option<Decision>,
    /// Uniform draw used by the table policy
    pub draw: Option<f64>,
}

enum Resolved {
    Fixed(usize),
    Accuracy,
    Bandit,
    /// Table whose models are all in the catalog
    Table(ProbabilityTable),
    /// Unknown table key: behave like the first catalog model
    TableFallback,
}

/// Dispatches model selection to the configured policy
pub struct PolicyRouter {
    kind: PolicyKind,
    resolved: Resolved,
    rng: StdRng,
}

impl PolicyRouter {
    /// Resolve the policy against the catalog; model names in tables must exist
    pub fn new(config: &SelectionConfig, catalog: &[String]) -> ControllerResult<Self> {
        let index_of = |name: &str| {
            catalog
                .iter()
                .position(|m| m == name)
                .ok_or_else(|| ControllerError::UnknownModel(name.to_string()))
        };

        let resolved = match config.policy {
            PolicyKind::Fixed => {
                let name = config.fixed_model.as_deref().ok_or_else(|| {
                    ControllerError::InvalidConfig("fixed policy requires fixed_model".to_string())
                })?;
                Resolved::Fixed(index_of(name)?)
            }
            PolicyKind::Accuracy => Resolved::Accuracy,
            PolicyKind::Bandit => Resolved::Bandit,
            PolicyKind::Table => {
                let mut tables = ProbabilityTables::builtin();
                tables.extend(config.tables.clone());
                match tables.get(&config.dataset) {
                    Some(table) if table.is_empty() => {
                        return Err(ControllerError::EmptyTable(config.dataset.clone()));
                    }
                    // A catalog narrowed to one model never consults the table
                    Some(_) if catalog.len() == 1 => Resolved::TableFallback,
                    Some(table) => {
                        for band in table.bands() {
                            index_of(&band.model)?;
                        }
                        Resolved::Table(table.clone())
                    }
                    None => {
                        warn!(dataset = %config.dataset, "No probability table for dataset, using first model");
                        Resolved::TableFallback
                    }
                }
            }
        };

        let rng = if config.seed == 0 {
            StdRng::from_os_rng()
        } else {
            StdRng::seed_from_u64(config.seed)
        };

        Ok(Self {
            kind: config.policy,
            resolved,
            rng,
        })
    }

    pub fn kind(&self) -> PolicyKind {
        self.kind
    }

    /// Pick the model for this cycle.
    ///
    /// A single-model ensemble always selects that model without consulting
    /// any policy.
    pub fn select(
        &mut self,
        ensemble: &mut PredictionEnsemble,
        accuracy: &AccuracyEstimator,
        bandit: &mut BanditSelector,
        actual: &[f64],
        now: DateTime<Utc>,
    ) -> Selection {
        if ensemble.is_single() {
            debug!("Single model configured, selector not used");
            return self.selection(ensemble, 0, None, None);
        }

        match &self.resolved {
            Resolved::Fixed(index) => self.selection(ensemble, *index, None, None),
            Resolved::Accuracy => {
                let index = accuracy.select(ensemble, actual);
                self.selection(ensemble, index, None, None)
            }
            Resolved::Bandit => {
                let decision = bandit.choose(now);
                let index = ensemble.index_of(&decision.model).unwrap_or(0);
                self.selection(ensemble, index, Some(decision), None)
            }
            Resolved::Table(table) => {
                let draw: f64 = self.rng.random();
                let index = table
                    .pick(draw)
                    .and_then(|model| ensemble.index_of(model))
                    .unwrap_or(0);
                self.selection(ensemble, index, None, Some(draw))
            }
            Resolved::TableFallback => self.selection(ensemble, 0, None, None),
        }
    }

    fn selection(
        &self,
        ensemble: &PredictionEnsemble,
        index: usize,
        decision: Option<Decision>,
        draw: Option<f64>,
    ) -> Selection {
        let model = ensemble
            .model(index)
            .map(|m| m.name().to_string())
            .unwrap_or_default();
        Selection {
            index,
            model,
            decision,
            draw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bandit::BanditConfig;
    use crate::forecast::{EnsembleConfig, Forecaster, MULTI_MODEL};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct ConstantForecaster(f64);

    #[async_trait]
    impl Forecaster for ConstantForecaster {
        async fn forecast(&self, _: &[f64], horizon: usize, _: &str) -> Result<Vec<f64>> {
            Ok(vec![self.0; horizon])
        }
    }

    fn catalog() -> Vec<String> {
        ["basic", "ann", "bayesian", "sgd"].iter().map(|s| s.to_string()).collect()
    }

    fn parts(values: &[f64]) -> (PredictionEnsemble, AccuracyEstimator, BanditSelector) {
        let names = catalog();
        let config = EnsembleConfig {
            models: names.clone(),
            predictive_model: MULTI_MODEL.to_string(),
            analyze_samples: 0,
            prediction_samples: 4,
            prediction_number: 4,
            forecast_timeout_ms: 1000,
        };
        let forecasters = names
            .iter()
            .zip(values)
            .map(|(n, v)| (n.clone(), Arc::new(ConstantForecaster(*v)) as Arc<dyn Forecaster>))
            .collect();
        let ensemble = PredictionEnsemble::with_forecasters(config, forecasters).unwrap();
        let bandit = BanditSelector::new(&names, BanditConfig { cold_start: true, ..Default::default() }).unwrap();
        (ensemble, AccuracyEstimator::new(4), bandit)
    }

    #[test]
    fn test_fixed_policy_requires_known_model() {
        let mut config = SelectionConfig { policy: PolicyKind::Fixed, ..Default::default() };
        assert!(matches!(
            PolicyRouter::new(&config, &catalog()),
            Err(ControllerError::InvalidConfig(_))
        ));

        config.fixed_model = Some("lstm".to_string());
        assert!(matches!(
            PolicyRouter::new(&config, &catalog()),
            Err(ControllerError::UnknownModel(_))
        ));
    }

    #[test]
    fn test_fixed_policy_selects_model() {
        let (mut ensemble, accuracy, mut bandit) = parts(&[1.0, 2.0, 3.0, 4.0]);
        let config = SelectionConfig {
            policy: PolicyKind::Fixed,
            fixed_model: Some("bayesian".to_string()),
            ..Default::default()
        };
        let mut router = PolicyRouter::new(&config, &catalog()).unwrap();
        let selection = router.select(&mut ensemble, &accuracy, &mut bandit, &[], Utc::now());
        assert_eq!(selection.index, 2);
        assert_eq!(selection.model, "bayesian");
    }

    #[tokio::test]
    async fn test_accuracy_policy_picks_closest_model() {
        let (mut ensemble, accuracy, mut bandit) = parts(&[0.0, 9.0, 10.5, 30.0]);
        ensemble.predict(&[10.0]).await;

        let mut router = PolicyRouter::new(&SelectionConfig::default(), &catalog()).unwrap();
        let selection = router.select(&mut ensemble, &accuracy, &mut bandit, &[10.0; 5], Utc::now());
        assert_eq!(selection.model, "bayesian");
        assert!(selection.decision.is_none());
    }

    #[test]
    fn test_bandit_policy_opens_decision() {
        let (mut ensemble, accuracy, mut bandit) = parts(&[1.0, 2.0, 3.0, 4.0]);
        let config = SelectionConfig { policy: PolicyKind::Bandit, ..Default::default() };
        let mut router = PolicyRouter::new(&config, &catalog()).unwrap();

        let selection = router.select(&mut ensemble, &accuracy, &mut bandit, &[], Utc::now());
        assert_eq!(selection.model, "basic");
        assert!(selection.decision.is_some());
        assert!(bandit.is_open());
    }

    #[test]
    fn test_table_policy_draws_from_bands() {
        let (mut ensemble, accuracy, mut bandit) = parts(&[1.0, 2.0, 3.0, 4.0]);
        let config = SelectionConfig {
            policy: PolicyKind::Table,
            dataset: "ucb/dns".to_string(),
            seed: 11,
            ..Default::default()
        };
        let mut router = PolicyRouter::new(&config, &catalog()).unwrap();
        for _ in 0..50 {
            let s = router.select(&mut ensemble, &accuracy, &mut bandit, &[], Utc::now());
            let draw = s.draw.unwrap();
            let expected = if draw <= 0.167 {
                "ann"
            } else if draw <= 0.296 {
                "bayesian"
            } else {
                "sgd"
            };
            assert_eq!(s.model, expected);
        }
    }

    #[test]
    fn test_configured_table_overflow_goes_to_last_band() {
        let (mut ensemble, accuracy, mut bandit) = parts(&[1.0, 2.0, 3.0, 4.0]);
        let mut tables = HashMap::new();
        tables.insert(
            "custom".to_string(),
            vec![Band::new(0.25, "sgd"), Band::new(0.5, "basic")],
        );
        let config = SelectionConfig {
            policy: PolicyKind::Table,
            dataset: "custom".to_string(),
            tables,
            seed: 3,
            ..Default::default()
        };
        let mut router = PolicyRouter::new(&config, &catalog()).unwrap();
        let mut overflowed = 0;
        for _ in 0..100 {
            let s = router.select(&mut ensemble, &accuracy, &mut bandit, &[], Utc::now());
            let draw = s.draw.unwrap();
            if draw <= 0.25 {
                assert_eq!(s.model, "sgd");
                assert_eq!(s.index, 3);
            } else {
                assert_eq!(s.model, "basic");
                assert_eq!(s.index, 0);
                if draw > 0.5 {
                    overflowed += 1;
                }
            }
        }
        assert!(overflowed > 0);
    }

    #[test]
    fn test_unknown_table_falls_back_to_first_model() {
        let (mut ensemble, accuracy, mut bandit) = parts(&[1.0, 2.0, 3.0, 4.0]);
        let config = SelectionConfig {
            policy: PolicyKind::Table,
            dataset: "greedy/unknown".to_string(),
            ..Default::default()
        };
        let mut router = PolicyRouter::new(&config, &catalog()).unwrap();
        let s = router.select(&mut ensemble, &accuracy, &mut bandit, &[], Utc::now());
        assert_eq!(s.index, 0);
        assert!(s.draw.is_none());
    }

    #[test]
    fn test_table_with_unknown_model_rejected() {
        let mut tables = HashMap::new();
        tables.insert("custom".to_string(), vec![Band::new(1.0, "lstm")]);
        let config = SelectionConfig {
            policy: PolicyKind::Table,
            dataset: "custom".to_string(),
            tables,
            ..Default::default()
        };
        assert!(matches!(
            PolicyRouter::new(&config, &catalog()),
            Err(ControllerError::UnknownModel(_))
        ));
    }

    #[test]
    fn test_empty_table_rejected() {
        let mut tables = HashMap::new();
        tables.insert("custom".to_string(), vec![]);
        let config = SelectionConfig {
            policy: PolicyKind::Table,
            dataset: "custom".to_string(),
            tables,
            ..Default::default()
        };
        assert!(matches!(
            PolicyRouter::new(&config, &catalog()),
            Err(ControllerError::EmptyTable(_))
        ));
    }
}
