//! Multi-armed bandit model selector
//!
//! Chooses one forecasting model per decision window and learns from the
//! outcome observed once the window closes. At most one decision is open
//! at a time: asking again while a decision is open returns it unchanged.
//!
//! ```text
//!            choose(now)                    close(id, outcome)
//!   Closed ──────────────────▶ Open ─────────────────────────────▶ Closed
//!     ▲   cooldown reuse │                 Q, N updated (unless reused)
//!     └──────────────────┘
//! ```

use super::config::{BanditAlgorithm, BanditConfig, UpdateRule};
use super::reward::{compute_reward, Outcome};
use crate::error::{ControllerError, ControllerResult};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Why a decision picked its model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionKind {
    /// Previous model re-issued for one of its cooldown windows
    Reuse,
    /// First untried model in catalog order
    ColdStart,
    /// Best score under the configured algorithm
    Exploit,
    /// Uniform random pick (epsilon-greedy only)
    Explore,
}

impl SelectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionKind::Reuse => "reuse",
            SelectionKind::ColdStart => "cold_start",
            SelectionKind::Exploit => "exploit",
            SelectionKind::Explore => "explore",
        }
    }
}

/// A choice awaiting its outcome
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub id: String,
    pub model: String,
    pub kind: SelectionKind,
    pub made_at: DateTime<Utc>,
    /// Nominal end of the cooldown; reuse itself is counted in windows
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_until: Option<DateTime<Utc>>,
}

/// Result of closing a decision
#[derive(Debug, Clone, PartialEq)]
pub struct Credit {
    pub decision_id: String,
    pub model: String,
    pub reward: f64,
    /// Value estimate of the model after the update
    pub value: f64,
    /// False for cooldown reuses, which leave Q and N untouched
    pub credited: bool,
}

#[derive(Debug, Clone)]
struct ArmState {
    name: String,
    value: f64,
    visits: u64,
}

/// Online model selector with deferred credit assignment
pub struct BanditSelector {
    config: BanditConfig,
    arms: Vec<ArmState>,
    rounds: u64,
    pending: HashMap<String, Decision>,
    open: Option<String>,
    last: Option<Decision>,
    /// Windows the last fresh choice will still be re-issued for
    reuses_left: u32,
    sequence: u64,
    rng: StdRng,
}

impl BanditSelector {
    /// Build a selector over `models`, in catalog order
    pub fn new(models: &[String], config: BanditConfig) -> ControllerResult<Self> {
        if models.is_empty() {
            return Err(ControllerError::EmptyCatalog);
        }
        let mut seen = HashSet::new();
        for m in models {
            if !seen.insert(m.as_str()) {
                return Err(ControllerError::DuplicateModel(m.clone()));
            }
        }
        config.validate()?;

        let rng = if config.seed == 0 {
            StdRng::from_os_rng()
        } else {
            StdRng::seed_from_u64(config.seed)
        };

        Ok(Self {
            arms: models
                .iter()
                .map(|name| ArmState {
                    name: name.clone(),
                    value: 0.0,
                    visits: 0,
                })
                .collect(),
            config,
            rounds: 0,
            pending: HashMap::new(),
            open: None,
            last: None,
            reuses_left: 0,
            sequence: 0,
            rng,
        })
    }

    pub fn config(&self) -> &BanditConfig {
        &self.config
    }

    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.arms.iter().map(|a| a.name.as_str())
    }

    /// Global round counter T
    pub fn round(&self) -> u64 {
        self.rounds
    }

    pub fn value(&self, model: &str) -> Option<f64> {
        self.arm(model).map(|a| a.value)
    }

    pub fn visits(&self, model: &str) -> Option<u64> {
        self.arm(model).map(|a| a.visits)
    }

    pub fn total_visits(&self) -> u64 {
        self.arms.iter().map(|a| a.visits).sum()
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    pub fn open_decision(&self) -> Option<&Decision> {
        self.open.as_ref().and_then(|id| self.pending.get(id))
    }

    pub fn last_decision(&self) -> Option<&Decision> {
        self.last.as_ref()
    }

    /// Pick a model for the current window.
    ///
    /// Re-asking while a decision is open returns that decision unchanged.
    pub fn choose(&mut self, now: DateTime<Utc>) -> Decision {
        if let Some(open) = self.open_decision() {
            return open.clone();
        }

        if let Some(previous) = self.reusable() {
            self.reuses_left -= 1;
            let decision = Decision {
                id: self.next_id(now),
                model: previous.model,
                kind: SelectionKind::Reuse,
                made_at: now,
                cooldown_until: previous.cooldown_until,
            };
            return self.open_window(decision);
        }

        self.rounds += 1;
        let (index, kind) = match self.cold_start_candidate() {
            Some(index) => (index, SelectionKind::ColdStart),
            None => self.select(),
        };

        let decision = Decision {
            id: self.next_id(now),
            model: self.arms[index].name.clone(),
            kind,
            made_at: now,
            cooldown_until: self
                .config
                .cooldown()
                .and_then(|d| chrono::Duration::from_std(d).ok())
                .map(|d| now + d),
        };
        self.reuses_left = self.config.cooldown_windows;
        self.open_window(decision)
    }

    /// Apply the outcome of a decision and close it.
    ///
    /// Unknown or already closed ids are ignored and return `None`.
    pub fn close(&mut self, decision_id: &str, outcome: &Outcome) -> Option<Credit> {
        let decision = self.pending.remove(decision_id)?;
        if self.open.as_deref() == Some(decision_id) {
            self.open = None;
        }

        let reward = compute_reward(outcome, &self.config.weights, &self.config.bounds);
        let rule = self.config.update_rule;
        let alpha = self.config.effective_alpha();
        let gamma = self.config.effective_gamma();
        let arm = self.arms.iter_mut().find(|a| a.name == decision.model)?;

        if decision.kind == SelectionKind::Reuse {
            debug!(decision_id = %decision_id, model = %arm.name, reward, "Closed reused decision without credit");
            return Some(Credit {
                decision_id: decision.id,
                model: decision.model,
                reward,
                value: arm.value,
                credited: false,
            });
        }

        arm.value = match rule {
            UpdateRule::Ema => (1.0 - alpha) * arm.value + alpha * reward,
            UpdateRule::Discounted => gamma * arm.value + (1.0 - gamma) * reward,
        };
        arm.visits += 1;

        debug!(
            decision_id = %decision_id,
            model = %arm.name,
            reward,
            value = arm.value,
            visits = arm.visits,
            "Credited decision"
        );

        Some(Credit {
            decision_id: decision.id,
            model: decision.model,
            reward,
            value: arm.value,
            credited: true,
        })
    }

    /// Current score of every model in catalog order (UCB score or raw Q)
    pub fn scores(&self) -> Vec<(String, f64)> {
        let t = self.log_rounds();
        self.arms
            .iter()
            .map(|arm| (arm.name.clone(), self.score(arm, t)))
            .collect()
    }

    /// The `k` best models by current score, best first.
    ///
    /// Equal scores keep catalog order.
    pub fn rank_top_k(&self, k: usize) -> Vec<String> {
        let mut scores = self.scores();
        scores.sort_by(|a, b| b.1.total_cmp(&a.1));
        scores
            .into_iter()
            .take(k.min(self.arms.len()))
            .map(|(name, _)| name)
            .collect()
    }

    /// Drop all learned state, keeping the configuration and catalog
    pub fn reset(&mut self) {
        let models: Vec<String> = self.arms.iter().map(|a| a.name.clone()).collect();
        if let Ok(fresh) = Self::new(&models, self.config.clone()) {
            *self = fresh;
        }
    }

    fn arm(&self, model: &str) -> Option<&ArmState> {
        self.arms.iter().find(|a| a.name == model)
    }

    fn reusable(&self) -> Option<Decision> {
        if self.reuses_left == 0 {
            return None;
        }
        self.last.clone()
    }

    fn cold_start_candidate(&self) -> Option<usize> {
        if !self.config.cold_start {
            return None;
        }
        self.arms.iter().position(|a| a.visits == 0)
    }

    fn select(&mut self) -> (usize, SelectionKind) {
        match self.config.algorithm {
            BanditAlgorithm::Ucb => (self.argmax(), SelectionKind::Exploit),
            BanditAlgorithm::Epsilon => {
                let u: f64 = self.rng.random();
                if u < self.config.epsilon {
                    (self.rng.random_range(0..self.arms.len()), SelectionKind::Explore)
                } else {
                    (self.argmax(), SelectionKind::Exploit)
                }
            }
        }
    }

    /// First index holding the strictly greatest score
    fn argmax(&self) -> usize {
        let t = self.log_rounds();
        let mut best = f64::NEG_INFINITY;
        let mut chosen = 0;
        for (i, arm) in self.arms.iter().enumerate() {
            let score = self.score(arm, t);
            if score > best {
                best = score;
                chosen = i;
            }
        }
        chosen
    }

    fn log_rounds(&self) -> f64 {
        (self.rounds.max(1) as f64).ln()
    }

    fn score(&self, arm: &ArmState, log_t: f64) -> f64 {
        match self.config.algorithm {
            BanditAlgorithm::Ucb => {
                arm.value + self.config.c * (log_t / (arm.visits as f64 + 1.0)).sqrt()
            }
            BanditAlgorithm::Epsilon => arm.value,
        }
    }

    fn next_id(&mut self, now: DateTime<Utc>) -> String {
        self.sequence += 1;
        format!(
            "dec_{}_{}",
            now.timestamp_nanos_opt().unwrap_or_else(|| now.timestamp_micros()),
            self.sequence
        )
    }

    fn open_window(&mut self, decision: Decision) -> Decision {
        debug!(
            decision_id = %decision.id,
            model = %decision.model,
            kind = ?decision.kind,
            round = self.rounds,
            "Opened decision"
        );
        self.pending.insert(decision.id.clone(), decision.clone());
        self.open = Some(decision.id.clone());
        self.last = Some(decision.clone());
        decision
    }
}
