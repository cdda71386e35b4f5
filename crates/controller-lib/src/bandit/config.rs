//! Bandit selector configuration

use crate::error::{ControllerError, ControllerResult};
use serde::Deserialize;
use std::time::Duration;

/// Default EMA step used when the configured alpha is outside (0, 1]
pub const DEFAULT_ALPHA: f64 = 0.1;

/// Default discount used when the configured gamma is outside (0, 1)
pub const DEFAULT_GAMMA: f64 = 0.98;

/// Arm selection rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BanditAlgorithm {
    /// Upper confidence bound (UCB1)
    Ucb,
    /// Epsilon-greedy
    Epsilon,
}

impl BanditAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            BanditAlgorithm::Ucb => "ucb",
            BanditAlgorithm::Epsilon => "epsilon",
        }
    }
}

/// How a closed decision's reward is folded into Q
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateRule {
    /// `Q <- (1 - alpha) * Q + alpha * r`
    Ema,
    /// `Q <- gamma * Q + (1 - gamma) * r`
    Discounted,
}

/// Closed interval used to normalize a raw outcome metric to [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Map `x` into [0, 1]; degenerate bounds (`max <= min`) map everything to 0
    pub fn normalize(&self, x: f64) -> f64 {
        if self.max <= self.min {
            return 0.0;
        }
        clamp01((x - self.min) / (self.max - self.min))
    }
}

/// Weights of the three reward terms
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RewardWeights {
    /// Weight of `1 - latency_norm`
    pub latency: f64,
    /// Weight of `1 - degrade_norm`
    pub degrade: f64,
    /// Weight of `saving_norm`
    pub saving: f64,
}

impl Default for RewardWeights {
    fn default() -> Self {
        Self {
            latency: 0.34,
            degrade: 0.33,
            saving: 0.33,
        }
    }
}

/// Normalization bounds for each outcome metric
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RewardBounds {
    /// Milliseconds
    pub latency: Bounds,
    /// Throughput degradation ratio, set from the SLA
    pub degrade: Bounds,
    /// Resource saving ratio
    pub saving: Bounds,
}

impl Default for RewardBounds {
    fn default() -> Self {
        Self {
            latency: Bounds::new(50.0, 500.0),
            degrade: Bounds::new(0.0, 0.10),
            saving: Bounds::new(0.0, 0.50),
        }
    }
}

/// Immutable bandit configuration for one controller run
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BanditConfig {
    pub algorithm: BanditAlgorithm,
    pub epsilon: f64,
    /// Exploration constant of the UCB bonus
    pub c: f64,
    pub update_rule: UpdateRule,
    pub alpha: f64,
    pub gamma: f64,
    /// Try every model once before learning
    pub cold_start: bool,
    /// Decision windows a fresh choice is re-issued for; 0 switches every cycle
    pub cooldown_windows: u32,
    /// Nominal length of one decision window, used to stamp `cooldown_until`
    pub decision_period_secs: u64,
    pub top_k: usize,
    pub weights: RewardWeights,
    pub bounds: RewardBounds,
    /// 0 seeds from OS entropy
    pub seed: u64,
}

impl Default for BanditConfig {
    fn default() -> Self {
        Self {
            algorithm: BanditAlgorithm::Ucb,
            epsilon: 0.1,
            c: 2.0,
            update_rule: UpdateRule::Ema,
            alpha: DEFAULT_ALPHA,
            gamma: DEFAULT_GAMMA,
            cold_start: false,
            cooldown_windows: 0,
            decision_period_secs: 5,
            top_k: 5,
            weights: RewardWeights::default(),
            bounds: RewardBounds::default(),
            seed: 42,
        }
    }
}

impl BanditConfig {
    pub fn decision_period(&self) -> Duration {
        Duration::from_secs(self.decision_period_secs)
    }

    /// Nominal time a choice stays locked in when cooldown reuse is enabled
    pub fn cooldown(&self) -> Option<Duration> {
        if self.cooldown_windows == 0 {
            return None;
        }
        Some(self.decision_period() * self.cooldown_windows)
    }

    /// Alpha actually applied by the EMA rule
    pub fn effective_alpha(&self) -> f64 {
        if self.alpha <= 0.0 || self.alpha > 1.0 {
            DEFAULT_ALPHA
        } else {
            self.alpha
        }
    }

    /// Gamma actually applied by the discounted rule
    pub fn effective_gamma(&self) -> f64 {
        if self.gamma <= 0.0 || self.gamma >= 1.0 {
            DEFAULT_GAMMA
        } else {
            self.gamma
        }
    }

    /// Reject settings that cannot be repaired with a default
    pub fn validate(&self) -> ControllerResult<()> {
        if self.algorithm == BanditAlgorithm::Epsilon && !(0.0..=1.0).contains(&self.epsilon) {
            return Err(ControllerError::InvalidConfig(format!(
                "epsilon must be in [0, 1], got {}",
                self.epsilon
            )));
        }
        if self.c < 0.0 {
            return Err(ControllerError::InvalidConfig(format!(
                "UCB exploration constant must be non-negative, got {}",
                self.c
            )));
        }
        let w = &self.weights;
        if w.latency < 0.0 || w.degrade < 0.0 || w.saving < 0.0 {
            return Err(ControllerError::InvalidConfig(
                "reward weights must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

pub(crate) fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}
