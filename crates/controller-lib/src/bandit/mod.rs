//! Online model selection
//!
//! A multi-armed bandit picks which forecasting model the planner trusts
//! for the next decision window, and the reward aggregator turns the
//! topology's observed behaviour during that window into the credit the
//! bandit learns from.

mod config;
mod reward;
mod selector;

pub use config::{
    BanditAlgorithm, BanditConfig, Bounds, RewardBounds, RewardWeights, UpdateRule,
    DEFAULT_ALPHA, DEFAULT_GAMMA,
};
pub use reward::{
    compute_reward, Outcome, OutcomeSample, RewardAggregator, RewardConfig,
};
pub use selector::{BanditSelector, Credit, Decision, SelectionKind};
