//! Daemon configuration
//!
//! Read once at startup from an optional file named by `CONTROLLER_CONFIG`
//! (TOML, YAML or JSON), then overlaid by `CONTROLLER__*` environment
//! variables, e.g. `CONTROLLER__BANDIT__ALGORITHM=epsilon`.

use anyhow::{Context, Result};
use controller_lib::bandit::{BanditConfig, RewardConfig};
use controller_lib::forecast::EnsembleConfig;
use controller_lib::selection::SelectionConfig;
use controller_lib::{ControllerSettings, LoopConfig};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "CONTROLLER_CONFIG";
pub const ENV_PREFIX: &str = "CONTROLLER";

#[derive(Debug, Clone, Deserialize)]
pub struct ControllerConfig {
    /// Name attached to every structured log event
    #[serde(default = "default_instance")]
    pub instance: String,

    /// Port of the health, metrics and status API
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Endpoint serving topology snapshots as JSON
    #[serde(default = "default_monitor_url")]
    pub monitor_url: String,

    #[serde(default = "default_monitor_timeout_ms")]
    pub monitor_timeout_ms: u64,

    /// Base URL of the forecasting service; models are served at `{url}/{model}`
    #[serde(default = "default_forecaster_url")]
    pub forecaster_url: String,

    #[serde(default, rename = "loop")]
    pub control_loop: LoopSettings,

    #[serde(default)]
    pub ensemble: EnsembleConfig,

    #[serde(default)]
    pub bandit: BanditConfig,

    #[serde(default)]
    pub reward: RewardConfig,

    #[serde(default)]
    pub selection: SelectionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoopSettings {
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// Must equal `ensemble.prediction_number`: one forecast value per observed tick
    #[serde(default = "default_decision_period_ticks")]
    pub decision_period_ticks: u64,
    #[serde(default = "default_monitor_failure_limit")]
    pub monitor_failure_limit: u32,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            decision_period_ticks: default_decision_period_ticks(),
            monitor_failure_limit: default_monitor_failure_limit(),
        }
    }
}

fn default_instance() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "adaptive-controller".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_monitor_url() -> String {
    "http://localhost:9091/topology".to_string()
}

fn default_monitor_timeout_ms() -> u64 {
    2000
}

fn default_forecaster_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_tick_interval() -> u64 {
    1
}

fn default_decision_period_ticks() -> u64 {
    5
}

fn default_monitor_failure_limit() -> u32 {
    3
}

impl ControllerConfig {
    /// Load from `CONTROLLER_CONFIG` (if set) and `CONTROLLER__*` variables
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).ok();
        Self::load_with(path.as_deref().map(Path::new), ENV_PREFIX)
    }

    /// Load from an optional file overlaid by variables under `env_prefix`
    pub fn load_with(path: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let config = builder
            .add_source(
                config::Environment::with_prefix(env_prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read controller configuration")?;

        let parsed: Self = config
            .try_deserialize()
            .context("Invalid controller configuration")?;
        parsed.settings().validate()?;
        parsed.validate_cadence()?;
        Ok(parsed)
    }

    /// The loop's decision period must match the forecast horizon and the
    /// bandit's nominal window
    fn validate_cadence(&self) -> Result<()> {
        let ticks = self.control_loop.decision_period_ticks.max(1);
        if ticks != self.ensemble.prediction_number as u64 {
            anyhow::bail!(
                "loop.decision_period_ticks ({}) must equal ensemble.prediction_number ({})",
                ticks,
                self.ensemble.prediction_number
            );
        }
        let window_secs = self.control_loop.tick_interval_secs.max(1) * ticks;
        if window_secs != self.bandit.decision_period_secs {
            anyhow::bail!(
                "bandit.decision_period_secs ({}) must equal the loop's decision window ({}s)",
                self.bandit.decision_period_secs,
                window_secs
            );
        }
        Ok(())
    }

    pub fn settings(&self) -> ControllerSettings {
        ControllerSettings {
            ensemble: self.ensemble.clone(),
            bandit: self.bandit.clone(),
            reward: self.reward.clone(),
            selection: self.selection.clone(),
        }
    }

    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            tick_interval: Duration::from_secs(self.control_loop.tick_interval_secs.max(1)),
            decision_period_ticks: self.control_loop.decision_period_ticks.max(1),
            monitor_failure_limit: self.control_loop.monitor_failure_limit.max(1),
        }
    }

    pub fn monitor_timeout(&self) -> Duration {
        Duration::from_millis(self.monitor_timeout_ms)
    }
}
