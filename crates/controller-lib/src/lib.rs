//! Forecast-selection core for an elastic stream-processing controller
//!
//! This crate provides:
//! - A concurrent prediction ensemble over a catalog of forecasting models
//! - Accuracy-based (RMSE) and bandit-learned (UCB1 / epsilon-greedy) model selection
//! - Reward aggregation from topology snapshots with deferred credit assignment
//! - The control loop, health checks and observability around them

pub mod bandit;
pub mod control_loop;
pub mod controller;
pub mod error;
pub mod forecast;
pub mod health;
pub mod models;
pub mod monitor;
pub mod observability;
pub mod selection;

pub use control_loop::{ControlLoop, LoopConfig, StatusHandle};
pub use controller::{AdaptiveController, ControllerSettings, CycleReport};
pub use error::{ControllerError, ControllerResult};
pub use health::{
    Component, ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse,
    ReadinessResponse,
};
pub use models::*;
pub use monitor::{HttpTopologySource, TopologySource};
pub use observability::{ControllerMetrics, StructuredLogger};
