//! Health and readiness tracking for the controller daemon
//!
//! The daemon is live as long as it answers; it becomes ready once the
//! first analyze cycle has published a status.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Operating, but the last interaction with it failed
    Degraded,
    Unhealthy,
}

impl ComponentStatus {
    pub fn is_operational(&self) -> bool {
        matches!(self, ComponentStatus::Healthy | ComponentStatus::Degraded)
    }
}

/// Parts of the controller whose health is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Component {
    /// Remote forecasting service
    Forecaster,
    /// Topology monitor feeding snapshots
    Monitor,
    /// Model selection policy
    Selector,
}

impl Component {
    pub const ALL: [Component; 3] = [Component::Forecaster, Component::Monitor, Component::Selector];

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Forecaster => "forecaster",
            Component::Monitor => "monitor",
            Component::Selector => "selector",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn with(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn healthy() -> Self {
        Self::with(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::with(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

/// Body of `/healthz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Worst status across components
    pub fn compute_status(components: &BTreeMap<String, ComponentHealth>) -> ComponentStatus {
        components
            .values()
            .map(|h| h.status)
            .fold(ComponentStatus::Healthy, |worst, status| match (worst, status) {
                (ComponentStatus::Unhealthy, _) | (_, ComponentStatus::Unhealthy) => {
                    ComponentStatus::Unhealthy
                }
                (ComponentStatus::Degraded, _) | (_, ComponentStatus::Degraded) => {
                    ComponentStatus::Degraded
                }
                _ => ComponentStatus::Healthy,
            })
    }
}

/// Body of `/readyz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Shared health state, cloned into the control loop and the API
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    components: Arc<RwLock<BTreeMap<Component, ComponentHealth>>>,
    ready: Arc<RwLock<bool>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every controller component marked healthy
    pub async fn with_all_components() -> Self {
        let registry = Self::new();
        for component in Component::ALL {
            registry.set_healthy(component).await;
        }
        registry
    }

    pub async fn update(&self, component: Component, health: ComponentHealth) {
        self.components.write().await.insert(component, health);
    }

    pub async fn set_healthy(&self, component: Component) {
        self.update(component, ComponentHealth::healthy()).await;
    }

    pub async fn set_degraded(&self, component: Component, message: impl Into<String>) {
        self.update(component, ComponentHealth::degraded(message)).await;
    }

    pub async fn set_unhealthy(&self, component: Component, message: impl Into<String>) {
        self.update(component, ComponentHealth::unhealthy(message)).await;
    }

    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        let components: BTreeMap<String, ComponentHealth> = self
            .components
            .read()
            .await
            .iter()
            .map(|(c, h)| (c.as_str().to_string(), h.clone()))
            .collect();
        let status = HealthResponse::compute_status(&components);
        HealthResponse { status, components }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        if !*self.ready.read().await {
            return ReadinessResponse {
                ready: false,
                reason: Some("No analyze cycle completed yet".to_string()),
            };
        }
        if self.health().await.status == ComponentStatus::Unhealthy {
            return ReadinessResponse {
                ready: false,
                reason: Some("Critical component unhealthy".to_string()),
            };
        }
        ReadinessResponse {
            ready: true,
            reason: None,
        }
    }
}
