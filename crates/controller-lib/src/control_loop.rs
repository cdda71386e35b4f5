//! Monitor/analyze loop driving the controller
//!
//! Every tick polls the topology source and feeds the controller; every
//! `decision_period_ticks` ticks an analyze cycle runs and a fresh
//! [`ControllerStatus`] is published for API readers.

use crate::controller::{AdaptiveController, CycleReport};
use crate::forecast::BASIC_MODEL;
use crate::health::{Component, HealthRegistry};
use crate::models::{ControllerStatus, TopologySnapshot};
use crate::monitor::TopologySource;
use crate::observability::{ControllerMetrics, StructuredLogger};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::time::interval;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub tick_interval: Duration,
    /// Analyze once every this many ticks
    pub decision_period_ticks: u64,
    /// Consecutive failed polls after which the monitor is reported unhealthy
    pub monitor_failure_limit: u32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            decision_period_ticks: 5,
            monitor_failure_limit: 3,
        }
    }
}

/// Latest published controller status, shared with the API
#[derive(Debug, Clone, Default)]
pub struct StatusHandle {
    inner: Arc<RwLock<Option<ControllerStatus>>>,
}

impl StatusHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self) -> Option<ControllerStatus> {
        self.inner.read().await.clone()
    }

    pub async fn publish(&self, status: ControllerStatus) {
        *self.inner.write().await = Some(status);
    }
}

pub struct ControlLoop {
    controller: AdaptiveController,
    source: Arc<dyn TopologySource>,
    config: LoopConfig,
    status: StatusHandle,
    health: HealthRegistry,
    metrics: ControllerMetrics,
    logger: StructuredLogger,
    ticks: u64,
    failed_polls: u32,
}

impl ControlLoop {
    pub fn new(
        controller: AdaptiveController,
        source: Arc<dyn TopologySource>,
        config: LoopConfig,
        health: HealthRegistry,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            controller,
            source,
            config,
            status: StatusHandle::new(),
            health,
            metrics: ControllerMetrics::new(),
            logger,
            ticks: 0,
            failed_polls: 0,
        }
    }

    /// Handle readers use to fetch the latest status
    pub fn status_handle(&self) -> StatusHandle {
        self.status.clone()
    }

    pub fn controller(&self) -> &AdaptiveController {
        &self.controller
    }

    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            tick_ms = self.config.tick_interval.as_millis() as u64,
            decision_period_ticks = self.config.decision_period_ticks,
            "Starting control loop"
        );

        let mut ticker = interval(self.config.tick_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.recv() => {
                    info!(ticks = self.ticks, "Shutting down control loop");
                    break;
                }
            }
        }
    }

    /// Poll the monitor once and analyze when a decision period ends.
    ///
    /// A failed poll skips the whole tick.
    pub async fn tick(&mut self) -> Option<CycleReport> {
        let snapshot = match self.source.snapshot().await {
            Ok(snapshot) => {
                self.failed_polls = 0;
                self.health.set_healthy(Component::Monitor).await;
                snapshot
            }
            Err(e) => {
                self.failed_polls += 1;
                warn!(error = %e, failed_polls = self.failed_polls, "Topology poll failed, skipping tick");
                if self.failed_polls >= self.config.monitor_failure_limit.max(1) {
                    let message = format!("{} consecutive polls failed: {}", self.failed_polls, e);
                    self.health.set_unhealthy(Component::Monitor, message).await;
                } else {
                    self.health.set_degraded(Component::Monitor, e.to_string()).await;
                }
                return None;
            }
        };

        self.ticks += 1;
        if self.controller.observe(&snapshot) {
            debug!(
                samples = self.controller.aggregator().sample_count(),
                "Outcome sample recorded"
            );
        }

        let period = self.config.decision_period_ticks.max(1);
        if (self.ticks - 1) % period != 0 {
            return None;
        }
        Some(self.analyze(&snapshot).await)
    }

    async fn analyze(&mut self, snapshot: &TopologySnapshot) -> CycleReport {
        let report = self.controller.analyze(snapshot, Utc::now()).await;
        self.record(&report).await;
        self.status.publish(self.controller.status()).await;
        self.health.set_ready(true).await;
        report
    }

    async fn record(&self, report: &CycleReport) {
        let policy = self.controller.policy().as_str();

        self.metrics.observe_cycle_latency(report.duration.as_secs_f64());
        self.metrics
            .observe_forecast_latency(report.ensemble.duration.as_secs_f64());
        for (model, _) in &report.ensemble.appended {
            self.metrics.inc_forecast_appended(model);
        }
        for (model, reason) in &report.ensemble.skipped {
            self.metrics.inc_forecast_skipped(model);
            self.logger.log_forecast_skipped(model, reason);
        }

        let remote_models = self
            .controller
            .ensemble()
            .names()
            .into_iter()
            .filter(|m| m != BASIC_MODEL)
            .count();
        let remote_skipped = report
            .ensemble
            .skipped
            .iter()
            .filter(|(m, _)| m != BASIC_MODEL)
            .count();
        if remote_models > 0 && remote_skipped == remote_models {
            self.health
                .set_degraded(Component::Forecaster, "no remote model produced a forecast")
                .await;
        } else {
            self.health.set_healthy(Component::Forecaster).await;
        }

        if let Some(credit) = &report.credit {
            self.metrics.record_credit(credit.reward);
            self.logger.log_decision_closed(credit);
        }
        if let Some(decision) = &report.opened {
            self.metrics.inc_decision_opened(decision.kind.as_str());
            self.logger
                .log_decision_opened(decision, self.controller.bandit().round());
        }

        let bandit = self.controller.bandit();
        for model in self.controller.ensemble().models() {
            self.metrics.set_model_estimate(
                model.name(),
                bandit.value(model.name()).unwrap_or(0.0),
                bandit.visits(model.name()).unwrap_or(0),
            );
            if let Some(rmse) = model.error_estimate() {
                self.metrics.set_model_rmse(model.name(), rmse);
            }
        }

        self.metrics
            .set_chosen_model(&report.selection.model, policy);
        self.logger
            .log_model_selected(&report.selection.model, policy, report.changed);
        self.health.set_healthy(Component::Selector).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bandit::{BanditConfig, RewardConfig};
    use crate::controller::ControllerSettings;
    use crate::forecast::{EnsembleConfig, Forecaster, PredictionEnsemble, MULTI_MODEL};
    use crate::health::ComponentStatus;
    use crate::models::OperatorStats;
    use crate::selection::{PolicyKind, SelectionConfig};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct ConstantForecaster(f64);

    #[async_trait]
    impl Forecaster for ConstantForecaster {
        async fn forecast(&self, _: &[f64], horizon: usize, _: &str) -> Result<Vec<f64>> {
            Ok(vec![self.0; horizon])
        }
    }

    struct FailingForecaster;

    #[async_trait]
    impl Forecaster for FailingForecaster {
        async fn forecast(&self, _: &[f64], _: usize, _: &str) -> Result<Vec<f64>> {
            anyhow::bail!("service unavailable")
        }
    }

    /// Serves a fixed snapshot, or fails while `down` is set
    struct StaticSource {
        down: AtomicBool,
    }

    #[async_trait]
    impl TopologySource for StaticSource {
        async fn snapshot(&self) -> Result<TopologySnapshot> {
            if self.down.load(Ordering::SeqCst) {
                anyhow::bail!("monitor unreachable");
            }
            Ok(TopologySnapshot {
                input_rate: vec![10.0, 11.0, 12.0],
                current_input_rate: 12.0,
                operators: vec![OperatorStats {
                    name: "sink".into(),
                    replicas: 3,
                    output: 12,
                }],
                latency_ms: 120.0,
                timestamp: 0,
            })
        }
    }

    fn build(
        forecaster: Arc<dyn Forecaster>,
        decision_period_ticks: u64,
    ) -> (ControlLoop, Arc<StaticSource>, HealthRegistry) {
        let names = ["a", "b"];
        let settings = ControllerSettings {
            ensemble: EnsembleConfig {
                models: names.iter().map(|s| s.to_string()).collect(),
                predictive_model: MULTI_MODEL.to_string(),
                analyze_samples: 0,
                prediction_samples: 8,
                prediction_number: 2,
                forecast_timeout_ms: 1000,
            },
            bandit: BanditConfig {
                cold_start: true,
                ..Default::default()
            },
            reward: RewardConfig::default(),
            selection: SelectionConfig {
                policy: PolicyKind::Bandit,
                ..Default::default()
            },
        };
        let forecasters = names
            .iter()
            .map(|n| (n.to_string(), forecaster.clone()))
            .collect();
        let ensemble = PredictionEnsemble::with_forecasters(settings.ensemble.clone(), forecasters).unwrap();
        let controller = AdaptiveController::with_ensemble(settings, ensemble).unwrap();

        let source = Arc::new(StaticSource {
            down: AtomicBool::new(false),
        });
        let health = HealthRegistry::new();
        let control = ControlLoop::new(
            controller,
            source.clone(),
            LoopConfig {
                tick_interval: Duration::from_millis(10),
                decision_period_ticks,
                monitor_failure_limit: 3,
            },
            health.clone(),
            StructuredLogger::new("test"),
        );
        (control, source, health)
    }

    #[tokio::test]
    async fn test_analyze_every_decision_period() {
        let (mut control, _, health) = build(Arc::new(ConstantForecaster(5.0)), 3);
        let status = control.status_handle();

        assert!(control.tick().await.is_some());
        assert!(status.get().await.is_some());
        assert!(health.readiness().await.ready);

        assert!(control.tick().await.is_none());
        assert!(control.tick().await.is_none());
        // ticks 2 and 3 fed the open window
        assert_eq!(control.controller().aggregator().sample_count(), 2);

        let report = control.tick().await.unwrap();
        assert_eq!(report.cycle, 2);
        assert_eq!(report.credit.unwrap().model, "a");
        assert_eq!(status.get().await.unwrap().chosen_model, "b");
    }

    #[tokio::test]
    async fn test_monitor_failure_skips_tick() {
        let (mut control, source, health) = build(Arc::new(ConstantForecaster(5.0)), 1);
        source.down.store(true, Ordering::SeqCst);

        assert!(control.tick().await.is_none());
        assert_eq!(control.controller().cycle(), 0);
        let h = health.health().await;
        assert_eq!(h.components["monitor"].status, ComponentStatus::Degraded);
        assert!(!health.readiness().await.ready);

        source.down.store(false, Ordering::SeqCst);
        assert!(control.tick().await.is_some());
        assert_eq!(
            health.health().await.components["monitor"].status,
            ComponentStatus::Healthy
        );
    }

    #[tokio::test]
    async fn test_repeated_monitor_failures_turn_unhealthy() {
        let (mut control, source, health) = build(Arc::new(ConstantForecaster(5.0)), 1);
        assert!(control.tick().await.is_some());
        assert!(health.readiness().await.ready);

        source.down.store(true, Ordering::SeqCst);
        for _ in 0..2 {
            assert!(control.tick().await.is_none());
        }
        assert_eq!(health.health().await.status, ComponentStatus::Degraded);
        assert!(health.readiness().await.ready);

        assert!(control.tick().await.is_none());
        let h = health.health().await;
        assert_eq!(h.status, ComponentStatus::Unhealthy);
        assert_eq!(h.components["monitor"].status, ComponentStatus::Unhealthy);
        assert!(!health.readiness().await.ready);

        // One good poll resets the streak
        source.down.store(false, Ordering::SeqCst);
        assert!(control.tick().await.is_some());
        assert_eq!(
            health.health().await.components["monitor"].status,
            ComponentStatus::Healthy
        );
        assert!(health.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_forecaster_outage_degrades_health() {
        let (mut control, _, health) = build(Arc::new(FailingForecaster), 1);
        let report = control.tick().await.unwrap();
        assert_eq!(report.ensemble.skipped.len(), 2);
        assert_eq!(
            health.health().await.components["forecaster"].status,
            ComponentStatus::Degraded
        );
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (control, _, _) = build(Arc::new(ConstantForecaster(1.0)), 1);
        let status = control.status_handle();
        let (tx, rx) = broadcast::channel(1);

        let handle = tokio::spawn(control.run(rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();

        assert!(status.get().await.is_some());
    }
}
