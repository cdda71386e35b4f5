//! Adaptive controller daemon
//!
//! Polls the topology monitor, forecasts load with every configured model
//! and keeps the chosen model's forecast available to the planner over HTTP.

use adaptive_controller::{api, config::ControllerConfig};
use anyhow::{Context, Result};
use controller_lib::forecast::HttpForecaster;
use controller_lib::{
    AdaptiveController, ControlLoop, ControllerMetrics, HealthRegistry, HttpTopologySource,
    StructuredLogger,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const CONTROLLER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting adaptive-controller");

    let config = ControllerConfig::load()?;
    let settings = config.settings();
    info!(
        instance = %config.instance,
        monitor_url = %config.monitor_url,
        forecaster_url = %config.forecaster_url,
        "Controller configured"
    );

    let forecaster = Arc::new(
        HttpForecaster::new(&config.forecaster_url, settings.ensemble.forecast_timeout())
            .context("Failed to create forecaster client")?,
    );
    let top_k = settings.bandit.top_k;
    let controller =
        AdaptiveController::new(settings, forecaster).context("Failed to build controller")?;

    let source = Arc::new(
        HttpTopologySource::new(&config.monitor_url, config.monitor_timeout())
            .context("Failed to create topology monitor client")?,
    );

    let health_registry = HealthRegistry::with_all_components().await;
    let metrics = ControllerMetrics::new();
    let logger = StructuredLogger::new(&config.instance);
    logger.log_startup(
        CONTROLLER_VERSION,
        controller.policy().as_str(),
        &controller.ensemble().names(),
    );

    let control = ControlLoop::new(
        controller,
        source,
        config.loop_config(),
        health_registry.clone(),
        logger.clone(),
    );
    let app_state = Arc::new(api::AppState::new(
        health_registry,
        metrics,
        control.status_handle(),
        top_k,
    ));

    let (shutdown_tx, _) = broadcast::channel(1);
    let loop_handle = tokio::spawn(control.run(shutdown_tx.subscribe()));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");

    let _ = shutdown_tx.send(());
    if let Err(e) = loop_handle.await {
        warn!(error = %e, "Control loop ended abnormally");
    }
    api_handle.abort();
    info!("Shutdown complete");

    Ok(())
}
