//! HTTP API: health probes, Prometheus metrics and controller status

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use controller_lib::{ComponentStatus, ControllerMetrics, ControllerStatus, HealthRegistry, StatusHandle};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: ControllerMetrics,
    pub status: StatusHandle,
    /// Ranking size when `k` is not given
    pub default_top_k: usize,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: ControllerMetrics,
        status: StatusHandle,
        default_top_k: usize,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            status,
            default_top_k,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ForecastBody {
    pub model: String,
    pub period: usize,
    pub value: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RankingBody {
    pub k: usize,
    pub ranking: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ForecastQuery {
    #[serde(default)]
    pub period: usize,
}

#[derive(Debug, Deserialize)]
pub struct RankingQuery {
    pub k: Option<usize>,
}

fn unavailable(message: &str) -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

async fn current_status(state: &AppState) -> Result<ControllerStatus, Response> {
    state
        .status
        .get()
        .await
        .ok_or_else(|| unavailable("no analyze cycle completed yet"))
}

/// 200 while operational (degraded included), 503 when a component is unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn status(State(state): State<Arc<AppState>>) -> Response {
    match current_status(&state).await {
        Ok(status) => Json(status).into_response(),
        Err(response) => response,
    }
}

/// Chosen model's forecast at a period; periods past the buffer clamp to the last value
async fn forecast(State(state): State<Arc<AppState>>, Query(query): Query<ForecastQuery>) -> Response {
    let status = match current_status(&state).await {
        Ok(status) => status,
        Err(response) => return response,
    };
    match status.forecast_at(query.period) {
        Some(value) => Json(ForecastBody {
            model: status.chosen_model,
            period: query.period,
            value,
        })
        .into_response(),
        None => unavailable("chosen model has no forecast yet"),
    }
}

async fn ranking(State(state): State<Arc<AppState>>, Query(query): Query<RankingQuery>) -> Response {
    let status = match current_status(&state).await {
        Ok(status) => status,
        Err(response) => return response,
    };
    let k = query.k.unwrap_or(state.default_top_k).min(status.ranking.len());
    Json(RankingBody {
        k,
        ranking: status.ranking.into_iter().take(k).collect(),
    })
    .into_response()
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/status", get(status))
        .route("/api/v1/forecast", get(forecast))
        .route("/api/v1/ranking", get(ranking))
        .with_state(state)
}

pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
