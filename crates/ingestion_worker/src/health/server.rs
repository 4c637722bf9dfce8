use crate::domain::{
    DeviceActivity, DeviceActivityTracker, IngestionStats, ReadinessChecks, ReadinessState,
    StatsSnapshot,
};
use anyhow::Context;
use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Clone)]
pub struct HealthState {
    pub service_name: String,
    pub readiness: Arc<ReadinessState>,
    pub stats: Arc<IngestionStats>,
    pub activity: Arc<DeviceActivityTracker>,
}

#[derive(Debug, Serialize)]
struct LivenessResponse {
    status: &'static str,
    service: String,
}

#[derive(Debug, Serialize)]
struct ReadinessResponse {
    status: &'static str,
    checks: ReadinessChecks,
}

#[derive(Debug, Serialize)]
struct DevicesResponse {
    count: usize,
    devices: Vec<DeviceActivity>,
}

pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/stats", get(stats_handler))
        .route("/metrics", get(metrics_handler))
        .route("/devices", get(devices_handler))
        .with_state(state)
}

async fn liveness_handler(State(state): State<HealthState>) -> impl IntoResponse {
    Json(LivenessResponse {
        status: "alive",
        service: state.service_name.clone(),
    })
}

async fn readiness_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let checks = state.readiness.checks();
    if checks.is_ready() {
        (
            StatusCode::OK,
            Json(ReadinessResponse {
                status: "ready",
                checks,
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                status: "not ready",
                checks,
            }),
        )
    }
}

async fn stats_handler(State(state): State<HealthState>) -> Json<StatsSnapshot> {
    Json(state.stats.snapshot())
}

/// Prometheus text exposition of the ingestion counters
async fn metrics_handler(State(state): State<HealthState>) -> impl IntoResponse {
    match state.stats.encode() {
        Ok(metrics) => (
            StatusCode::OK,
            [("Content-Type", "text/plain; version=0.0.4; charset=utf-8")],
            metrics,
        ),
        Err(e) => {
            warn!(error = %e, "failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("Content-Type", "text/plain; charset=utf-8")],
                String::new(),
            )
        }
    }
}

async fn devices_handler(State(state): State<HealthState>) -> Json<DevicesResponse> {
    let devices = state.activity.snapshot().await;
    Json(DevicesResponse {
        count: devices.len(),
        devices,
    })
}

/// Serve the health endpoints until cancelled
pub async fn run_health_server(
    host: &str,
    port: u16,
    state: HealthState,
    ctx: CancellationToken,
) -> anyhow::Result<()> {
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind health server to {}", addr))?;

    info!(addr = %addr, "health server listening");

    axum::serve(listener, health_router(state))
        .with_graceful_shutdown(async move { ctx.cancelled().await })
        .await
        .context("health server failed")?;

    info!("health server stopped");
    Ok(())
}
