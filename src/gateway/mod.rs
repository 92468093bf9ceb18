//! HTTP/JSON surface: health, tool introspection and control, execution,
//! SSE telemetry, and the metrics endpoint.

use crate::exec::runner::ToolRunner;
use crate::health::{HealthMonitor, HealthStatus};
use crate::metrics::MetricsRegistry;
use crate::tools::base::{ErrorKind, ToolInput};
use crate::tools::registry::ToolRegistry;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Cadence of `/events` snapshots.
const SSE_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct GatewayState {
    pub registry: Arc<ToolRegistry>,
    pub runner: Arc<ToolRunner>,
    pub health: Arc<HealthMonitor>,
    pub metrics: Arc<MetricsRegistry>,
    pub prometheus: Option<PrometheusHandle>,
}

pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/tools", get(tools_handler))
        .route("/tools/{name}/execute", post(execute_handler))
        .route("/tools/{name}/enable", post(enable_handler))
        .route("/tools/{name}/disable", post(disable_handler))
        .route("/events", get(events_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

fn health_status_code(status: HealthStatus) -> StatusCode {
    match status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::MULTI_STATUS,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// GET /health — current aggregate, 200/207/503 by status.
async fn health_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    let health = state.health.current().await;
    (
        health_status_code(health.overall_status),
        Json(json!({
            "status": health.overall_status,
            "timestamp": health.at.to_rfc3339(),
            "version": crate::VERSION,
            "checks": health.checks,
        })),
    )
}

/// GET /tools — introspection snapshot of every registered tool.
async fn tools_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    Json(json!({ "tools": state.registry.listings() }))
}

/// Map a finished execution onto an HTTP status. The output body is the
/// full `ToolOutput` either way; timeouts are completed results, not
/// transport errors.
fn execution_status_code(error_type: Option<ErrorKind>) -> StatusCode {
    match error_type {
        None | Some(ErrorKind::Timeout) => StatusCode::OK,
        Some(ErrorKind::ValidationError) => StatusCode::BAD_REQUEST,
        Some(ErrorKind::CircuitBreakerOpen | ErrorKind::ResourceExhausted) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        Some(ErrorKind::NotFound | ErrorKind::ExecutionError | ErrorKind::Unknown) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// POST /tools/{name}/execute
async fn execute_handler(
    State(state): State<GatewayState>,
    Path(name): Path<String>,
    Json(input): Json<ToolInput>,
) -> impl IntoResponse {
    state.metrics.system.record_request();

    let Some(tool) = state.registry.get(&name) else {
        state.metrics.system.record_error();
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("Tool {} not found", name)})),
        )
            .into_response();
    };
    if !state.registry.is_enabled(&name) {
        state.metrics.system.record_error();
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"error": format!("Tool {} is disabled", name)})),
        )
            .into_response();
    }

    debug!(
        "gateway.execute tool={} target={} args_len={}",
        name,
        input.target,
        input.extra_args.len()
    );

    let output = state.runner.run(tool.as_ref(), input).await;
    if output.error_type.is_some() {
        state.metrics.system.record_error();
    }
    (execution_status_code(output.error_type), Json(output)).into_response()
}

/// POST /tools/{name}/enable
async fn enable_handler(
    State(state): State<GatewayState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    if state.registry.enable(&name) {
        (
            StatusCode::OK,
            Json(json!({"message": format!("Tool {} enabled", name)})),
        )
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("Tool {} not found", name)})),
        )
    }
}

/// POST /tools/{name}/disable
async fn disable_handler(
    State(state): State<GatewayState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    if state.registry.disable(&name) {
        (
            StatusCode::OK,
            Json(json!({"message": format!("Tool {} disabled", name)})),
        )
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("Tool {} not found", name)})),
        )
    }
}

/// Counts an SSE subscriber for the duration of its stream.
struct ConnectionGuard {
    metrics: Arc<MetricsRegistry>,
}

impl ConnectionGuard {
    fn new(metrics: Arc<MetricsRegistry>) -> Self {
        metrics.system.connection_opened();
        Self { metrics }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.metrics.system.connection_closed();
    }
}

/// GET /events — one JSON snapshot every five seconds.
async fn events_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    info!("gateway.sse_subscriber_connected");
    let guard = ConnectionGuard::new(state.metrics.clone());

    let stream = futures_util::stream::unfold((state, guard), |(state, guard)| async move {
        tokio::time::sleep(SSE_INTERVAL).await;
        let status = state
            .health
            .cached()
            .map_or(HealthStatus::Healthy, |h| h.overall_status);
        let (enabled, total) = state.registry.counts();
        let payload = json!({
            "status": status,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "tools_enabled": enabled,
            "tools_total": total,
        });
        let event = Event::default().data(payload.to_string());
        Some((Ok::<Event, Infallible>(event), (state, guard)))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// GET /metrics — Prometheus text when the recorder installed, JSON stats
/// otherwise.
async fn metrics_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    if let Some(handle) = &state.prometheus {
        return (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response();
    }
    warn!("gateway.metrics_json_fallback");
    Json(json!({
        "system": state.metrics.system.snapshot(),
        "tools": state.metrics.all_tool_stats(),
    }))
    .into_response()
}

#[cfg(test)]
mod tests;
