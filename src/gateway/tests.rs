use super::*;
use crate::config::Config;
use crate::exec::supervisor::OutputLimits;
use crate::health::{CheckPriority, HealthCheck, HealthCheckResult};
use crate::tools::build_tools;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use tower::ServiceExt;

struct FixedCheck(HealthStatus);

#[async_trait]
impl HealthCheck for FixedCheck {
    fn name(&self) -> String {
        "fixed".to_string()
    }
    fn priority(&self) -> CheckPriority {
        CheckPriority::Critical
    }
    async fn check(&self) -> HealthCheckResult {
        HealthCheckResult::new("fixed", self.0, CheckPriority::Critical, "fixed")
    }
}

fn make_state(check_status: HealthStatus) -> GatewayState {
    let metrics = Arc::new(MetricsRegistry::new(100, Duration::from_secs(3600)));
    let runner = Arc::new(ToolRunner::new(OutputLimits::default(), metrics.clone()));
    let registry = Arc::new(ToolRegistry::new(build_tools(&Config::default()), &[], &[]));
    let health = Arc::new(HealthMonitor::new(
        vec![Arc::new(FixedCheck(check_status))],
        Duration::from_secs(30),
        Duration::from_secs(5),
    ));
    GatewayState {
        registry,
        runner,
        health,
        metrics,
        prometheus: None,
    }
}

async fn body_json(resp: axum::http::Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(resp.into_body(), 1 << 20).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_healthy_returns_200() {
    let app = build_router(make_state(HealthStatus::Healthy));
    let resp = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["version"], crate::VERSION);
    assert!(json["checks"].is_array());
}

#[tokio::test]
async fn test_health_degraded_returns_207() {
    let app = build_router(make_state(HealthStatus::Degraded));
    let resp = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::MULTI_STATUS);
}

#[tokio::test]
async fn test_health_unhealthy_returns_503() {
    let app = build_router(make_state(HealthStatus::Unhealthy));
    let resp = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_tools_listing() {
    let app = build_router(make_state(HealthStatus::Healthy));
    let resp = app
        .oneshot(Request::get("/tools").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    let tools = json["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 4);
    assert!(tools.iter().any(|t| t["name"] == "NmapTool"));
}

#[tokio::test]
async fn test_execute_unknown_tool_404() {
    let app = build_router(make_state(HealthStatus::Healthy));
    let req = Request::post("/tools/GhostTool/execute")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"target":"127.0.0.1"}"#))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_execute_disabled_tool_403() {
    let state = make_state(HealthStatus::Healthy);
    state.registry.disable("NmapTool");
    let app = build_router(state);
    let req = Request::post("/tools/NmapTool/execute")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"target":"127.0.0.1"}"#))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_execute_validation_error_400() {
    let state = make_state(HealthStatus::Healthy);
    let app = build_router(state.clone());
    let req = Request::post("/tools/NmapTool/execute")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"target":"8.8.8.8"}"#))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let json = body_json(resp).await;
    assert_eq!(json["error_type"], "validation_error");
    assert!(json["metadata"].is_object());

    // Request and error counted
    let snapshot = state.metrics.system.snapshot();
    assert_eq!(snapshot.requests, 1);
    assert_eq!(snapshot.errors, 1);
}

#[tokio::test]
async fn test_execute_metacharacter_rejection_cited() {
    let app = build_router(make_state(HealthStatus::Healthy));
    let req = Request::post("/tools/NmapTool/execute")
        .header("content-type", "application/json")
        .body(Body::from(
            r#"{"target":"127.0.0.1","extra_args":"-sV; rm -rf /"}"#,
        ))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let json = body_json(resp).await;
    assert!(
        json["stderr"].as_str().unwrap().contains("metacharacter"),
        "stderr should cite the forbidden character: {}",
        json["stderr"]
    );
}

#[tokio::test]
async fn test_enable_disable_endpoints() {
    let state = make_state(HealthStatus::Healthy);
    let app = build_router(state.clone());

    let resp = app
        .clone()
        .oneshot(
            Request::post("/tools/NmapTool/disable")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(!state.registry.is_enabled("NmapTool"));

    let resp = app
        .clone()
        .oneshot(
            Request::post("/tools/NmapTool/enable")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(state.registry.is_enabled("NmapTool"));

    let resp = app
        .oneshot(
            Request::post("/tools/GhostTool/enable")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_metrics_json_fallback() {
    let app = build_router(make_state(HealthStatus::Healthy));
    let resp = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert!(json["system"]["requests"].is_number());
    assert!(json["tools"].is_array());
}

#[tokio::test]
async fn test_events_stream_content_type() {
    let app = build_router(make_state(HealthStatus::Healthy));
    let resp = app
        .oneshot(Request::get("/events").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let content_type = resp
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(content_type.starts_with("text/event-stream"));
}

#[test]
fn test_execution_status_mapping() {
    assert_eq!(execution_status_code(None), StatusCode::OK);
    assert_eq!(execution_status_code(Some(ErrorKind::Timeout)), StatusCode::OK);
    assert_eq!(
        execution_status_code(Some(ErrorKind::ValidationError)),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        execution_status_code(Some(ErrorKind::CircuitBreakerOpen)),
        StatusCode::SERVICE_UNAVAILABLE
    );
    assert_eq!(
        execution_status_code(Some(ErrorKind::ExecutionError)),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}
