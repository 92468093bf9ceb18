use scangate::config::Config;
use scangate::exec::runner::ToolRunner;
use scangate::exec::supervisor::OutputLimits;
use scangate::gateway::GatewayState;
use scangate::health::HealthMonitor;
use scangate::health::checks::default_checks;
use scangate::metrics::MetricsRegistry;
use scangate::tools::build_tools;
use scangate::tools::registry::ToolRegistry;
use std::sync::Arc;
use std::time::Duration;

pub fn test_state() -> GatewayState {
    let config = Config::default();
    let metrics = Arc::new(MetricsRegistry::new(100, Duration::from_secs(3600)));
    let runner = Arc::new(ToolRunner::new(OutputLimits::default(), metrics.clone()));
    let registry = Arc::new(ToolRegistry::new(build_tools(&config), &[], &[]));
    let health = Arc::new(HealthMonitor::new(
        default_checks(&config, &registry, &runner),
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

pub async fn body_json(resp: axum::http::Response<axum::body::Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(resp.into_body(), 1 << 20).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn execute_request(tool: &str, body: serde_json::Value) -> axum::http::Request<axum::body::Body> {
    axum::http::Request::post(format!("/tools/{}/execute", tool))
        .header("content-type", "application/json")
        .body(axum::body::Body::from(body.to_string()))
        .unwrap()
}
