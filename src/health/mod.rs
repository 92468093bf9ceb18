//! Health checks: named probes with priorities, concurrent execution under
//! per-check timeouts, priority-weighted aggregation, and an
//! overlap-prevented periodic monitor.

pub mod checks;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Check priority: 0 critical, 1 important, 2 informational.
/// Serialized as its numeric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckPriority {
    Critical,
    Important,
    Informational,
}

impl CheckPriority {
    pub fn value(self) -> u8 {
        match self {
            Self::Critical => 0,
            Self::Important => 1,
            Self::Informational => 2,
        }
    }
}

impl Serialize for CheckPriority {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.value())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub name: String,
    pub status: HealthStatus,
    pub message: String,
    pub priority: CheckPriority,
    pub duration_secs: f64,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl HealthCheckResult {
    pub fn new(
        name: impl Into<String>,
        status: HealthStatus,
        priority: CheckPriority,
        message: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            status,
            message: message.into(),
            priority,
            duration_secs: 0.0,
            at: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_meta(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

/// Aggregate health of all checks plus bookkeeping metadata.
#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    pub overall_status: HealthStatus,
    pub checks: Vec<HealthCheckResult>,
    pub at: DateTime<Utc>,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// A named probe. `check` should do its own error containment; a panic or
/// hang is caught by the monitor's timeout wrapper.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    fn name(&self) -> String;
    fn priority(&self) -> CheckPriority;
    fn timeout(&self) -> Duration {
        Duration::from_secs(10)
    }
    async fn check(&self) -> HealthCheckResult;
}

/// Priority-weighted aggregation:
/// any critical unhealthy → unhealthy; any important unhealthy → degraded;
/// any degraded anywhere → degraded; all informational checks unhealthy
/// → degraded; otherwise healthy.
pub fn aggregate(results: &[HealthCheckResult]) -> HealthStatus {
    if results
        .iter()
        .any(|r| r.priority == CheckPriority::Critical && r.status == HealthStatus::Unhealthy)
    {
        return HealthStatus::Unhealthy;
    }
    if results
        .iter()
        .any(|r| r.priority == CheckPriority::Important && r.status == HealthStatus::Unhealthy)
    {
        return HealthStatus::Degraded;
    }
    if results.iter().any(|r| r.status == HealthStatus::Degraded) {
        return HealthStatus::Degraded;
    }
    let informational: Vec<&HealthCheckResult> = results
        .iter()
        .filter(|r| r.priority == CheckPriority::Informational)
        .collect();
    if !informational.is_empty()
        && informational
            .iter()
            .all(|r| r.status == HealthStatus::Unhealthy)
    {
        return HealthStatus::Degraded;
    }
    HealthStatus::Healthy
}

pub struct HealthMonitor {
    checks: Vec<Arc<dyn HealthCheck>>,
    check_interval: Duration,
    check_timeout: Duration,
    last: Mutex<Option<SystemHealth>>,
    in_progress: AtomicBool,
}

struct InProgressGuard<'a>(&'a AtomicBool);

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl HealthMonitor {
    pub fn new(
        checks: Vec<Arc<dyn HealthCheck>>,
        check_interval: Duration,
        check_timeout: Duration,
    ) -> Self {
        let check_interval = check_interval.max(Duration::from_secs(5));
        info!(
            "health_monitor.initialized checks={} interval={:.1}s",
            checks.len(),
            check_interval.as_secs_f64()
        );
        Self {
            checks,
            check_interval,
            check_timeout,
            last: Mutex::new(None),
            in_progress: AtomicBool::new(false),
        }
    }

    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    pub fn cached(&self) -> Option<SystemHealth> {
        self.last
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Run every check concurrently and aggregate. If a pass is already in
    /// flight, the previous result is returned with a `cached` note instead
    /// of starting a second concurrent pass.
    pub async fn run_checks(&self) -> SystemHealth {
        if self.in_progress.swap(true, Ordering::SeqCst) {
            let mut health = self.cached().unwrap_or_else(|| SystemHealth {
                overall_status: HealthStatus::Healthy,
                checks: Vec::new(),
                at: Utc::now(),
                metadata: HashMap::new(),
            });
            health
                .metadata
                .insert("cached".to_string(), serde_json::json!(true));
            health.metadata.insert(
                "note".to_string(),
                serde_json::json!("health check already in progress"),
            );
            return health;
        }
        let _guard = InProgressGuard(&self.in_progress);

        let futures = self.checks.iter().map(|check| {
            let check = check.clone();
            let deadline = check.timeout().min(self.check_timeout);
            async move {
                let started = Instant::now();
                match tokio::time::timeout(deadline, check.check()).await {
                    Ok(mut result) => {
                        result.duration_secs = started.elapsed().as_secs_f64();
                        result
                    }
                    Err(_) => {
                        error!(
                            "health_check.failed name={} error=timeout duration={:.2}",
                            check.name(),
                            deadline.as_secs_f64()
                        );
                        let mut result = HealthCheckResult::new(
                            check.name(),
                            HealthStatus::Unhealthy,
                            check.priority(),
                            format!(
                                "Health check timed out after {:.1}s",
                                deadline.as_secs_f64()
                            ),
                        );
                        result.duration_secs = deadline.as_secs_f64();
                        result
                    }
                }
            }
        });
        let mut results: Vec<HealthCheckResult> = futures_util::future::join_all(futures).await;
        results.sort_by(|a, b| a.name.cmp(&b.name));

        let overall_status = aggregate(&results);
        let mut metadata = HashMap::new();
        metadata.insert(
            "total_checks".to_string(),
            serde_json::json!(results.len()),
        );
        for (key, status) in [
            ("healthy_checks", HealthStatus::Healthy),
            ("degraded_checks", HealthStatus::Degraded),
            ("unhealthy_checks", HealthStatus::Unhealthy),
        ] {
            metadata.insert(
                key.to_string(),
                serde_json::json!(results.iter().filter(|r| r.status == status).count()),
            );
        }

        let health = SystemHealth {
            overall_status,
            checks: results,
            at: Utc::now(),
            metadata,
        };

        info!(
            "health_check.completed overall_status={} checks={}",
            health.overall_status,
            health.checks.len()
        );

        *self
            .last
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(health.clone());
        health
    }

    /// Current status: the cached result when fresh, otherwise a new pass.
    pub async fn current(&self) -> SystemHealth {
        if let Some(cached) = self.cached()
            && (Utc::now() - cached.at).num_seconds() < self.check_interval.as_secs() as i64
        {
            return cached;
        }
        self.run_checks().await
    }

    /// Periodic monitor loop; wakes on the timer or shutdown.
    pub fn spawn(
        self: Arc<Self>,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "health_monitor.started interval={:.1}s",
                self.check_interval.as_secs_f64()
            );
            loop {
                tokio::select! {
                    () = tokio::time::sleep(self.check_interval) => {
                        let _ = self.run_checks().await;
                    }
                    _ = shutdown.changed() => {
                        info!("health_monitor.stopped");
                        break;
                    }
                }
            }
        })
    }
}
