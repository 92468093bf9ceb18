//! In-process metrics: per-tool counters and latency percentiles over a
//! recent window, system totals, and a Prometheus mirror.
//!
//! The registry is the source of truth for the JSON stats payload; the
//! `metrics` facade mirrors executions into the Prometheus recorder when one
//! installed successfully.

use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};
use tracing::{info, warn};

const RECENT_WINDOW: usize = 100;
const IDLE_EXPIRY_HOURS: i64 = 24;

/// Install the Prometheus recorder exactly once per process. Re-invocation
/// (tests, embedded use) returns the original handle; an install failure is
/// logged and metrics fall back to JSON-only.
pub fn install_prometheus() -> Option<PrometheusHandle> {
    static HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();
    HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                info!("prometheus.recorder_installed");
                Some(handle)
            }
            Err(e) => {
                warn!("prometheus.install_failed error={}", e);
                None
            }
        })
        .clone()
}

#[derive(Debug, Clone)]
struct RecentExecution {
    at: DateTime<Utc>,
    success: bool,
    duration: f64,
    timed_out: bool,
    error_type: Option<String>,
}

#[derive(Debug)]
struct ToolEntry {
    execution_count: u64,
    success_count: u64,
    failure_count: u64,
    timeout_count: u64,
    error_count: u64,
    total_time: f64,
    min_time: f64,
    max_time: f64,
    last_execution: Option<DateTime<Utc>>,
    recent: VecDeque<RecentExecution>,
}

impl ToolEntry {
    fn new() -> Self {
        Self {
            execution_count: 0,
            success_count: 0,
            failure_count: 0,
            timeout_count: 0,
            error_count: 0,
            total_time: 0.0,
            min_time: f64::INFINITY,
            max_time: 0.0,
            last_execution: None,
            recent: VecDeque::with_capacity(RECENT_WINDOW),
        }
    }
}

/// Stats snapshot for one tool, percentiles computed on read from the
/// recent window.
#[derive(Debug, Clone, Serialize)]
pub struct ToolStats {
    pub tool_name: String,
    pub execution_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub timeout_count: u64,
    pub error_count: u64,
    pub success_rate: f64,
    pub average_execution_time: f64,
    pub min_execution_time: f64,
    pub max_execution_time: f64,
    pub p50_execution_time: f64,
    pub p95_execution_time: f64,
    pub p99_execution_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_execution_time: Option<DateTime<Utc>>,
    pub recent_failure_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemStats {
    pub requests: u64,
    pub errors: u64,
    pub active_connections: i64,
    pub start_time: DateTime<Utc>,
    pub uptime_seconds: f64,
}

/// System-wide counters, updated lock-free.
pub struct SystemMetrics {
    requests: AtomicU64,
    errors: AtomicU64,
    active_connections: AtomicI64,
    started: Instant,
    started_at: DateTime<Utc>,
}

impl SystemMetrics {
    fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            active_connections: AtomicI64::new(0),
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        counter!("scangate_requests_total").increment(1);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        counter!("scangate_errors_total").increment(1);
    }

    pub fn connection_opened(&self) {
        let now = self.active_connections.fetch_add(1, Ordering::Relaxed) + 1;
        gauge!("scangate_active_connections").set(now as f64);
    }

    pub fn connection_closed(&self) {
        let now = self.active_connections.fetch_sub(1, Ordering::Relaxed) - 1;
        gauge!("scangate_active_connections").set(now.max(0) as f64);
    }

    pub fn snapshot(&self) -> SystemStats {
        SystemStats {
            requests: self.requests.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            start_time: self.started_at,
            uptime_seconds: self.started.elapsed().as_secs_f64(),
        }
    }
}

struct ToolsInner {
    map: HashMap<String, ToolEntry>,
    last_cleanup: Instant,
}

/// Thread-safe per-tool metrics with bounded memory: tools idle for more
/// than 24 h are dropped on a periodic sweep, and the map is LRU-capped.
pub struct MetricsRegistry {
    inner: Mutex<ToolsInner>,
    max_tools: usize,
    cleanup_interval: Duration,
    pub system: SystemMetrics,
}

impl MetricsRegistry {
    pub fn new(max_tools: usize, cleanup_interval: Duration) -> Self {
        Self {
            inner: Mutex::new(ToolsInner {
                map: HashMap::new(),
                last_cleanup: Instant::now(),
            }),
            max_tools: max_tools.max(1),
            cleanup_interval,
            system: SystemMetrics::new(),
        }
    }

    pub fn record_execution(
        &self,
        tool: &str,
        success: bool,
        duration_secs: f64,
        timed_out: bool,
        error_type: Option<&str>,
    ) {
        // Sanitize on ingress: stored values are never NaN/±∞ or negative
        let duration = if duration_secs.is_finite() {
            duration_secs.max(0.0)
        } else {
            0.0
        };

        {
            let mut inner = self
                .inner
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);

            if inner.last_cleanup.elapsed() >= self.cleanup_interval {
                Self::cleanup_idle(&mut inner);
            }
            if !inner.map.contains_key(tool) && inner.map.len() >= self.max_tools {
                Self::evict_oldest(&mut inner);
            }

            let entry = inner
                .map
                .entry(tool.to_string())
                .or_insert_with(ToolEntry::new);
            entry.execution_count += 1;
            entry.total_time += duration;
            entry.min_time = entry.min_time.min(duration);
            entry.max_time = entry.max_time.max(duration);
            entry.last_execution = Some(Utc::now());
            if success {
                entry.success_count += 1;
            } else {
                entry.failure_count += 1;
            }
            if timed_out {
                entry.timeout_count += 1;
            }
            if error_type.is_some() {
                entry.error_count += 1;
            }
            if entry.recent.len() == RECENT_WINDOW {
                entry.recent.pop_front();
            }
            entry.recent.push_back(RecentExecution {
                at: Utc::now(),
                success,
                duration,
                timed_out,
                error_type: error_type.map(str::to_string),
            });
        }

        let status = if success { "success" } else { "failure" };
        counter!(
            "scangate_tool_execution_total",
            "tool" => tool.to_string(),
            "status" => status,
            "error_type" => error_type.unwrap_or("none").to_string()
        )
        .increment(1);
        histogram!("scangate_tool_execution_seconds", "tool" => tool.to_string()).record(duration);
        if !success {
            counter!(
                "scangate_tool_errors_total",
                "tool" => tool.to_string(),
                "error_type" => error_type.unwrap_or("unknown").to_string()
            )
            .increment(1);
        }
    }

    pub fn execution_started(&self, tool: &str) {
        gauge!("scangate_tool_active", "tool" => tool.to_string()).increment(1.0);
    }

    pub fn execution_finished(&self, tool: &str) {
        gauge!("scangate_tool_active", "tool" => tool.to_string()).decrement(1.0);
    }

    pub fn tool_stats(&self, tool: &str) -> Option<ToolStats> {
        let inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.map.get(tool).map(|entry| Self::stats_of(tool, entry))
    }

    pub fn all_tool_stats(&self) -> Vec<ToolStats> {
        let inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut stats: Vec<ToolStats> = inner
            .map
            .iter()
            .map(|(name, entry)| Self::stats_of(name, entry))
            .collect();
        stats.sort_by(|a, b| a.tool_name.cmp(&b.tool_name));
        stats
    }

    pub fn tracked_tools(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .map
            .len()
    }

    fn stats_of(name: &str, entry: &ToolEntry) -> ToolStats {
        let mut recent_times: Vec<f64> = entry.recent.iter().map(|e| e.duration).collect();
        recent_times.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let percentile = |p: f64| -> f64 {
            if recent_times.is_empty() {
                return 0.0;
            }
            let idx = ((recent_times.len() as f64 * p) as usize).min(recent_times.len() - 1);
            recent_times[idx]
        };
        let recent_failures = entry.recent.iter().filter(|e| !e.success).count();
        let recent_failure_rate = if entry.recent.is_empty() {
            0.0
        } else {
            recent_failures as f64 / entry.recent.len() as f64 * 100.0
        };
        ToolStats {
            tool_name: name.to_string(),
            execution_count: entry.execution_count,
            success_count: entry.success_count,
            failure_count: entry.failure_count,
            timeout_count: entry.timeout_count,
            error_count: entry.error_count,
            success_rate: if entry.execution_count > 0 {
                entry.success_count as f64 / entry.execution_count as f64 * 100.0
            } else {
                0.0
            },
            average_execution_time: if entry.execution_count > 0 {
                entry.total_time / entry.execution_count as f64
            } else {
                0.0
            },
            // min seeded with +∞, coerced on read
            min_execution_time: if entry.min_time.is_finite() {
                entry.min_time
            } else {
                0.0
            },
            max_execution_time: entry.max_time,
            p50_execution_time: percentile(0.50),
            p95_execution_time: percentile(0.95),
            p99_execution_time: percentile(0.99),
            last_execution_time: entry.last_execution,
            recent_failure_rate,
        }
    }

    fn cleanup_idle(inner: &mut ToolsInner) {
        let cutoff = Utc::now() - chrono::Duration::hours(IDLE_EXPIRY_HOURS);
        let before = inner.map.len();
        inner
            .map
            .retain(|_, entry| entry.last_execution.is_none_or(|at| at >= cutoff));
        let removed = before - inner.map.len();
        if removed > 0 {
            info!("metrics.cleanup removed={} tools", removed);
        }
        inner.last_cleanup = Instant::now();
    }

    fn evict_oldest(inner: &mut ToolsInner) {
        let oldest = inner
            .map
            .iter()
            .min_by_key(|(_, entry)| entry.last_execution)
            .map(|(name, _)| name.clone());
        if let Some(name) = oldest {
            inner.map.remove(&name);
            info!("metrics.evicted tool={}", name);
        }
    }
}

#[cfg(test)]
mod tests;
