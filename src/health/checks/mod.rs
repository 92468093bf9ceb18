//! Built-in health checks: system resources, the server process itself,
//! configured external dependencies, and the tool catalog.

use crate::exec::runner::ToolRunner;
use crate::exec::breaker::BreakerState;
use crate::health::{CheckPriority, HealthCheck, HealthCheckResult, HealthStatus};
use crate::tools::registry::ToolRegistry;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

// ---------------------------------------------------------------------------
// System resources (priority 0)
// ---------------------------------------------------------------------------

pub struct SystemResourcesCheck {
    cpu_threshold: f64,
    memory_threshold: f64,
    disk_threshold: f64,
}

impl SystemResourcesCheck {
    pub fn new(cpu_threshold: f64, memory_threshold: f64, disk_threshold: f64) -> Self {
        Self {
            cpu_threshold: cpu_threshold.clamp(0.0, 100.0),
            memory_threshold: memory_threshold.clamp(0.0, 100.0),
            disk_threshold: disk_threshold.clamp(0.0, 100.0),
        }
    }
}

#[async_trait]
impl HealthCheck for SystemResourcesCheck {
    fn name(&self) -> String {
        "system_resources".to_string()
    }

    fn priority(&self) -> CheckPriority {
        CheckPriority::Critical
    }

    async fn check(&self) -> HealthCheckResult {
        #[cfg(not(target_os = "linux"))]
        {
            return HealthCheckResult::new(
                self.name(),
                HealthStatus::Degraded,
                self.priority(),
                "resource monitoring not available on this platform",
            );
        }

        #[cfg(target_os = "linux")]
        {
            let cpu_percent = sample_cpu_percent().await;
            let memory_percent = read_memory_percent();
            let disk_percent = read_disk_percent("/");

            let mut status = HealthStatus::Healthy;
            let mut messages: Vec<String> = Vec::new();

            if let Some(cpu) = cpu_percent
                && cpu > self.cpu_threshold
            {
                status = HealthStatus::Unhealthy;
                messages.push(format!("CPU usage high: {:.1}%", cpu));
            }
            if let Some(memory) = memory_percent
                && memory > self.memory_threshold
            {
                if status == HealthStatus::Healthy {
                    status = HealthStatus::Degraded;
                }
                messages.push(format!("Memory usage high: {:.1}%", memory));
            }
            if let Some(disk) = disk_percent
                && disk > self.disk_threshold
            {
                if status == HealthStatus::Healthy {
                    status = HealthStatus::Degraded;
                }
                messages.push(format!("Disk usage high: {:.1}%", disk));
            }

            let message = if messages.is_empty() {
                "System resources healthy".to_string()
            } else {
                messages.join(", ")
            };

            HealthCheckResult::new(self.name(), status, self.priority(), message)
                .with_meta("cpu_percent", serde_json::json!(cpu_percent))
                .with_meta("memory_percent", serde_json::json!(memory_percent))
                .with_meta("disk_percent", serde_json::json!(disk_percent))
                .with_meta("cpu_threshold", serde_json::json!(self.cpu_threshold))
                .with_meta("memory_threshold", serde_json::json!(self.memory_threshold))
                .with_meta("disk_threshold", serde_json::json!(self.disk_threshold))
        }
    }
}

/// Busy percentage from two /proc/stat samples 250 ms apart.
#[cfg(target_os = "linux")]
async fn sample_cpu_percent() -> Option<f64> {
    let first = read_cpu_times()?;
    tokio::time::sleep(Duration::from_millis(250)).await;
    let second = read_cpu_times()?;

    let idle_delta = second.1.saturating_sub(first.1) as f64;
    let total_delta = second.0.saturating_sub(first.0) as f64;
    if total_delta <= 0.0 {
        return None;
    }
    Some(((1.0 - idle_delta / total_delta) * 100.0).clamp(0.0, 100.0))
}

/// (total, idle) jiffies from the aggregate cpu line.
#[cfg(target_os = "linux")]
fn read_cpu_times() -> Option<(u64, u64)> {
    let content = std::fs::read_to_string("/proc/stat").ok()?;
    let line = content.lines().find(|l| l.starts_with("cpu "))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|v| v.parse().ok())
        .collect();
    if fields.len() < 5 {
        return None;
    }
    let total: u64 = fields.iter().sum();
    // idle + iowait
    let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
    Some((total, idle))
}

#[cfg(target_os = "linux")]
fn read_memory_percent() -> Option<f64> {
    let content = std::fs::read_to_string("/proc/meminfo").ok()?;
    let mut total_kb: Option<f64> = None;
    let mut available_kb: Option<f64> = None;
    for line in content.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            total_kb = rest.split_whitespace().next()?.parse().ok();
        } else if let Some(rest) = line.strip_prefix("MemAvailable:") {
            available_kb = rest.split_whitespace().next()?.parse().ok();
        }
    }
    let (total, available) = (total_kb?, available_kb?);
    if total <= 0.0 {
        return None;
    }
    Some(((1.0 - available / total) * 100.0).clamp(0.0, 100.0))
}

#[cfg(target_os = "linux")]
fn read_disk_percent(path: &str) -> Option<f64> {
    let c_path = std::ffi::CString::new(path).ok()?;
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 || stat.f_blocks == 0 {
        return None;
    }
    let used = (stat.f_blocks - stat.f_bavail) as f64;
    Some((used / stat.f_blocks as f64 * 100.0).clamp(0.0, 100.0))
}

// ---------------------------------------------------------------------------
// Process (priority 1)
// ---------------------------------------------------------------------------

pub struct ProcessCheck;

#[async_trait]
impl HealthCheck for ProcessCheck {
    fn name(&self) -> String {
        "process".to_string()
    }

    fn priority(&self) -> CheckPriority {
        CheckPriority::Important
    }

    async fn check(&self) -> HealthCheckResult {
        let pid = std::process::id();

        #[cfg(not(target_os = "linux"))]
        {
            return HealthCheckResult::new(
                self.name(),
                HealthStatus::Degraded,
                self.priority(),
                "process monitoring not available on this platform",
            )
            .with_meta("pid", serde_json::json!(pid));
        }

        #[cfg(target_os = "linux")]
        {
            let age_seconds = process_age_seconds();
            let memory_mb = process_rss_mb();
            HealthCheckResult::new(
                self.name(),
                HealthStatus::Healthy,
                self.priority(),
                "Process is running",
            )
            .with_meta("pid", serde_json::json!(pid))
            .with_meta("age_seconds", serde_json::json!(age_seconds))
            .with_meta("memory_mb", serde_json::json!(memory_mb))
        }
    }
}

/// Age from system uptime minus the process start offset in clock ticks.
#[cfg(target_os = "linux")]
fn process_age_seconds() -> Option<f64> {
    let uptime: f64 = std::fs::read_to_string("/proc/uptime")
        .ok()?
        .split_whitespace()
        .next()?
        .parse()
        .ok()?;
    let stat = std::fs::read_to_string("/proc/self/stat").ok()?;
    // Fields after the parenthesized comm; starttime is field 22 overall
    let after_comm = stat.rsplit_once(')')?.1;
    let start_ticks: f64 = after_comm.split_whitespace().nth(19)?.parse().ok()?;
    let hz = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if hz <= 0 {
        return None;
    }
    Some((uptime - start_ticks / hz as f64).max(0.0))
}

#[cfg(target_os = "linux")]
fn process_rss_mb() -> Option<f64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kb: f64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb / 1024.0)
}

// ---------------------------------------------------------------------------
// External dependencies (priority 2)
// ---------------------------------------------------------------------------

pub struct DependencyCheck {
    dependencies: Vec<String>,
}

impl DependencyCheck {
    pub fn new(dependencies: Vec<String>) -> Self {
        Self { dependencies }
    }
}

#[async_trait]
impl HealthCheck for DependencyCheck {
    fn name(&self) -> String {
        "dependencies".to_string()
    }

    fn priority(&self) -> CheckPriority {
        CheckPriority::Informational
    }

    async fn check(&self) -> HealthCheckResult {
        let mut missing: Vec<String> = Vec::new();
        let mut available: Vec<String> = Vec::new();
        for dep in &self.dependencies {
            if which::which(dep).is_ok() {
                available.push(dep.clone());
            } else {
                missing.push(dep.clone());
            }
        }

        if missing.is_empty() {
            HealthCheckResult::new(
                self.name(),
                HealthStatus::Healthy,
                self.priority(),
                format!("All {} dependencies available", self.dependencies.len()),
            )
            .with_meta("available_dependencies", serde_json::json!(available))
        } else {
            warn!("health_check.missing_dependencies missing={:?}", missing);
            HealthCheckResult::new(
                self.name(),
                HealthStatus::Unhealthy,
                self.priority(),
                format!("Missing dependencies: {}", missing.join(", ")),
            )
            .with_meta("missing_dependencies", serde_json::json!(missing))
            .with_meta("available_dependencies", serde_json::json!(available))
        }
    }
}

// ---------------------------------------------------------------------------
// Tool availability (priority 2)
// ---------------------------------------------------------------------------

pub struct ToolAvailabilityCheck {
    registry: Arc<ToolRegistry>,
}

impl ToolAvailabilityCheck {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl HealthCheck for ToolAvailabilityCheck {
    fn name(&self) -> String {
        "tool_availability".to_string()
    }

    fn priority(&self) -> CheckPriority {
        CheckPriority::Informational
    }

    async fn check(&self) -> HealthCheckResult {
        let tools = self.registry.enabled_tools();
        let unavailable: Vec<String> = tools
            .iter()
            .filter(|tool| which::which(tool.command_name()).is_err())
            .map(|tool| tool.name().to_string())
            .collect();

        if unavailable.is_empty() {
            HealthCheckResult::new(
                self.name(),
                HealthStatus::Healthy,
                self.priority(),
                format!("All {} tools available", tools.len()),
            )
            .with_meta("total_tools", serde_json::json!(tools.len()))
        } else {
            HealthCheckResult::new(
                self.name(),
                HealthStatus::Degraded,
                self.priority(),
                format!("Unavailable tools: {}", unavailable.join(", ")),
            )
            .with_meta("total_tools", serde_json::json!(tools.len()))
            .with_meta("unavailable_tools", serde_json::json!(unavailable))
        }
    }
}

// ---------------------------------------------------------------------------
// Per-tool (priority 2): binary present and breaker not open
// ---------------------------------------------------------------------------

pub struct ToolCheck {
    tool_name: String,
    command_name: String,
    runner: Arc<ToolRunner>,
}

impl ToolCheck {
    pub fn new(tool_name: &str, command_name: &str, runner: Arc<ToolRunner>) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            command_name: command_name.to_string(),
            runner,
        }
    }
}

#[async_trait]
impl HealthCheck for ToolCheck {
    fn name(&self) -> String {
        format!("tool_{}", self.tool_name)
    }

    fn priority(&self) -> CheckPriority {
        CheckPriority::Informational
    }

    async fn check(&self) -> HealthCheckResult {
        if which::which(&self.command_name).is_err() {
            return HealthCheckResult::new(
                self.name(),
                HealthStatus::Unhealthy,
                self.priority(),
                format!("Binary not found on PATH: {}", self.command_name),
            );
        }
        if self.runner.breaker_state(&self.tool_name).await == Some(BreakerState::Open) {
            return HealthCheckResult::new(
                self.name(),
                HealthStatus::Degraded,
                self.priority(),
                "Circuit breaker is open",
            );
        }
        HealthCheckResult::new(
            self.name(),
            HealthStatus::Healthy,
            self.priority(),
            "Tool ready",
        )
    }
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

/// The default check set for a server instance.
pub fn default_checks(
    config: &crate::config::Config,
    registry: &Arc<ToolRegistry>,
    runner: &Arc<ToolRunner>,
) -> Vec<Arc<dyn HealthCheck>> {
    let mut checks: Vec<Arc<dyn HealthCheck>> = vec![
        Arc::new(SystemResourcesCheck::new(
            config.health.cpu_threshold,
            config.health.memory_threshold,
            config.health.disk_threshold,
        )),
        Arc::new(ProcessCheck),
        Arc::new(ToolAvailabilityCheck::new(registry.clone())),
    ];
    if !config.health.dependencies.is_empty() {
        checks.push(Arc::new(DependencyCheck::new(
            config.health.dependencies.clone(),
        )));
    }
    for tool in registry.enabled_tools() {
        checks.push(Arc::new(ToolCheck::new(
            tool.name(),
            tool.command_name(),
            runner.clone(),
        )));
    }
    checks
}
