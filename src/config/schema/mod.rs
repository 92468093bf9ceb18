use serde::{Deserialize, Serialize};

use crate::errors::ScangateError;

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Stdio,
    Http,
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::Http => write!(f, "http"),
        }
    }
}

fn default_transport() -> Transport {
    Transport::Stdio
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_shutdown_grace() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_transport")]
    pub transport: Transport,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Seconds to wait for inflight executions during shutdown.
    #[serde(default = "default_shutdown_grace", rename = "shutdownGrace")]
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: default_transport(),
            host: default_host(),
            port: default_port(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

// ---------------------------------------------------------------------------
// Security
// ---------------------------------------------------------------------------

fn default_max_args_len() -> usize {
    2048
}

fn default_max_stdout_bytes() -> usize {
    1_048_576
}

fn default_max_stderr_bytes() -> usize {
    262_144
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default = "default_max_args_len", rename = "maxArgsLen")]
    pub max_args_len: usize,
    #[serde(default = "default_max_stdout_bytes", rename = "maxStdoutBytes")]
    pub max_stdout_bytes: usize,
    #[serde(default = "default_max_stderr_bytes", rename = "maxStderrBytes")]
    pub max_stderr_bytes: usize,
    /// Gate for intrusive scan options (-A, vuln/brute scripts, wide
    /// gobuster extension lists). Off by default.
    #[serde(default, rename = "allowIntrusive")]
    pub allow_intrusive: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_args_len: default_max_args_len(),
            max_stdout_bytes: default_max_stdout_bytes(),
            max_stderr_bytes: default_max_stderr_bytes(),
            allow_intrusive: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tools
// ---------------------------------------------------------------------------

fn default_tool_timeout() -> u64 {
    300
}

fn default_tool_concurrency() -> usize {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    #[serde(default = "default_tool_timeout", rename = "defaultTimeout")]
    pub default_timeout_secs: u64,
    #[serde(default = "default_tool_concurrency", rename = "defaultConcurrency")]
    pub default_concurrency: usize,
    /// If non-empty, only these tool names are enabled.
    #[serde(default)]
    pub include: Vec<String>,
    /// Tool names to disable at startup.
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: default_tool_timeout(),
            default_concurrency: default_tool_concurrency(),
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Circuit breaker
// ---------------------------------------------------------------------------

fn default_failure_threshold() -> u32 {
    5
}

fn default_recovery_timeout() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSettings {
    #[serde(default = "default_failure_threshold", rename = "failureThreshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_recovery_timeout", rename = "recoveryTimeout")]
    pub recovery_timeout_secs: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_secs: default_recovery_timeout(),
        }
    }
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

fn default_check_interval() -> u64 {
    30
}

fn default_check_timeout() -> u64 {
    10
}

fn default_resource_threshold() -> f64 {
    80.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Seconds between periodic health passes. Clamped to >= 5 at load.
    #[serde(default = "default_check_interval", rename = "checkInterval")]
    pub check_interval_secs: u64,
    /// Global per-check timeout ceiling, seconds.
    #[serde(default = "default_check_timeout", rename = "checkTimeout")]
    pub check_timeout_secs: u64,
    #[serde(default = "default_resource_threshold", rename = "cpuThreshold")]
    pub cpu_threshold: f64,
    #[serde(default = "default_resource_threshold", rename = "memoryThreshold")]
    pub memory_threshold: f64,
    #[serde(default = "default_resource_threshold", rename = "diskThreshold")]
    pub disk_threshold: f64,
    /// External binaries the deployment depends on (checked on PATH).
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval(),
            check_timeout_secs: default_check_timeout(),
            cpu_threshold: default_resource_threshold(),
            memory_threshold: default_resource_threshold(),
            disk_threshold: default_resource_threshold(),
            dependencies: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

fn default_max_tools() -> usize {
    1000
}

fn default_cleanup_interval() -> u64 {
    3600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true", rename = "prometheusEnabled")]
    pub prometheus_enabled: bool,
    /// Cap on tracked per-tool metric entries; LRU-evicted beyond this.
    #[serde(default = "default_max_tools", rename = "maxTools")]
    pub max_tools: usize,
    /// Seconds between idle-tool cleanup sweeps.
    #[serde(default = "default_cleanup_interval", rename = "cleanupInterval")]
    pub cleanup_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            prometheus_enabled: true,
            max_tools: default_max_tools(),
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub tool: ToolConfig,
    #[serde(default)]
    pub breaker: BreakerSettings,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ScangateError> {
        self.validate_server()?;
        self.validate_security()?;
        self.validate_tool()?;
        self.validate_breaker()?;
        self.validate_health()?;
        self.validate_metrics()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ScangateError> {
        if self.server.port == 0 {
            return Err(ScangateError::Config("server.port must be > 0".into()));
        }
        if self.server.host.is_empty() {
            return Err(ScangateError::Config(
                "server.host must not be empty".into(),
            ));
        }
        Ok(())
    }

    fn validate_security(&self) -> Result<(), ScangateError> {
        if self.security.max_args_len == 0 {
            return Err(ScangateError::Config(
                "security.maxArgsLen must be > 0".into(),
            ));
        }
        if self.security.max_stdout_bytes == 0 || self.security.max_stderr_bytes == 0 {
            return Err(ScangateError::Config(
                "security.maxStdoutBytes and security.maxStderrBytes must be > 0".into(),
            ));
        }
        Ok(())
    }

    fn validate_tool(&self) -> Result<(), ScangateError> {
        if self.tool.default_timeout_secs == 0 {
            return Err(ScangateError::Config(
                "tool.defaultTimeout must be > 0".into(),
            ));
        }
        if self.tool.default_concurrency == 0 {
            return Err(ScangateError::Config(
                "tool.defaultConcurrency must be > 0".into(),
            ));
        }
        Ok(())
    }

    fn validate_breaker(&self) -> Result<(), ScangateError> {
        if self.breaker.failure_threshold == 0 {
            return Err(ScangateError::Config(
                "breaker.failureThreshold must be > 0".into(),
            ));
        }
        if self.breaker.recovery_timeout_secs == 0 {
            return Err(ScangateError::Config(
                "breaker.recoveryTimeout must be > 0".into(),
            ));
        }
        Ok(())
    }

    fn validate_health(&self) -> Result<(), ScangateError> {
        for (name, value) in [
            ("cpuThreshold", self.health.cpu_threshold),
            ("memoryThreshold", self.health.memory_threshold),
            ("diskThreshold", self.health.disk_threshold),
        ] {
            if value.is_nan() || !(0.0..=100.0).contains(&value) {
                return Err(ScangateError::Config(format!(
                    "health.{} must be a finite percentage between 0 and 100",
                    name
                )));
            }
        }
        if self.health.check_timeout_secs == 0 {
            return Err(ScangateError::Config(
                "health.checkTimeout must be > 0".into(),
            ));
        }
        Ok(())
    }

    fn validate_metrics(&self) -> Result<(), ScangateError> {
        if self.metrics.max_tools == 0 {
            return Err(ScangateError::Config("metrics.maxTools must be > 0".into()));
        }
        Ok(())
    }
}
