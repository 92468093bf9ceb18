use crate::exec::breaker::BreakerConfig;
use crate::safety::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::error;

/// One tool invocation as supplied by a caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInput {
    pub target: String,
    #[serde(default)]
    pub extra_args: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_sec: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl ToolInput {
    pub fn new(target: impl Into<String>, extra_args: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            extra_args: extra_args.into(),
            timeout_sec: None,
            correlation_id: None,
        }
    }
}

/// Closed error taxonomy carried in `ToolOutput::error_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    NotFound,
    ValidationError,
    ExecutionError,
    ResourceExhausted,
    CircuitBreakerOpen,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::NotFound => "not_found",
            Self::ValidationError => "validation_error",
            Self::ExecutionError => "execution_error",
            Self::ResourceExhausted => "resource_exhausted",
            Self::CircuitBreakerOpen => "circuit_breaker_open",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The result of one tool invocation. Every path through the runner
/// produces one of these; errors are values, not panics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    pub returncode: i32,
    #[serde(default)]
    pub truncated_stdout: bool,
    #[serde(default)]
    pub truncated_stderr: bool,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorKind>,
    #[serde(default)]
    pub execution_time: f64,
    #[serde(default)]
    pub correlation_id: String,
    /// Always present, possibly empty.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ToolOutput {
    pub fn is_success(&self) -> bool {
        self.returncode == 0 && self.error_type.is_none()
    }
}

/// Context for a typed failure, logged once and folded into a `ToolOutput`.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub kind: ErrorKind,
    pub message: String,
    pub recovery_suggestion: String,
    pub tool: String,
    pub target: String,
    pub at: DateTime<Utc>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ErrorContext {
    pub fn new(
        kind: ErrorKind,
        message: impl Into<String>,
        recovery: impl Into<String>,
        tool: &str,
        target: &str,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            recovery_suggestion: recovery.into(),
            tool: tool.to_string(),
            target: target.to_string(),
            at: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn from_validation(err: ValidationError, tool: &str, target: &str) -> Self {
        let mut ctx = Self::new(
            ErrorKind::ValidationError,
            err.message,
            err.recovery_suggestion,
            tool,
            target,
        );
        ctx.metadata = err.metadata;
        ctx
    }

    pub fn with_meta(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn into_output(self, correlation_id: &str) -> ToolOutput {
        error!(
            "tool.error tool={} error_type={} target={} message={} correlation_id={}",
            self.tool, self.kind, self.target, self.message, correlation_id
        );
        let mut metadata = self.metadata;
        metadata.insert(
            "recovery_suggestion".to_string(),
            serde_json::json!(self.recovery_suggestion),
        );
        metadata.insert("timestamp".to_string(), serde_json::json!(self.at.to_rfc3339()));
        ToolOutput {
            stdout: String::new(),
            stderr: self.message.clone(),
            returncode: 1,
            truncated_stdout: false,
            truncated_stderr: false,
            timed_out: self.kind == ErrorKind::Timeout,
            error: Some(self.message),
            error_type: Some(self.kind),
            execution_time: 0.0,
            correlation_id: correlation_id.to_string(),
            metadata,
        }
    }
}

/// A validated, optimized command ready to hand to the supervisor.
/// `args` excludes the binary itself; the runner prepends the resolved path.
#[derive(Debug, Clone)]
pub struct PreparedCommand {
    pub args: Vec<String>,
    pub optimizations_applied: Vec<String>,
}

/// Introspection snapshot served by `GET /tools` and the doctor command.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub command: String,
    pub description: String,
    pub concurrency: usize,
    pub timeout_secs: f64,
    pub allowed_flags: Vec<String>,
    pub intrusive_allowed: bool,
    pub circuit_breaker: BreakerInfo,
    /// Tool-specific safety limits and optimizer defaults.
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub extras: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BreakerInfo {
    pub failure_threshold: u32,
    pub recovery_timeout_secs: f64,
}

/// One external scanner binary: static policy plus a pure
/// validate-and-build step. All async work (gating, spawning, metrics)
/// happens in the runner; implementations never touch the network.
pub trait Tool: Send + Sync {
    /// Registry name, e.g. `NmapTool`.
    fn name(&self) -> &'static str;

    /// Binary resolved on PATH, e.g. `nmap`.
    fn command_name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Per-tool semaphore capacity.
    fn concurrency(&self) -> usize;

    fn default_timeout(&self) -> Duration;

    fn allowed_flags(&self) -> &[&'static str];

    fn breaker_config(&self) -> BreakerConfig;

    /// Validate target and arguments, inject defaults, and produce the
    /// final argument vector. No subprocess is spawned on error.
    fn validate_and_build(&self, input: &ToolInput) -> Result<PreparedCommand, ValidationError>;

    /// Whether a supervisor result counts as a breaker failure. Timeouts
    /// and spawn-level errors do; a scan that ran and exited non-zero is a
    /// result, not an infrastructure failure.
    fn is_expected_failure(&self, output: &ToolOutput) -> bool {
        output.timed_out
            || matches!(
                output.error_type,
                Some(ErrorKind::Timeout | ErrorKind::NotFound | ErrorKind::ExecutionError)
            )
    }

    fn info(&self) -> ToolInfo;
}

/// Overlay operator-supplied breaker settings onto a tool's own defaults.
/// Values left at the schema defaults keep the tool's tuning (nmap's longer
/// recovery, gobuster's lower threshold); explicit settings win, clamped to
/// a sane envelope.
pub fn breaker_from_config(config: &crate::config::Config, tool_default: BreakerConfig) -> BreakerConfig {
    let schema_defaults = crate::config::BreakerSettings::default();
    let mut out = tool_default;
    if config.breaker.failure_threshold != schema_defaults.failure_threshold {
        out.failure_threshold = config.breaker.failure_threshold.clamp(1, 10);
    }
    if config.breaker.recovery_timeout_secs != schema_defaults.recovery_timeout_secs {
        out.recovery_timeout =
            Duration::from_secs(config.breaker.recovery_timeout_secs.clamp(30, 600));
    }
    out
}

/// Same overlay rule for the default execution timeout.
pub fn timeout_from_config(config: &crate::config::Config, tool_default: Duration) -> Duration {
    let schema_default = crate::config::ToolConfig::default().default_timeout_secs;
    if config.tool.default_timeout_secs != schema_default {
        Duration::from_secs(config.tool.default_timeout_secs.clamp(60, 3600))
    } else {
        tool_default
    }
}

/// Same overlay rule for the per-tool concurrency cap, clamped so a fat-
/// fingered config cannot fan out scanners.
pub fn concurrency_from_config(config: &crate::config::Config, tool_default: usize) -> usize {
    let schema_default = crate::config::ToolConfig::default().default_concurrency;
    if config.tool.default_concurrency != schema_default {
        config.tool.default_concurrency.clamp(1, 5)
    } else {
        tool_default
    }
}

/// Shared port-specification grammar: comma-separated ports and
/// inclusive ranges. `min_port` is 1 for nmap, 0 for masscan.
pub fn valid_port_spec(spec: &str, min_port: u32, max_ranges: usize) -> bool {
    if spec.is_empty() {
        return false;
    }
    if !spec.chars().all(|c| c.is_ascii_digit() || c == ',' || c == '-') {
        return false;
    }
    let ranges: Vec<&str> = spec.split(',').collect();
    if ranges.len() > max_ranges {
        return false;
    }
    for range in ranges {
        if let Some((start, end)) = range.split_once('-') {
            let (Ok(start), Ok(end)) = (start.parse::<u32>(), end.parse::<u32>()) else {
                return false;
            };
            if start < min_port || end > 65535 || start > end {
                return false;
            }
        } else {
            let Ok(port) = range.parse::<u32>() else {
                return false;
            };
            if port < min_port || port > 65535 {
                return false;
            }
        }
    }
    true
}
