//! Per-call orchestration: breaker gate, per-tool semaphore, validation,
//! subprocess supervision, metrics, and correlation stamping.

use crate::exec::breaker::{BreakerState, CircuitBreaker};
use crate::exec::supervisor::{self, OutputLimits};
use crate::metrics::MetricsRegistry;
use crate::tools::base::{ErrorContext, ErrorKind, Tool, ToolInput, ToolOutput};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{Notify, Semaphore};
use tracing::debug;
use uuid::Uuid;

pub struct ToolRunner {
    limits: OutputLimits,
    semaphores: Mutex<HashMap<String, Arc<Semaphore>>>,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
    metrics: Arc<MetricsRegistry>,
    inflight: AtomicUsize,
    drained: Notify,
}

struct InflightGuard<'a> {
    runner: &'a ToolRunner,
}

impl<'a> InflightGuard<'a> {
    fn new(runner: &'a ToolRunner) -> Self {
        runner.inflight.fetch_add(1, Ordering::SeqCst);
        Self { runner }
    }
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.runner.inflight.fetch_sub(1, Ordering::SeqCst);
        self.runner.drained.notify_waiters();
    }
}

impl ToolRunner {
    pub fn new(limits: OutputLimits, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            limits,
            semaphores: Mutex::new(HashMap::new()),
            breakers: Mutex::new(HashMap::new()),
            metrics,
            inflight: AtomicUsize::new(0),
            drained: Notify::new(),
        }
    }

    /// The shared breaker for a tool, created lazily from the tool's policy.
    pub fn breaker_for(&self, tool: &dyn Tool) -> Arc<CircuitBreaker> {
        let mut breakers = self
            .breakers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        breakers
            .entry(tool.name().to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(tool.name(), tool.breaker_config())))
            .clone()
    }

    /// Breaker state for an already-seen tool (health checks).
    pub async fn breaker_state(&self, tool_name: &str) -> Option<BreakerState> {
        let breaker = {
            let breakers = self
                .breakers
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            breakers.get(tool_name).cloned()
        };
        match breaker {
            Some(breaker) => Some(breaker.state().await),
            None => None,
        }
    }

    fn semaphore_for(&self, tool: &dyn Tool) -> Arc<Semaphore> {
        let mut semaphores = self
            .semaphores
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        semaphores
            .entry(tool.name().to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(tool.concurrency().max(1))))
            .clone()
    }

    pub fn inflight_count(&self) -> usize {
        self.inflight.load(Ordering::SeqCst)
    }

    /// Wait for inflight executions to finish, up to `grace`. Returns
    /// whether the runner drained fully.
    pub async fn drain(&self, grace: Duration) -> bool {
        let deadline = Instant::now() + grace;
        while self.inflight_count() > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            let _ = tokio::time::timeout(remaining, self.drained.notified()).await;
        }
        true
    }

    /// Execute one tool call. Never returns an error: every path yields a
    /// `ToolOutput` with `error_type` set on failure.
    pub async fn run(&self, tool: &dyn Tool, input: ToolInput) -> ToolOutput {
        let start = Instant::now();
        let correlation_id = input
            .correlation_id
            .clone()
            .filter(|cid| !cid.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        let _inflight = InflightGuard::new(self);

        let breaker = self.breaker_for(tool);

        // Fast path: an open breaker rejects before any queueing
        if let Some(rejected) = breaker.reject_if_open().await {
            return self.breaker_open_output(tool, &input, &correlation_id, rejected.retry_after, start);
        }

        let semaphore = self.semaphore_for(tool);
        let Ok(_permit) = semaphore.acquire_owned().await else {
            let ctx = ErrorContext::new(
                ErrorKind::ResourceExhausted,
                format!("Concurrency gate closed for {}", tool.name()),
                "Retry once the server finishes shutting down",
                tool.name(),
                &input.target,
            );
            return stamp(ctx.into_output(&correlation_id), start);
        };

        let prepared = match tool.validate_and_build(&input) {
            Ok(prepared) => prepared,
            Err(err) => {
                self.metrics.record_execution(
                    tool.name(),
                    false,
                    start.elapsed().as_secs_f64(),
                    false,
                    Some(ErrorKind::ValidationError.as_str()),
                );
                let ctx = ErrorContext::from_validation(err, tool.name(), &input.target);
                return stamp(ctx.into_output(&correlation_id), start);
            }
        };

        // Full admission: may transition Open → HalfOpen and claims the
        // single half-open trial slot
        if let Err(rejected) = breaker.try_acquire().await {
            return self.breaker_open_output(tool, &input, &correlation_id, rejected.retry_after, start);
        }

        // From here exactly one on_success/on_failure must follow
        self.metrics.execution_started(tool.name());
        let timeout = effective_timeout(input.timeout_sec, tool.default_timeout());

        let mut output = match which::which(tool.command_name()) {
            Ok(path) => {
                supervisor::supervise(
                    &path.to_string_lossy(),
                    &prepared.args,
                    timeout,
                    &self.limits,
                )
                .await
            }
            Err(_) => {
                let ctx = ErrorContext::new(
                    ErrorKind::NotFound,
                    format!("Command not found: {}", tool.command_name()),
                    "Install the required tool or check PATH",
                    tool.name(),
                    &input.target,
                )
                .with_meta("command", serde_json::json!(tool.command_name()));
                let mut not_found = ctx.into_output(&correlation_id);
                not_found.returncode = 127;
                not_found
            }
        };
        self.metrics.execution_finished(tool.name());

        if output.is_success() {
            breaker.on_success().await;
        } else {
            let kind = output
                .error_type
                .map_or(ErrorKind::ExecutionError.as_str(), ErrorKind::as_str);
            let message = output
                .error
                .clone()
                .unwrap_or_else(|| format!("exit code {}", output.returncode));
            let expected = tool.is_expected_failure(&output);
            breaker.on_failure(kind, &message, expected).await;
        }

        let elapsed = start.elapsed().as_secs_f64().max(0.001);
        self.metrics.record_execution(
            tool.name(),
            output.returncode == 0,
            elapsed,
            output.timed_out,
            output.error_type.map(ErrorKind::as_str),
        );

        debug!(
            "tool.run tool={} target={} returncode={} elapsed={:.3} correlation_id={}",
            tool.name(),
            input.target,
            output.returncode,
            elapsed,
            correlation_id
        );

        output.correlation_id = correlation_id;
        output.execution_time = elapsed;
        if !prepared.optimizations_applied.is_empty() {
            output.metadata.insert(
                "optimizations_applied".to_string(),
                serde_json::json!(prepared.optimizations_applied),
            );
        }
        output
    }

    fn breaker_open_output(
        &self,
        tool: &dyn Tool,
        input: &ToolInput,
        correlation_id: &str,
        retry_after: Duration,
        start: Instant,
    ) -> ToolOutput {
        let ctx = ErrorContext::new(
            ErrorKind::CircuitBreakerOpen,
            format!("Circuit breaker is open for {}", tool.name()),
            "Wait for the recovery timeout or check service health",
            tool.name(),
            &input.target,
        )
        .with_meta("retry_after", serde_json::json!(retry_after.as_secs_f64()));
        stamp(ctx.into_output(correlation_id), start)
    }
}

fn stamp(mut output: ToolOutput, start: Instant) -> ToolOutput {
    output.execution_time = start.elapsed().as_secs_f64().max(0.001);
    output
}

fn effective_timeout(requested: Option<f64>, default: Duration) -> Duration {
    match requested {
        Some(secs) if secs.is_finite() && secs > 0.0 => Duration::from_secs_f64(secs),
        _ => default,
    }
}
