//! Per-tool circuit breaker with adaptive recovery.
//!
//! Closed → Open after `failure_threshold` failures; Open → HalfOpen once
//! `current_recovery_timeout` (±10% jitter) has elapsed since the last
//! failure; HalfOpen admits a single trial call and either closes (resetting
//! the recovery timeout) or reopens (escalating it by `timeout_multiplier`,
//! capped at `max_recovery_timeout`). All transitions happen under one mutex.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const RECENT_ERRORS_CAP: usize = 10;

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    pub success_threshold: u32,
    pub timeout_multiplier: f64,
    pub max_recovery_timeout: Duration,
    pub enable_jitter: bool,
    pub max_half_open: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 1,
            timeout_multiplier: 1.5,
            max_recovery_timeout: Duration::from_secs(300),
            enable_jitter: true,
            max_half_open: 1,
        }
    }
}

impl BreakerConfig {
    fn normalized(mut self) -> Self {
        self.failure_threshold = self.failure_threshold.max(1);
        self.success_threshold = self.success_threshold.max(1);
        self.timeout_multiplier = self.timeout_multiplier.max(1.0);
        if self.max_recovery_timeout < self.recovery_timeout {
            self.max_recovery_timeout = self.recovery_timeout;
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum State {
    Closed,
    Open { since: Instant },
    HalfOpen,
}

impl State {
    fn kind(&self) -> BreakerState {
        match self {
            Self::Closed => BreakerState::Closed,
            Self::Open { .. } => BreakerState::Open,
            Self::HalfOpen => BreakerState::HalfOpen,
        }
    }
}

/// A call turned away at the gate.
#[derive(Debug, Clone)]
pub struct RejectedCall {
    pub retry_after: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentError {
    pub at: DateTime<Utc>,
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Default)]
struct Counters {
    total_calls: u64,
    successful_calls: u64,
    failed_calls: u64,
    rejected_calls: u64,
    state_changes: u64,
    last_state_change: Option<DateTime<Utc>>,
    last_failure_time: Option<DateTime<Utc>>,
    last_success_time: Option<DateTime<Utc>>,
    failure_reasons: HashMap<String, u64>,
}

struct Inner {
    state: State,
    failure_count: u32,
    consecutive_failures: u32,
    consecutive_successes: u32,
    success_count: u32,
    half_open_inflight: u32,
    current_recovery_timeout: Duration,
    stats: Counters,
    recent_errors: VecDeque<RecentError>,
}

/// Serializable stats snapshot, exposed via tool info and `/tools`.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: BreakerState,
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub rejected_calls: u64,
    pub success_rate: f64,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub state_changes: u64,
    pub failure_reasons: HashMap<String, u64>,
    pub failure_threshold: u32,
    pub current_recovery_timeout_secs: f64,
    pub initial_recovery_timeout_secs: f64,
    pub max_recovery_timeout_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_state_change: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<f64>,
    pub recent_errors: Vec<RecentError>,
}

pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        let name = name.into();
        let config = config.normalized();
        info!(
            "circuit_breaker.created name={} threshold={} timeout={:.1}s",
            name,
            config.failure_threshold,
            config.recovery_timeout.as_secs_f64()
        );
        Self {
            inner: Mutex::new(Inner {
                state: State::Closed,
                failure_count: 0,
                consecutive_failures: 0,
                consecutive_successes: 0,
                success_count: 0,
                half_open_inflight: 0,
                current_recovery_timeout: config.recovery_timeout,
                stats: Counters::default(),
                recent_errors: VecDeque::with_capacity(RECENT_ERRORS_CAP),
            }),
            name,
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state without side effects.
    pub async fn state(&self) -> BreakerState {
        self.inner.lock().await.state.kind()
    }

    /// Fast gate for the runner's entry: reject if the breaker is open and
    /// the recovery window has not yet elapsed. Does not transition state.
    pub async fn reject_if_open(&self) -> Option<RejectedCall> {
        let mut inner = self.inner.lock().await;
        let open_since = match &inner.state {
            State::Open { since } => Some(*since),
            _ => None,
        };
        if let Some(since) = open_since
            && !self.should_attempt_reset(since, inner.current_recovery_timeout)
        {
            let retry_after = self.retry_after(since, inner.current_recovery_timeout);
            inner.stats.rejected_calls += 1;
            return Some(RejectedCall { retry_after });
        }
        None
    }

    /// Admit a call: performs the Open → HalfOpen transition when the
    /// recovery window has elapsed, and enforces the single-trial limit in
    /// HalfOpen. An admitted call must be paired with exactly one
    /// `on_success` or `on_failure`.
    pub async fn try_acquire(&self) -> Result<(), RejectedCall> {
        let mut inner = self.inner.lock().await;

        let open_since = match &inner.state {
            State::Open { since } => Some(*since),
            _ => None,
        };
        if let Some(since) = open_since {
            if self.should_attempt_reset(since, inner.current_recovery_timeout) {
                self.transition(&mut inner, State::HalfOpen);
                inner.success_count = 0;
                inner.half_open_inflight = 0;
                info!("circuit_breaker.half_open name={}", self.name);
            } else {
                let retry_after = self.retry_after(since, inner.current_recovery_timeout);
                inner.stats.rejected_calls += 1;
                return Err(RejectedCall { retry_after });
            }
        }

        if inner.state == State::HalfOpen {
            if inner.half_open_inflight >= self.config.max_half_open {
                inner.stats.rejected_calls += 1;
                return Err(RejectedCall {
                    retry_after: Duration::from_secs(5),
                });
            }
            inner.half_open_inflight += 1;
        }

        inner.stats.total_calls += 1;
        Ok(())
    }

    pub async fn on_success(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state == State::HalfOpen {
            inner.half_open_inflight = inner.half_open_inflight.saturating_sub(1);
        }
        inner.stats.successful_calls += 1;
        inner.stats.last_success_time = Some(Utc::now());
        inner.consecutive_successes += 1;
        inner.consecutive_failures = 0;

        match inner.state.kind() {
            BreakerState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    self.transition(&mut inner, State::Closed);
                    inner.failure_count = 0;
                    inner.current_recovery_timeout = self.config.recovery_timeout;
                    info!("circuit_breaker.closed name={}", self.name);
                }
            }
            BreakerState::Closed => {
                if inner.failure_count > 0 {
                    inner.failure_count = 0;
                    debug!("circuit_breaker.failure_count_reset name={}", self.name);
                }
            }
            BreakerState::Open => {}
        }
    }

    /// Record a failed call. `expected` failures drive state transitions;
    /// unexpected ones (a scan that ran but exited non-zero) are kept in the
    /// stats and the recent-error ring only.
    pub async fn on_failure(&self, kind: &str, message: &str, expected: bool) {
        let mut inner = self.inner.lock().await;
        if inner.state == State::HalfOpen {
            inner.half_open_inflight = inner.half_open_inflight.saturating_sub(1);
        }
        inner.stats.failed_calls += 1;
        inner.stats.last_failure_time = Some(Utc::now());
        *inner.stats.failure_reasons.entry(kind.to_string()).or_insert(0) += 1;
        if inner.recent_errors.len() == RECENT_ERRORS_CAP {
            inner.recent_errors.pop_front();
        }
        inner.recent_errors.push_back(RecentError {
            at: Utc::now(),
            kind: kind.to_string(),
            message: message.to_string(),
        });

        if !expected {
            warn!(
                "circuit_breaker.unexpected_failure name={} kind={} message={}",
                self.name, kind, message
            );
            return;
        }

        inner.failure_count += 1;
        inner.consecutive_failures += 1;
        inner.consecutive_successes = 0;

        match inner.state.kind() {
            BreakerState::Closed => {
                if inner.failure_count >= self.config.failure_threshold {
                    if inner.consecutive_failures > self.config.failure_threshold {
                        inner.current_recovery_timeout =
                            self.escalated_timeout(inner.current_recovery_timeout);
                    }
                    self.transition(&mut inner, State::Open { since: Instant::now() });
                    warn!(
                        "circuit_breaker.open name={} failures={} timeout={:.1}s",
                        self.name,
                        inner.failure_count,
                        inner.current_recovery_timeout.as_secs_f64()
                    );
                }
            }
            BreakerState::HalfOpen => {
                inner.current_recovery_timeout =
                    self.escalated_timeout(inner.current_recovery_timeout);
                self.transition(&mut inner, State::Open { since: Instant::now() });
                warn!(
                    "circuit_breaker.reopened name={} timeout={:.1}s",
                    self.name,
                    inner.current_recovery_timeout.as_secs_f64()
                );
            }
            BreakerState::Open => {
                // Already open; refresh the failure clock
                self.transition(&mut inner, State::Open { since: Instant::now() });
            }
        }
    }

    pub async fn force_open(&self) {
        let mut inner = self.inner.lock().await;
        inner.failure_count = self.config.failure_threshold;
        self.transition(&mut inner, State::Open { since: Instant::now() });
        info!("circuit_breaker.force_open name={}", self.name);
    }

    pub async fn force_close(&self) {
        let mut inner = self.inner.lock().await;
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.consecutive_failures = 0;
        inner.half_open_inflight = 0;
        inner.current_recovery_timeout = self.config.recovery_timeout;
        self.transition(&mut inner, State::Closed);
        info!("circuit_breaker.force_close name={}", self.name);
    }

    pub async fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock().await;
        let success_rate = if inner.stats.total_calls > 0 {
            inner.stats.successful_calls as f64 / inner.stats.total_calls as f64 * 100.0
        } else {
            0.0
        };
        let retry_after_secs = match &inner.state {
            State::Open { since } => Some(
                self.retry_after(*since, inner.current_recovery_timeout)
                    .as_secs_f64(),
            ),
            _ => None,
        };
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state.kind(),
            total_calls: inner.stats.total_calls,
            successful_calls: inner.stats.successful_calls,
            failed_calls: inner.stats.failed_calls,
            rejected_calls: inner.stats.rejected_calls,
            success_rate,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            state_changes: inner.stats.state_changes,
            failure_reasons: inner.stats.failure_reasons.clone(),
            failure_threshold: self.config.failure_threshold,
            current_recovery_timeout_secs: inner.current_recovery_timeout.as_secs_f64(),
            initial_recovery_timeout_secs: self.config.recovery_timeout.as_secs_f64(),
            max_recovery_timeout_secs: self.config.max_recovery_timeout.as_secs_f64(),
            last_failure_time: inner.stats.last_failure_time,
            last_success_time: inner.stats.last_success_time,
            last_state_change: inner.stats.last_state_change,
            retry_after_secs,
            recent_errors: inner.recent_errors.iter().cloned().collect(),
        }
    }

    fn transition(&self, inner: &mut Inner, next: State) {
        if inner.state.kind() != next.kind() {
            inner.stats.state_changes += 1;
            inner.stats.last_state_change = Some(Utc::now());
        }
        inner.state = next;
    }

    fn escalated_timeout(&self, current: Duration) -> Duration {
        let scaled = current.as_secs_f64() * self.config.timeout_multiplier;
        Duration::from_secs_f64(scaled.min(self.config.max_recovery_timeout.as_secs_f64()))
    }

    fn should_attempt_reset(&self, since: Instant, recovery: Duration) -> bool {
        let mut window = recovery.as_secs_f64();
        if self.config.enable_jitter {
            // ±10% so simultaneous breakers don't retry in lockstep
            window *= 1.0 + (fastrand::f64() * 0.2 - 0.1);
        }
        since.elapsed().as_secs_f64() >= window
    }

    fn retry_after(&self, since: Instant, recovery: Duration) -> Duration {
        let remaining = recovery.as_secs_f64() - since.elapsed().as_secs_f64();
        let mut remaining = remaining.max(0.0);
        if self.config.enable_jitter {
            remaining += fastrand::f64() * (remaining * 0.1).min(5.0);
        }
        Duration::from_secs_f64(remaining)
    }
}
