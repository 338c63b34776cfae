use std::collections::VecDeque;
use std::future::Future;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::{CircuitBreakerConfig, duration_ms};
use crate::error::CallError;

/// How long finished calls are kept in a circuit's window.
pub const CALL_RETENTION: Duration = Duration::from_secs(5 * 60);

/// Window used for slow-call rate and average response time.
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation. Calls flow through.
    Closed,
    /// The dependency is failing. Calls are rejected without running.
    Open,
    /// Trial period. One call at a time is let through to test the dependency.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// A state change, as `(from, to)`.
pub type Transition = (CircuitState, CircuitState);

/// One finished call through a circuit.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceCall {
    pub circuit_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub success: bool,
    #[serde(rename = "response_time_ms", serialize_with = "duration_ms::serialize")]
    pub response_time: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    finished: Instant,
}

/// Point-in-time view of a circuit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitStats {
    pub id: String,
    pub service_name: String,
    pub state: CircuitState,
    pub failure_count: u64,
    pub success_count: u64,
    pub total_requests: u64,
    /// Failures as a percentage of requests since the circuit last closed.
    pub error_rate: f64,
    /// Percentage of calls in the last minute that were slow.
    pub slow_call_rate: f64,
    /// Mean response time of calls in the last minute.
    pub average_response_time_ms: f64,
    /// Calls finished in the last minute.
    pub recent_calls: usize,
    pub time_in_state_ms: u64,
    pub state_changed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success_at: Option<DateTime<Utc>>,
}

struct CircuitData {
    state: CircuitState,
    failure_count: u64,
    success_count: u64,
    total_requests: u64,
    /// Consecutive successful trial calls while half-open.
    trial_successes: u32,
    /// Only one trial call may be in flight while half-open.
    probe_in_flight: bool,
    last_failure: Option<Instant>,
    last_failure_at: Option<DateTime<Utc>>,
    last_success_at: Option<DateTime<Utc>>,
    state_changed: Instant,
    state_changed_at: DateTime<Utc>,
    window: VecDeque<ServiceCall>,
}

impl CircuitData {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            total_requests: 0,
            trial_successes: 0,
            probe_in_flight: false,
            last_failure: None,
            last_failure_at: None,
            last_success_at: None,
            state_changed: Instant::now(),
            state_changed_at: Utc::now(),
            window: VecDeque::new(),
        }
    }

    fn transition(&mut self, to: CircuitState) -> Transition {
        let from = self.state;
        self.state = to;
        self.state_changed = Instant::now();
        self.state_changed_at = Utc::now();
        self.probe_in_flight = false;
        self.trial_successes = 0;
        if to == CircuitState::Closed {
            self.failure_count = 0;
            self.success_count = 0;
            self.total_requests = 0;
        }
        (from, to)
    }

    fn error_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let rate = self.failure_count as f64 / self.total_requests as f64 * 100.0;
        rate
    }

    fn recent(&self, now: Instant) -> impl Iterator<Item = &ServiceCall> {
        self.window
            .iter()
            .filter(move |c| now.duration_since(c.finished) <= RATE_WINDOW)
    }

    fn slow_call_rate(&self, now: Instant, slow: Duration) -> f64 {
        let (total, slow_calls) = self
            .recent(now)
            .fold((0u32, 0u32), |(t, s), c| {
                (t + 1, s + u32::from(c.response_time >= slow))
            });
        if total == 0 {
            return 0.0;
        }
        f64::from(slow_calls) / f64::from(total) * 100.0
    }

    fn average_response_ms(&self, now: Instant) -> (f64, usize) {
        let (count, total_ms) = self
            .recent(now)
            .fold((0usize, 0f64), |(n, sum), c| {
                (n + 1, sum + c.response_time.as_secs_f64() * 1000.0)
            });
        if count == 0 {
            return (0.0, 0);
        }
        #[allow(clippy::cast_precision_loss)]
        let avg = total_ms / count as f64;
        (avg, count)
    }

    fn prune(&mut self, now: Instant) {
        while self
            .window
            .front()
            .is_some_and(|c| now.duration_since(c.finished) > CALL_RETENTION)
        {
            self.window.pop_front();
        }
    }
}

/// Circuit breaker guarding one dependency.
///
/// Transitions:
/// - `Closed` -> `Open` on a failure once `request_volume_threshold` requests
///   have been seen and the failure count, error rate or slow-call rate
///   crosses its threshold
/// - `Open` -> `HalfOpen` on the first call after `recovery_timeout`
/// - `HalfOpen` -> `Closed` after `success_threshold` consecutive trial successes
/// - `HalfOpen` -> `Open` on any failure
pub struct CircuitBreaker {
    id: String,
    service_name: String,
    config: CircuitBreakerConfig,
    data: RwLock<CircuitData>,
}

impl CircuitBreaker {
    pub fn new(
        id: impl Into<String>,
        service_name: impl Into<String>,
        config: CircuitBreakerConfig,
    ) -> Self {
        Self {
            id: id.into(),
            service_name: service_name.into(),
            config,
            data: RwLock::new(CircuitData::new()),
        }
    }

    /// Run `operation` through the circuit.
    ///
    /// The operation is bounded by `slow_call_threshold`. Its outcome is
    /// recorded before being handed back; a failing operation's own error is
    /// returned as [`CallError::Operation`].
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let probe = self.admit().map_err(|retry_after| {
            debug!(circuit = %self.id, ?retry_after, "circuit open, rejecting call");
            CallError::Open {
                circuit_id: self.id.clone(),
                retry_after,
            }
        })?;

        let mut guard = ProbeGuard {
            breaker: self,
            armed: probe,
        };
        let started_at = Utc::now();
        let start = Instant::now();
        let outcome = tokio::time::timeout(self.config.slow_call_threshold, operation()).await;
        let elapsed = start.elapsed();
        guard.armed = false;

        match outcome {
            Ok(Ok(value)) => {
                self.record(started_at, elapsed, None, probe);
                Ok(value)
            }
            Ok(Err(err)) => {
                self.record(started_at, elapsed, Some(err.to_string()), probe);
                Err(CallError::Operation(err))
            }
            Err(_) => {
                let after = self.config.slow_call_threshold;
                self.record(
                    started_at,
                    elapsed,
                    Some(format!("timed out after {after:?}")),
                    probe,
                );
                Err(CallError::Timeout {
                    circuit_id: self.id.clone(),
                    after,
                })
            }
        }
    }

    /// Decide whether a call may run. `Ok(true)` marks a half-open trial call.
    fn admit(&self) -> Result<bool, Duration> {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        match data.state {
            CircuitState::Closed => Ok(false),
            CircuitState::Open => {
                let waited = data
                    .last_failure
                    .map_or(self.config.recovery_timeout, |t| t.elapsed());
                if waited < self.config.recovery_timeout {
                    return Err(self.config.recovery_timeout - waited);
                }
                data.transition(CircuitState::HalfOpen);
                data.probe_in_flight = true;
                info!(circuit = %self.id, "circuit half-open, admitting trial call");
                Ok(true)
            }
            CircuitState::HalfOpen if data.probe_in_flight => Err(Duration::ZERO),
            CircuitState::HalfOpen => {
                data.probe_in_flight = true;
                Ok(true)
            }
        }
    }

    fn record(
        &self,
        started_at: DateTime<Utc>,
        response_time: Duration,
        error: Option<String>,
        probe: bool,
    ) -> Option<Transition> {
        let now = Instant::now();
        let success = error.is_none();
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);

        data.window.push_back(ServiceCall {
            circuit_id: self.id.clone(),
            started_at,
            ended_at: Utc::now(),
            success,
            response_time,
            error,
            finished: now,
        });
        data.prune(now);
        data.total_requests += 1;

        if success {
            data.success_count += 1;
            data.last_success_at = Some(Utc::now());
            if data.state == CircuitState::HalfOpen && probe {
                data.probe_in_flight = false;
                data.trial_successes += 1;
                if data.trial_successes >= self.config.success_threshold {
                    info!(
                        circuit = %self.id,
                        successes = data.trial_successes,
                        "circuit closing after successful trial calls"
                    );
                    return Some(data.transition(CircuitState::Closed));
                }
            }
            return None;
        }

        data.failure_count += 1;
        data.last_failure = Some(now);
        data.last_failure_at = Some(Utc::now());

        match data.state {
            CircuitState::Closed if self.should_trip(&data, now) => {
                info!(
                    circuit = %self.id,
                    failures = data.failure_count,
                    requests = data.total_requests,
                    error_rate = data.error_rate(),
                    "circuit opening"
                );
                Some(data.transition(CircuitState::Open))
            }
            CircuitState::HalfOpen => {
                info!(circuit = %self.id, "circuit re-opening after trial failure");
                Some(data.transition(CircuitState::Open))
            }
            _ => None,
        }
    }

    fn should_trip(&self, data: &CircuitData, now: Instant) -> bool {
        if data.total_requests < u64::from(self.config.request_volume_threshold) {
            return false;
        }
        data.failure_count >= u64::from(self.config.failure_threshold)
            || data.error_rate() >= self.config.error_threshold
            || data.slow_call_rate(now, self.config.slow_call_threshold)
                >= self.config.slow_call_rate_threshold
    }

    fn release_probe(&self) {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        data.probe_in_flight = false;
    }

    /// Snapshot of the circuit. Never changes state.
    pub fn stats(&self) -> CircuitStats {
        let now = Instant::now();
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        let (average_response_time_ms, recent_calls) = data.average_response_ms(now);
        CircuitStats {
            id: self.id.clone(),
            service_name: self.service_name.clone(),
            state: data.state,
            failure_count: data.failure_count,
            success_count: data.success_count,
            total_requests: data.total_requests,
            error_rate: data.error_rate(),
            slow_call_rate: data.slow_call_rate(now, self.config.slow_call_threshold),
            average_response_time_ms,
            recent_calls,
            time_in_state_ms: u64::try_from(now.duration_since(data.state_changed).as_millis())
                .unwrap_or(u64::MAX),
            state_changed_at: data.state_changed_at,
            last_failure_at: data.last_failure_at,
            last_success_at: data.last_success_at,
        }
    }

    /// Calls recorded in the retention window, oldest first.
    pub fn recent_calls(&self) -> Vec<ServiceCall> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        data.window.iter().cloned().collect()
    }

    /// Current state without triggering transitions.
    pub fn state(&self) -> CircuitState {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .state
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Close the circuit and clear all counters and history.
    pub fn reset(&self) {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        data.transition(CircuitState::Closed);
        data.window.clear();
        data.last_failure = None;
        info!(circuit = %self.id, "circuit reset");
    }

    /// Open the circuit now. It stays open for a full `recovery_timeout`.
    pub fn force_open(&self) {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        data.transition(CircuitState::Open);
        data.last_failure = Some(Instant::now());
        info!(circuit = %self.id, "circuit forced open");
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("CircuitBreaker")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("state", &data.state)
            .field("failure_count", &data.failure_count)
            .field("total_requests", &data.total_requests)
            .finish_non_exhaustive()
    }
}

/// Frees the half-open trial slot if the caller drops the call mid-flight.
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.release_probe();
        }
    }
}
