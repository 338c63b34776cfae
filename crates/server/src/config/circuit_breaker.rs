use std::collections::HashMap;
use std::time::Duration;

use mender_circuit::{CircuitBreakerConfig, CircuitRegistry};
use serde::Deserialize;

use crate::error::ServerError;

/// Default circuit breaker settings plus per-circuit overrides.
///
/// # Example
///
/// ```toml
/// [circuit_breaker]
/// failure_threshold = 5
/// recovery_timeout_seconds = 60
///
/// [circuit_breaker.circuits.payments-api]
/// failure_threshold = 3
/// slow_call_threshold_ms = 2000
/// ```
#[derive(Debug, Deserialize)]
pub struct CircuitBreakerServerConfig {
    /// Failures since the circuit last closed that trip it.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Error rate, in percent, that trips a circuit.
    #[serde(default = "default_percent")]
    pub error_threshold_percent: f64,
    /// Calls slower than this (milliseconds) count as slow and are cut off.
    #[serde(default = "default_slow_call_threshold")]
    pub slow_call_threshold_ms: u64,
    /// Share of slow calls, in percent, that trips a circuit.
    #[serde(default = "default_percent")]
    pub slow_call_rate_threshold_percent: f64,
    /// Requests a circuit must see before it may trip.
    #[serde(default = "default_request_volume")]
    pub request_volume_threshold: u32,
    /// Seconds to stay open before admitting a trial call.
    #[serde(default = "default_recovery_timeout")]
    pub recovery_timeout_seconds: u64,
    /// Consecutive successful trial calls needed to close.
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
    /// Per-circuit overrides keyed by circuit id.
    #[serde(default)]
    pub circuits: HashMap<String, CircuitOverrideConfig>,
}

impl Default for CircuitBreakerServerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            error_threshold_percent: default_percent(),
            slow_call_threshold_ms: default_slow_call_threshold(),
            slow_call_rate_threshold_percent: default_percent(),
            request_volume_threshold: default_request_volume(),
            recovery_timeout_seconds: default_recovery_timeout(),
            success_threshold: default_success_threshold(),
            circuits: HashMap::new(),
        }
    }
}

impl CircuitBreakerServerConfig {
    /// Settings for circuits without an override.
    pub fn defaults(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            error_threshold: self.error_threshold_percent,
            slow_call_threshold: Duration::from_millis(self.slow_call_threshold_ms),
            slow_call_rate_threshold: self.slow_call_rate_threshold_percent,
            request_volume_threshold: self.request_volume_threshold,
            recovery_timeout: Duration::from_secs(self.recovery_timeout_seconds),
            success_threshold: self.success_threshold,
        }
    }

    /// Settings for `id`: the defaults with its override applied.
    pub fn for_circuit(&self, id: &str) -> CircuitBreakerConfig {
        let base = self.defaults();
        match self.circuits.get(id) {
            Some(o) => o.apply_to(base),
            None => base,
        }
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        self.defaults()
            .validate()
            .map_err(|e| ServerError::Config(format!("[circuit_breaker] {e}")))?;
        for id in self.circuits.keys() {
            self.for_circuit(id)
                .validate()
                .map_err(|e| ServerError::Config(format!("[circuit_breaker.circuits.{id}] {e}")))?;
        }
        Ok(())
    }

    /// Build a registry carrying the defaults and every override.
    pub fn registry(&self) -> CircuitRegistry {
        self.circuits.keys().fold(
            CircuitRegistry::new(self.defaults()),
            |registry, id| registry.with_override(id.clone(), self.for_circuit(id)),
        )
    }
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_percent() -> f64 {
    50.0
}

fn default_slow_call_threshold() -> u64 {
    5000
}

fn default_request_volume() -> u32 {
    10
}

fn default_recovery_timeout() -> u64 {
    60
}

fn default_success_threshold() -> u32 {
    3
}

/// Per-circuit overrides. Unset fields inherit the defaults.
#[derive(Debug, Default, Deserialize)]
pub struct CircuitOverrideConfig {
    pub failure_threshold: Option<u32>,
    pub error_threshold_percent: Option<f64>,
    pub slow_call_threshold_ms: Option<u64>,
    pub slow_call_rate_threshold_percent: Option<f64>,
    pub request_volume_threshold: Option<u32>,
    pub recovery_timeout_seconds: Option<u64>,
    pub success_threshold: Option<u32>,
}

impl CircuitOverrideConfig {
    fn apply_to(&self, mut config: CircuitBreakerConfig) -> CircuitBreakerConfig {
        if let Some(v) = self.failure_threshold {
            config.failure_threshold = v;
        }
        if let Some(v) = self.error_threshold_percent {
            config.error_threshold = v;
        }
        if let Some(v) = self.slow_call_threshold_ms {
            config.slow_call_threshold = Duration::from_millis(v);
        }
        if let Some(v) = self.slow_call_rate_threshold_percent {
            config.slow_call_rate_threshold = v;
        }
        if let Some(v) = self.request_volume_threshold {
            config.request_volume_threshold = v;
        }
        if let Some(v) = self.recovery_timeout_seconds {
            config.recovery_timeout = Duration::from_secs(v);
        }
        if let Some(v) = self.success_threshold {
            config.success_threshold = v;
        }
        config
    }
}
