use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a single circuit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Absolute number of failures (since the circuit last closed) that
    /// trips the circuit.
    pub failure_threshold: u32,
    /// Error rate, in percent, that trips the circuit.
    pub error_threshold: f64,
    /// Calls slower than this count as slow. Also bounds every call.
    #[serde(with = "duration_ms")]
    pub slow_call_threshold: Duration,
    /// Share of slow calls over the last minute, in percent, that trips the
    /// circuit.
    pub slow_call_rate_threshold: f64,
    /// Minimum number of requests before the circuit may trip.
    pub request_volume_threshold: u32,
    /// How long to stay open before admitting a trial call.
    #[serde(with = "duration_ms")]
    pub recovery_timeout: Duration,
    /// Consecutive successful trial calls needed to close again.
    pub success_threshold: u32,
}

impl CircuitBreakerConfig {
    /// Validate configuration values.
    ///
    /// `recovery_timeout = 0` is allowed, which is handy in tests.
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold < 1 {
            return Err("failure_threshold must be >= 1".into());
        }
        if self.success_threshold < 1 {
            return Err("success_threshold must be >= 1".into());
        }
        if !(0.0..=100.0).contains(&self.error_threshold) {
            return Err("error_threshold must be a percentage between 0 and 100".into());
        }
        if !(0.0..=100.0).contains(&self.slow_call_rate_threshold) {
            return Err("slow_call_rate_threshold must be a percentage between 0 and 100".into());
        }
        if self.slow_call_threshold.is_zero() {
            return Err("slow_call_threshold must be greater than zero".into());
        }
        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            error_threshold: 50.0,
            slow_call_threshold: Duration::from_secs(5),
            slow_call_rate_threshold: 50.0,
            request_volume_threshold: 10,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 3,
        }
    }
}

/// Kind of dependency a circuit guards. Each role carries its own defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitRole {
    Database,
    ExternalApi,
    InternalService,
    /// Recovery steps run long-lived operations such as restarts.
    RecoveryStep,
}

impl CircuitRole {
    /// Prefix used for circuit ids created for this role.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::ExternalApi => "external",
            Self::InternalService => "internal",
            Self::RecoveryStep => "recovery-step",
        }
    }

    /// Circuit id for `name` under this role.
    pub fn circuit_id(self, name: &str) -> String {
        format!("{}:{name}", self.prefix())
    }

    pub fn default_config(self) -> CircuitBreakerConfig {
        match self {
            Self::Database => CircuitBreakerConfig {
                failure_threshold: 5,
                error_threshold: 50.0,
                slow_call_threshold: Duration::from_secs(5),
                slow_call_rate_threshold: 50.0,
                request_volume_threshold: 10,
                recovery_timeout: Duration::from_secs(30),
                success_threshold: 3,
            },
            Self::ExternalApi => CircuitBreakerConfig {
                failure_threshold: 3,
                error_threshold: 30.0,
                slow_call_threshold: Duration::from_secs(10),
                slow_call_rate_threshold: 60.0,
                request_volume_threshold: 5,
                recovery_timeout: Duration::from_secs(60),
                success_threshold: 2,
            },
            Self::InternalService => CircuitBreakerConfig {
                failure_threshold: 5,
                error_threshold: 50.0,
                slow_call_threshold: Duration::from_secs(3),
                slow_call_rate_threshold: 50.0,
                request_volume_threshold: 10,
                recovery_timeout: Duration::from_secs(30),
                success_threshold: 3,
            },
            Self::RecoveryStep => CircuitBreakerConfig {
                failure_threshold: 3,
                error_threshold: 50.0,
                slow_call_threshold: Duration::from_secs(120),
                slow_call_rate_threshold: 100.0,
                request_volume_threshold: 3,
                recovery_timeout: Duration::from_secs(300),
                success_threshold: 1,
            },
        }
    }
}

pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::cast_possible_truncation)]
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = CircuitBreakerConfig::default();
        assert_eq!(cfg.failure_threshold, 5);
        assert_eq!(cfg.success_threshold, 3);
        assert_eq!(cfg.request_volume_threshold, 10);
        assert_eq!(cfg.slow_call_threshold, Duration::from_secs(5));
        assert_eq!(cfg.recovery_timeout, Duration::from_secs(60));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn every_role_default_is_valid() {
        for role in [
            CircuitRole::Database,
            CircuitRole::ExternalApi,
            CircuitRole::InternalService,
            CircuitRole::RecoveryStep,
        ] {
            assert!(role.default_config().validate().is_ok(), "{role:?}");
        }
    }

    #[test]
    fn role_circuit_ids() {
        assert_eq!(CircuitRole::Database.circuit_id("orders"), "database:orders");
        assert_eq!(
            CircuitRole::RecoveryStep.circuit_id("api-server"),
            "recovery-step:api-server"
        );
    }

    #[test]
    fn validation_rejects_bad_values() {
        let zero_failures = CircuitBreakerConfig {
            failure_threshold: 0,
            ..CircuitBreakerConfig::default()
        };
        assert!(zero_failures.validate().is_err());

        let zero_successes = CircuitBreakerConfig {
            success_threshold: 0,
            ..CircuitBreakerConfig::default()
        };
        assert!(zero_successes.validate().is_err());

        let bad_rate = CircuitBreakerConfig {
            error_threshold: 150.0,
            ..CircuitBreakerConfig::default()
        };
        assert!(bad_rate.validate().is_err());

        let zero_timeout = CircuitBreakerConfig {
            slow_call_threshold: Duration::ZERO,
            ..CircuitBreakerConfig::default()
        };
        assert!(zero_timeout.validate().is_err());
    }

    #[test]
    fn config_serializes_durations_as_millis() {
        let json = serde_json::to_value(CircuitBreakerConfig::default()).unwrap();
        assert_eq!(json["slow_call_threshold"], 5000);
        assert_eq!(json["recovery_timeout"], 60000);
        let back: CircuitBreakerConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, CircuitBreakerConfig::default());
    }
}
