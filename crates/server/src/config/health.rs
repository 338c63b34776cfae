use std::time::Duration;

use mender_orchestrator::HealthThresholds;
use serde::Deserialize;

/// Limits above which the circuit health poll raises alerts.
#[derive(Debug, Deserialize)]
pub struct HealthServerConfig {
    /// Error rate, in percent, above which a circuit raises an alert.
    #[serde(default = "default_error_rate_ceiling")]
    pub error_rate_ceiling_percent: f64,
    /// Requests a circuit must have seen before its error rate counts.
    #[serde(default = "default_min_request_volume")]
    pub min_request_volume: u64,
    /// Average response time, in milliseconds, above which a circuit raises
    /// an alert.
    #[serde(default = "default_response_time_ceiling")]
    pub response_time_ceiling_ms: u64,
}

impl Default for HealthServerConfig {
    fn default() -> Self {
        Self {
            error_rate_ceiling_percent: default_error_rate_ceiling(),
            min_request_volume: default_min_request_volume(),
            response_time_ceiling_ms: default_response_time_ceiling(),
        }
    }
}

impl HealthServerConfig {
    pub fn to_thresholds(&self) -> HealthThresholds {
        HealthThresholds {
            error_rate_ceiling: self.error_rate_ceiling_percent,
            min_request_volume: self.min_request_volume,
            response_time_ceiling: Duration::from_millis(self.response_time_ceiling_ms),
        }
    }
}

fn default_error_rate_ceiling() -> f64 {
    50.0
}

fn default_min_request_volume() -> u64 {
    10
}

fn default_response_time_ceiling() -> u64 {
    5000
}
