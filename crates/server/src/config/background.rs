use std::time::Duration;

use mender_orchestrator::BackgroundConfig;
use serde::Deserialize;

/// Configuration for the periodic recovery, circuit, health and deployment
/// tasks.
#[derive(Debug, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct BackgroundServerConfig {
    /// Whether background processing runs at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// How often to re-scan active alerts and drain the queue (seconds).
    #[serde(default = "default_recovery_check_interval")]
    pub recovery_check_interval_seconds: u64,
    /// How often to poll circuit health (seconds).
    #[serde(default = "default_circuit_poll_interval")]
    pub circuit_poll_interval_seconds: u64,
    /// How often to record system health (seconds).
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_seconds: u64,
    /// How often to run deployment checks (seconds).
    #[serde(default = "default_deployment_check_interval")]
    pub deployment_check_interval_seconds: u64,
    #[serde(default = "default_true")]
    pub enable_recovery_checks: bool,
    #[serde(default = "default_true")]
    pub enable_circuit_polling: bool,
    #[serde(default = "default_true")]
    pub enable_health_checks: bool,
    #[serde(default = "default_true")]
    pub enable_deployment_checks: bool,
}

impl Default for BackgroundServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            recovery_check_interval_seconds: default_recovery_check_interval(),
            circuit_poll_interval_seconds: default_circuit_poll_interval(),
            health_check_interval_seconds: default_health_check_interval(),
            deployment_check_interval_seconds: default_deployment_check_interval(),
            enable_recovery_checks: true,
            enable_circuit_polling: true,
            enable_health_checks: true,
            enable_deployment_checks: true,
        }
    }
}

impl BackgroundServerConfig {
    pub fn to_background_config(&self) -> BackgroundConfig {
        BackgroundConfig {
            recovery_check_interval: Duration::from_secs(self.recovery_check_interval_seconds),
            circuit_poll_interval: Duration::from_secs(self.circuit_poll_interval_seconds),
            health_check_interval: Duration::from_secs(self.health_check_interval_seconds),
            deployment_check_interval: Duration::from_secs(
                self.deployment_check_interval_seconds,
            ),
            enable_recovery_checks: self.enable_recovery_checks,
            enable_circuit_polling: self.enable_circuit_polling,
            enable_health_checks: self.enable_health_checks,
            enable_deployment_checks: self.enable_deployment_checks,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_recovery_check_interval() -> u64 {
    30
}

fn default_circuit_poll_interval() -> u64 {
    30
}

fn default_health_check_interval() -> u64 {
    60
}

fn default_deployment_check_interval() -> u64 {
    120
}
