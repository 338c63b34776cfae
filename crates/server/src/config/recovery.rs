use std::time::Duration;

use mender_orchestrator::RecoveryConfig;
use serde::Deserialize;

/// Recovery orchestrator configuration.
///
/// # Example
///
/// ```toml
/// [recovery]
/// enabled = true
/// max_concurrent_recoveries = 5
/// global_cooldown_seconds = 300
/// load_default_actions = true
/// ```
#[derive(Debug, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct RecoveryServerConfig {
    /// Whether automated recovery starts switched on.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Upper bound on recovery attempts executing at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_recoveries: usize,
    /// Minimum seconds between the starts of any two attempts.
    #[serde(default = "default_global_cooldown")]
    pub global_cooldown_seconds: u64,
    /// Seconds to wait before re-checking the alert metric after a
    /// successful phase.
    #[serde(default = "default_settle_period")]
    pub settle_period_seconds: u64,
    /// Finished attempts kept in memory.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Days after which finished attempts are pruned.
    #[serde(default = "default_history_retention")]
    pub history_retention_days: u64,
    /// Capacity of the backpressure queue.
    #[serde(default = "default_max_queued")]
    pub max_queued_alerts: usize,
    /// Register the built-in playbooks.
    #[serde(default = "default_true")]
    pub load_default_actions: bool,
    /// Route every step call through a per-target circuit breaker.
    #[serde(default = "default_true")]
    pub guard_steps_with_circuits: bool,
}

impl Default for RecoveryServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_concurrent_recoveries: default_max_concurrent(),
            global_cooldown_seconds: default_global_cooldown(),
            settle_period_seconds: default_settle_period(),
            history_limit: default_history_limit(),
            history_retention_days: default_history_retention(),
            max_queued_alerts: default_max_queued(),
            load_default_actions: true,
            guard_steps_with_circuits: true,
        }
    }
}

impl RecoveryServerConfig {
    pub fn to_recovery_config(&self) -> RecoveryConfig {
        RecoveryConfig {
            enabled: self.enabled,
            max_concurrent_recoveries: self.max_concurrent_recoveries,
            global_cooldown: Duration::from_secs(self.global_cooldown_seconds),
            settle_period: Duration::from_secs(self.settle_period_seconds),
            history_limit: self.history_limit,
            history_retention: Duration::from_secs(
                self.history_retention_days.saturating_mul(24 * 60 * 60),
            ),
            max_queued_alerts: self.max_queued_alerts,
            guard_steps_with_circuits: self.guard_steps_with_circuits,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_concurrent() -> usize {
    5
}

fn default_global_cooldown() -> u64 {
    300
}

fn default_settle_period() -> u64 {
    10
}

fn default_history_limit() -> usize {
    1000
}

fn default_history_retention() -> u64 {
    7
}

fn default_max_queued() -> usize {
    100
}
