use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attempt::{AttemptStatus, RecoveryAttempt};

/// Number of entries reported in [`RecoveryStats::top_issues`].
pub const TOP_ISSUES: usize = 10;

/// Per-playbook aggregate over the attempt history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueStats {
    pub action_id: String,
    pub count: u64,
    /// Percentage of attempts that succeeded.
    pub success_rate: f64,
    /// Mean duration of finished attempts, in milliseconds.
    pub average_time_ms: f64,
}

/// Aggregate statistics over the attempt history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecoveryStats {
    pub total_attempts: u64,
    pub successful_recoveries: u64,
    pub failed_recoveries: u64,
    /// Mean duration of successful attempts, in milliseconds.
    pub average_recovery_time_ms: f64,
    pub top_issues: Vec<IssueStats>,
}

#[derive(Default)]
struct Tally {
    count: u64,
    successes: u64,
    total_ms: i64,
}

impl RecoveryStats {
    #[allow(clippy::cast_precision_loss)]
    pub fn from_attempts<'a>(attempts: impl IntoIterator<Item = &'a RecoveryAttempt>) -> Self {
        let mut stats = Self::default();
        let mut success_ms: i64 = 0;
        // Keyed by action id; first-seen order breaks ties between equal counts.
        let mut order: Vec<String> = Vec::new();
        let mut tallies: HashMap<String, Tally> = HashMap::new();

        for attempt in attempts {
            stats.total_attempts += 1;
            match attempt.status {
                AttemptStatus::Success => {
                    stats.successful_recoveries += 1;
                    success_ms += attempt.duration_ms().unwrap_or(0);
                }
                AttemptStatus::Failed => stats.failed_recoveries += 1,
                AttemptStatus::InProgress => {}
            }

            let tally = tallies.entry(attempt.action_id.clone()).or_insert_with(|| {
                order.push(attempt.action_id.clone());
                Tally::default()
            });
            tally.count += 1;
            if attempt.status == AttemptStatus::Success {
                tally.successes += 1;
            }
            tally.total_ms += attempt.duration_ms().unwrap_or(0);
        }

        if stats.successful_recoveries > 0 {
            stats.average_recovery_time_ms = success_ms as f64 / stats.successful_recoveries as f64;
        }

        let mut issues: Vec<IssueStats> = order
            .into_iter()
            .filter_map(|id| {
                let tally = tallies.remove(&id)?;
                let count = tally.count as f64;
                Some(IssueStats {
                    action_id: id,
                    count: tally.count,
                    success_rate: tally.successes as f64 / count * 100.0,
                    average_time_ms: tally.total_ms as f64 / count,
                })
            })
            .collect();
        issues.sort_by(|a, b| b.count.cmp(&a.count));
        issues.truncate(TOP_ISSUES);
        stats.top_issues = issues;
        stats
    }

    /// Percentage of terminal attempts that succeeded, `None` when nothing ran.
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> Option<f64> {
        let finished = self.successful_recoveries + self.failed_recoveries;
        if finished == 0 {
            return None;
        }
        Some(self.successful_recoveries as f64 / finished as f64 * 100.0)
    }
}

/// Coarse health of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Snapshot returned by the orchestrator status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    pub status: HealthState,
    pub enabled: bool,
    pub active_recoveries: usize,
    pub queued_alerts: usize,
    pub registered_actions: usize,
    pub max_concurrent_recoveries: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_global_recovery: Option<DateTime<Utc>>,
    pub issues: Vec<String>,
}
