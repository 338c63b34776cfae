//! The recovery playbook catalog.
//!
//! Actions are kept in insertion order. Selecting an action for an alert is a
//! two-stage process: [`RecoveryCatalog::candidates`] applies every check that
//! needs no I/O (auto-execute flag, per-action cooldown, severity, alert type)
//! and orders the survivors by priority; [`select_action`] then walks them and
//! returns the first whose metric thresholds all hold.

use chrono::{DateTime, Utc};
use mender_core::{
    Alert, AlertType, MetricOp, RecoveryAction, RecoveryActionUpdate, RecoveryConditions,
    RecoveryPhases, RecoveryStep, Severity, StepType, SuccessCondition,
};
use mender_handlers::MetricsSource;
use tracing::debug;

use crate::error::CatalogError;

#[derive(Debug, Clone, Default)]
pub struct RecoveryCatalog {
    actions: Vec<RecoveryAction>,
}

impl RecoveryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog holding the built-in playbooks.
    pub fn with_defaults() -> Self {
        Self {
            actions: default_actions(),
        }
    }

    /// Register a new action. Ids must be unique.
    pub fn add(&mut self, action: RecoveryAction) -> Result<(), CatalogError> {
        action.validate().map_err(CatalogError::InvalidAction)?;
        if self.get(&action.id).is_some() {
            return Err(CatalogError::DuplicateAction(action.id));
        }
        self.actions.push(action);
        Ok(())
    }

    /// Apply a partial update and return the updated action.
    ///
    /// The action keeps its id and its position in the catalog.
    pub fn update(
        &mut self,
        id: &str,
        update: RecoveryActionUpdate,
    ) -> Result<RecoveryAction, CatalogError> {
        let slot = self
            .actions
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| CatalogError::ActionNotFound(id.to_owned()))?;
        let updated = update.apply_to(slot.clone());
        updated.validate().map_err(CatalogError::InvalidAction)?;
        *slot = updated.clone();
        Ok(updated)
    }

    pub fn remove(&mut self, id: &str) -> Result<RecoveryAction, CatalogError> {
        let index = self
            .actions
            .iter()
            .position(|a| a.id == id)
            .ok_or_else(|| CatalogError::ActionNotFound(id.to_owned()))?;
        Ok(self.actions.remove(index))
    }

    pub fn get(&self, id: &str) -> Option<&RecoveryAction> {
        self.actions.iter().find(|a| a.id == id)
    }

    /// All actions in insertion order.
    pub fn list(&self) -> &[RecoveryAction] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Every step type referenced by any phase of any action.
    pub fn step_types(&self) -> impl Iterator<Item = StepType> + '_ {
        self.actions
            .iter()
            .flat_map(|a| a.actions.all_steps().map(|s| s.step_type))
    }

    /// Actions that may handle `alert`, best first, before metric thresholds
    /// are consulted.
    ///
    /// `last_attempt` returns when the action was last started, if ever.
    /// Ordering is by descending priority; equal priorities keep catalog
    /// order.
    pub fn candidates(
        &self,
        alert: &Alert,
        now: DateTime<Utc>,
        last_attempt: impl Fn(&str) -> Option<DateTime<Utc>>,
    ) -> Vec<RecoveryAction> {
        let mut candidates: Vec<RecoveryAction> = self
            .actions
            .iter()
            .filter(|action| {
                if !action.auto_execute {
                    return false;
                }
                if in_cooldown(action, last_attempt(&action.id), now) {
                    debug!(action = %action.id, "action is in cooldown");
                    return false;
                }
                matches_alert(action, alert)
            })
            .cloned()
            .collect();
        candidates.sort_by_key(|a| std::cmp::Reverse(a.priority));
        candidates
    }
}

/// Whether `action` was started less than its cooldown period before `now`.
pub fn in_cooldown(
    action: &RecoveryAction,
    last_started: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    let Some(started) = last_started else {
        return false;
    };
    match (now - started).to_std() {
        Ok(elapsed) => elapsed < action.cooldown(),
        // Started in the future: clock skew, stay cautious.
        Err(_) => true,
    }
}

/// Severity must match exactly; an alert-type list, when present, must
/// include the alert's type.
pub fn matches_alert(action: &RecoveryAction, alert: &Alert) -> bool {
    if action.severity != alert.severity {
        return false;
    }
    action
        .conditions
        .alert_types
        .as_ref()
        .is_none_or(|types| types.contains(&alert.alert_type))
}

/// Every metric threshold on the action must be met (current value not below
/// threshold).
pub async fn thresholds_met(action: &RecoveryAction, metrics: &dyn MetricsSource) -> bool {
    for (metric, threshold) in &action.conditions.metric_thresholds {
        let current = metrics.latest_value(metric).await;
        if current < *threshold {
            debug!(
                action = %action.id,
                metric = %metric,
                current,
                threshold,
                "metric below threshold"
            );
            return false;
        }
    }
    true
}

/// First candidate whose metric thresholds hold.
pub async fn select_action(
    candidates: Vec<RecoveryAction>,
    metrics: &dyn MetricsSource,
) -> Option<RecoveryAction> {
    for action in candidates {
        if thresholds_met(&action, metrics).await {
            return Some(action);
        }
    }
    None
}

fn metric_below(metric: &str, value: f64) -> SuccessCondition {
    SuccessCondition::MetricThreshold {
        metric: metric.to_owned(),
        op: MetricOp::Lt,
        value,
    }
}

fn notify(team: &str, priority: &str, issue: &str) -> RecoveryStep {
    RecoveryStep::new(StepType::NotifyTeam, team)
        .param("priority", priority)
        .param("issue", issue)
}

/// The built-in playbooks.
#[allow(clippy::too_many_lines)]
pub fn default_actions() -> Vec<RecoveryAction> {
    vec![
        RecoveryAction {
            id: "high-memory-usage".into(),
            name: "High Memory Usage Recovery".into(),
            description: "Automated recovery for high memory usage alerts".into(),
            severity: Severity::High,
            conditions: RecoveryConditions {
                metric_thresholds: [("memory_usage".to_owned(), 85.0)].into(),
                alert_types: None,
                duration_minutes: Some(5),
                consecutive_failures: Some(2),
            },
            actions: RecoveryPhases {
                immediate: vec![
                    RecoveryStep::new(StepType::ClearCache, "application")
                        .param("cacheTypes", serde_json::json!(["redis", "memory", "temp"])),
                    RecoveryStep::new(StepType::ExecuteScript, "/scripts/memory-cleanup.sh")
                        .with_success_condition(metric_below("memory_usage", 80.0)),
                ],
                fallback: vec![
                    RecoveryStep::new(StepType::RestartService, "api-server")
                        .param("graceful", true)
                        .param("timeout", 30),
                ],
                escalation: vec![notify("ops-team", "high", "memory-usage")],
            },
            max_retries: 3,
            cooldown_period: 10,
            auto_execute: true,
            priority: 0,
        },
        RecoveryAction {
            id: "high-response-time".into(),
            name: "High Response Time Recovery".into(),
            description: "Automated recovery for slow response times".into(),
            severity: Severity::High,
            conditions: RecoveryConditions {
                metric_thresholds: [("response_time".to_owned(), 2000.0)].into(),
                alert_types: None,
                duration_minutes: Some(3),
                consecutive_failures: Some(3),
            },
            actions: RecoveryPhases {
                immediate: vec![
                    RecoveryStep::new(StepType::ClearCache, "application")
                        .param("cacheTypes", serde_json::json!(["query", "page"])),
                    RecoveryStep::new(StepType::ResetConnections, "database")
                        .param("maxConnections", 20),
                ],
                fallback: vec![
                    RecoveryStep::new(StepType::ScaleResources, "api-server")
                        .param("action", "scale_up")
                        .param("factor", 1.5),
                ],
                escalation: vec![notify("dev-team", "high", "performance")],
            },
            max_retries: 2,
            cooldown_period: 15,
            auto_execute: true,
            priority: 0,
        },
        RecoveryAction {
            id: "database-connection-failure".into(),
            name: "Database Connection Recovery".into(),
            description: "Automated recovery for database connection issues".into(),
            severity: Severity::Critical,
            conditions: RecoveryConditions {
                alert_types: Some(vec![AlertType::System, AlertType::Database]),
                consecutive_failures: Some(1),
                ..RecoveryConditions::default()
            },
            actions: RecoveryPhases {
                immediate: vec![
                    RecoveryStep::new(StepType::ResetConnections, "database").param("force", true),
                    RecoveryStep::new(StepType::ExecuteScript, "/scripts/db-health-check.sh")
                        .with_success_condition(SuccessCondition::ServiceStatus {
                            service: "postgresql".into(),
                            expected: "running".into(),
                        }),
                ],
                fallback: vec![
                    RecoveryStep::new(StepType::RestartService, "postgresql")
                        .param("force", false)
                        .param("timeout", 60),
                ],
                escalation: vec![
                    RecoveryStep::new(StepType::IsolateComponent, "database-dependent-services")
                        .param("mode", "graceful_degradation"),
                    notify("dba-team", "critical", "database-down"),
                ],
            },
            max_retries: 2,
            cooldown_period: 5,
            auto_execute: true,
            priority: 0,
        },
        RecoveryAction {
            id: "disk-space-full".into(),
            name: "Disk Space Recovery".into(),
            description: "Automated cleanup for disk space issues".into(),
            severity: Severity::Critical,
            conditions: RecoveryConditions {
                metric_thresholds: [("disk_usage".to_owned(), 95.0)].into(),
                duration_minutes: Some(1),
                ..RecoveryConditions::default()
            },
            actions: RecoveryPhases {
                immediate: vec![
                    RecoveryStep::new(StepType::ExecuteScript, "/scripts/disk-cleanup.sh")
                        .param("cleanTmp", true)
                        .param("cleanLogs", true)
                        .param("cleanOldBackups", true)
                        .with_success_condition(metric_below("disk_usage", 90.0)),
                ],
                fallback: vec![
                    RecoveryStep::new(StepType::ExecuteScript, "/scripts/emergency-cleanup.sh")
                        .param("aggressive", true),
                ],
                escalation: vec![notify("ops-team", "critical", "disk-full")],
            },
            max_retries: 1,
            cooldown_period: 30,
            auto_execute: true,
            priority: 0,
        },
        RecoveryAction {
            id: "deployment-failure".into(),
            name: "Deployment Failure Recovery".into(),
            description: "Automated rollback for failed deployments".into(),
            severity: Severity::High,
            conditions: RecoveryConditions {
                alert_types: Some(vec![AlertType::Deployment]),
                consecutive_failures: Some(1),
                ..RecoveryConditions::default()
            },
            actions: RecoveryPhases {
                immediate: vec![
                    RecoveryStep::new(StepType::RollbackDeployment, "latest")
                        .param("environment", "production")
                        .param("preserveData", true)
                        .with_success_condition(SuccessCondition::HttpResponse {
                            url: "http://localhost:4000/health".into(),
                        }),
                ],
                fallback: Vec::new(),
                escalation: vec![
                    notify("dev-team", "high", "deployment-rollback").param("includeDetails", true),
                ],
            },
            max_retries: 1,
            cooldown_period: 60,
            auto_execute: true,
            priority: 0,
        },
    ]
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use mender_handlers::MemoryMetrics;

    use super::*;

    fn alert(severity: Severity, alert_type: AlertType) -> Alert {
        Alert::new("test", severity, alert_type)
    }

    fn ids(actions: &[RecoveryAction]) -> Vec<&str> {
        actions.iter().map(|a| a.id.as_str()).collect()
    }

    fn never(_: &str) -> Option<DateTime<Utc>> {
        None
    }

    fn matching(
        catalog: &RecoveryCatalog,
        severity: Severity,
        alert_type: AlertType,
    ) -> Vec<RecoveryAction> {
        catalog.candidates(&alert(severity, alert_type), Utc::now(), never)
    }

    // -- Catalog administration ---------------------------------------------

    #[test]
    fn defaults_are_valid_and_ordered() {
        let catalog = RecoveryCatalog::with_defaults();
        assert_eq!(
            ids(catalog.list()),
            vec![
                "high-memory-usage",
                "high-response-time",
                "database-connection-failure",
                "disk-space-full",
                "deployment-failure",
            ]
        );
        for action in catalog.list() {
            assert!(action.validate().is_ok(), "{} should validate", action.id);
        }
        let cooldowns: Vec<u64> = catalog.list().iter().map(|a| a.cooldown_period).collect();
        assert_eq!(cooldowns, vec![10, 15, 5, 30, 60]);
    }

    #[test]
    fn defaults_survive_a_json_round_trip() {
        let json = serde_json::to_string(&default_actions()).unwrap();
        let parsed: Vec<RecoveryAction> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, default_actions());
    }

    #[test]
    fn add_rejects_duplicates_and_invalid_actions() {
        let mut catalog = RecoveryCatalog::with_defaults();
        let dup = catalog.get("disk-space-full").cloned().unwrap();
        assert_eq!(
            catalog.add(dup),
            Err(CatalogError::DuplicateAction("disk-space-full".into()))
        );

        let mut empty = catalog.get("disk-space-full").cloned().unwrap();
        empty.id = "empty".into();
        empty.actions = RecoveryPhases::default();
        assert!(matches!(
            catalog.add(empty),
            Err(CatalogError::InvalidAction(_))
        ));
        assert_eq!(catalog.len(), 5);
    }

    #[test]
    fn update_keeps_position_and_validates() {
        let mut catalog = RecoveryCatalog::with_defaults();
        let updated = catalog
            .update(
                "high-response-time",
                RecoveryActionUpdate {
                    priority: Some(7),
                    ..RecoveryActionUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(updated.priority, 7);
        assert_eq!(catalog.list()[1].priority, 7);

        let bad = RecoveryActionUpdate {
            actions: Some(RecoveryPhases::default()),
            ..RecoveryActionUpdate::default()
        };
        assert!(catalog.update("high-response-time", bad).is_err());
        assert!(!catalog.list()[1].actions.immediate.is_empty());

        assert_eq!(
            catalog.update("missing", RecoveryActionUpdate::default()),
            Err(CatalogError::ActionNotFound("missing".into()))
        );
    }

    #[test]
    fn remove_returns_the_action() {
        let mut catalog = RecoveryCatalog::with_defaults();
        let removed = catalog.remove("deployment-failure").unwrap();
        assert_eq!(removed.id, "deployment-failure");
        assert_eq!(catalog.len(), 4);
        assert!(catalog.remove("deployment-failure").is_err());
    }

    // -- Eligibility ----------------------------------------------------------

    #[test]
    fn severity_must_match_exactly() {
        let catalog = RecoveryCatalog::with_defaults();
        let high = matching(&catalog, Severity::High, AlertType::Performance);
        assert_eq!(ids(&high), vec!["high-memory-usage", "high-response-time"]);

        let low = matching(&catalog, Severity::Low, AlertType::Performance);
        assert!(low.is_empty());
    }

    #[test]
    fn alert_types_restrict_matches() {
        let catalog = RecoveryCatalog::with_defaults();
        let deploy = matching(&catalog, Severity::High, AlertType::Deployment);
        assert!(ids(&deploy).contains(&"deployment-failure"));

        let db = matching(&catalog, Severity::Critical, AlertType::Network);
        assert_eq!(ids(&db), vec!["disk-space-full"]);
    }

    #[test]
    fn cooldown_uses_last_start() {
        let catalog = RecoveryCatalog::with_defaults();
        let now = Utc::now();
        let recent = |id: &str| (id == "high-memory-usage").then(|| now - Duration::minutes(9));
        let found = catalog.candidates(&alert(Severity::High, AlertType::System), now, recent);
        assert_eq!(ids(&found), vec!["high-response-time"]);

        let stale = |id: &str| (id == "high-memory-usage").then(|| now - Duration::minutes(10));
        let found = catalog.candidates(&alert(Severity::High, AlertType::System), now, stale);
        assert_eq!(ids(&found), vec!["high-memory-usage", "high-response-time"]);
    }

    #[test]
    fn manual_only_actions_are_skipped() {
        let mut catalog = RecoveryCatalog::with_defaults();
        catalog
            .update(
                "high-memory-usage",
                RecoveryActionUpdate {
                    auto_execute: Some(false),
                    ..RecoveryActionUpdate::default()
                },
            )
            .unwrap();
        let found = matching(&catalog, Severity::High, AlertType::System);
        assert_eq!(ids(&found), vec!["high-response-time"]);
    }

    #[test]
    fn higher_priority_wins_ties_keep_insertion_order() {
        let mut catalog = RecoveryCatalog::with_defaults();
        catalog
            .update(
                "high-response-time",
                RecoveryActionUpdate {
                    priority: Some(10),
                    ..RecoveryActionUpdate::default()
                },
            )
            .unwrap();
        let found = matching(&catalog, Severity::High, AlertType::System);
        assert_eq!(ids(&found), vec!["high-response-time", "high-memory-usage"]);
    }

    #[tokio::test]
    async fn thresholds_are_inclusive_and_conjunctive() {
        let metrics = MemoryMetrics::new();
        let mut action = default_actions().remove(0);
        action
            .conditions
            .metric_thresholds
            .insert("swap_usage".into(), 50.0);

        metrics.set("memory_usage", 85.0);
        metrics.set("swap_usage", 49.9);
        assert!(!thresholds_met(&action, &metrics).await);

        metrics.set("swap_usage", 50.0);
        assert!(thresholds_met(&action, &metrics).await);
    }

    #[tokio::test]
    async fn select_skips_candidates_below_threshold() {
        let metrics = MemoryMetrics::new();
        metrics.set("memory_usage", 40.0);
        metrics.set("response_time", 2500.0);

        let catalog = RecoveryCatalog::with_defaults();
        let candidates = matching(&catalog, Severity::High, AlertType::Performance);
        let chosen = select_action(candidates, &metrics).await.unwrap();
        assert_eq!(chosen.id, "high-response-time");

        metrics.set("response_time", 100.0);
        let candidates = matching(&catalog, Severity::High, AlertType::Performance);
        assert!(select_action(candidates, &metrics).await.is_none());
    }
}
