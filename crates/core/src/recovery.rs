use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::alert::{AlertType, Severity};
use crate::condition::SuccessCondition;

/// Default per-step timeout when a step does not declare one.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(30);

/// Kind of remediation a step performs. Each kind is served by one registered
/// step handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    RestartService,
    ClearCache,
    ResetConnections,
    ScaleResources,
    RollbackDeployment,
    IsolateComponent,
    ExecuteScript,
    NotifyTeam,
}

impl StepType {
    /// Every step type, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::RestartService,
        Self::ClearCache,
        Self::ResetConnections,
        Self::ScaleResources,
        Self::RollbackDeployment,
        Self::IsolateComponent,
        Self::ExecuteScript,
        Self::NotifyTeam,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::RestartService => "restart_service",
            Self::ClearCache => "clear_cache",
            Self::ResetConnections => "reset_connections",
            Self::ScaleResources => "scale_resources",
            Self::RollbackDeployment => "rollback_deployment",
            Self::IsolateComponent => "isolate_component",
            Self::ExecuteScript => "execute_script",
            Self::NotifyTeam => "notify_team",
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase of a playbook. Phases always run in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// First-line remediation. The first failing step aborts the phase.
    Immediate,
    /// Runs only when the immediate phase failed. Also aborts on first failure.
    Fallback,
    /// Best-effort hand-off steps; every step runs regardless of failures.
    Escalation,
}

impl Phase {
    /// Whether the first failed step ends the phase.
    pub fn short_circuits(self) -> bool {
        matches!(self, Self::Immediate | Self::Fallback)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate => write!(f, "immediate"),
            Self::Fallback => write!(f, "fallback"),
            Self::Escalation => write!(f, "escalation"),
        }
    }
}

/// A single typed remediation instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryStep {
    #[serde(rename = "type")]
    pub step_type: StepType,
    /// What the step acts on: a service name, cache, script path or team.
    pub target: String,
    /// Free-form handler arguments.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub parameters: serde_json::Map<String, serde_json::Value>,
    /// Step timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// Checked after the step returns; a failed check fails the step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_condition: Option<SuccessCondition>,
}

impl RecoveryStep {
    #[must_use]
    pub fn new(step_type: StepType, target: impl Into<String>) -> Self {
        Self {
            step_type,
            target: target.into(),
            parameters: serde_json::Map::new(),
            timeout: None,
            success_condition: None,
        }
    }

    /// Add one handler parameter.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = Some(seconds);
        self
    }

    #[must_use]
    pub fn with_success_condition(mut self, condition: SuccessCondition) -> Self {
        self.success_condition = Some(condition);
        self
    }

    /// Effective timeout for the step.
    pub fn timeout(&self) -> Duration {
        self.timeout
            .map_or(DEFAULT_STEP_TIMEOUT, Duration::from_secs)
    }
}

/// Conditions an alert must satisfy for a playbook to apply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecoveryConditions {
    /// Every listed metric's latest value must be at or above its threshold.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metric_thresholds: BTreeMap<String, f64>,
    /// When present, the alert type must be one of these.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_types: Option<Vec<AlertType>>,
    /// How long the condition should persist before acting, in minutes.
    /// Informational; the monitoring side enforces it before raising the alert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    /// Consecutive failing checks before acting. Informational, as above.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consecutive_failures: Option<u32>,
}

/// Ordered step lists for each phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecoveryPhases {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub immediate: Vec<RecoveryStep>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback: Vec<RecoveryStep>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub escalation: Vec<RecoveryStep>,
}

impl RecoveryPhases {
    pub fn steps(&self, phase: Phase) -> &[RecoveryStep] {
        match phase {
            Phase::Immediate => &self.immediate,
            Phase::Fallback => &self.fallback,
            Phase::Escalation => &self.escalation,
        }
    }

    /// Iterate every step of every phase.
    pub fn all_steps(&self) -> impl Iterator<Item = &RecoveryStep> {
        self.immediate
            .iter()
            .chain(&self.fallback)
            .chain(&self.escalation)
    }
}

/// A remediation playbook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryAction {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Alerts must carry exactly this severity.
    pub severity: Severity,
    #[serde(default)]
    pub conditions: RecoveryConditions,
    pub actions: RecoveryPhases,
    /// Upper bound on manual re-runs an operator should attempt.
    #[serde(default)]
    pub max_retries: u32,
    /// Minimum minutes between two attempts that use this playbook.
    #[serde(default)]
    pub cooldown_period: u64,
    /// Whether alerts may trigger this playbook automatically.
    #[serde(default = "default_auto_execute")]
    pub auto_execute: bool,
    /// Higher values win when several playbooks apply.
    #[serde(default)]
    pub priority: i32,
}

fn default_auto_execute() -> bool {
    true
}

impl RecoveryAction {
    /// Cooldown as a duration.
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_period.saturating_mul(60))
    }

    /// Validate structural invariants.
    ///
    /// Success conditions are already parsed by the time an action exists, so
    /// this only checks identity and step shape.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("action id must not be empty".into());
        }
        if self.actions.immediate.is_empty() && self.actions.fallback.is_empty() {
            return Err(format!(
                "action '{}' must define immediate or fallback steps",
                self.id
            ));
        }
        if let Some(step) = self
            .actions
            .all_steps()
            .find(|s| s.target.trim().is_empty())
        {
            return Err(format!(
                "action '{}' has a {} step with an empty target",
                self.id, step.step_type
            ));
        }
        if self.actions.all_steps().any(|s| s.timeout == Some(0)) {
            return Err(format!("action '{}' has a step with a zero timeout", self.id));
        }
        Ok(())
    }
}

/// Partial update applied by operators to an existing playbook.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecoveryActionUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub severity: Option<Severity>,
    pub conditions: Option<RecoveryConditions>,
    pub actions: Option<RecoveryPhases>,
    pub max_retries: Option<u32>,
    pub cooldown_period: Option<u64>,
    pub auto_execute: Option<bool>,
    pub priority: Option<i32>,
}

impl RecoveryActionUpdate {
    /// Return `action` with every field present in the update replaced.
    #[must_use]
    pub fn apply_to(self, mut action: RecoveryAction) -> RecoveryAction {
        if let Some(name) = self.name {
            action.name = name;
        }
        if let Some(description) = self.description {
            action.description = description;
        }
        if let Some(severity) = self.severity {
            action.severity = severity;
        }
        if let Some(conditions) = self.conditions {
            action.conditions = conditions;
        }
        if let Some(actions) = self.actions {
            action.actions = actions;
        }
        if let Some(max_retries) = self.max_retries {
            action.max_retries = max_retries;
        }
        if let Some(cooldown) = self.cooldown_period {
            action.cooldown_period = cooldown;
        }
        if let Some(auto_execute) = self.auto_execute {
            action.auto_execute = auto_execute;
        }
        if let Some(priority) = self.priority {
            action.priority = priority;
        }
        action
    }
}
