use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::recovery::{Phase, RecoveryStep};

/// Lifecycle status of a recovery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Success,
    Failed,
}

impl AttemptStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProgress => write!(f, "in_progress"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Running,
    Success,
    Failed,
    /// The handler did not return within the step timeout.
    TimedOut,
}

impl StepStatus {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Record of one executed step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecution {
    pub phase: Phase,
    pub step: RecoveryStep,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepExecution {
    /// Start recording `step` now.
    pub fn start(phase: Phase, step: RecoveryStep) -> Self {
        Self {
            phase,
            step,
            started_at: Utc::now(),
            ended_at: None,
            status: StepStatus::Running,
            output: None,
            error: None,
        }
    }

    pub fn succeed(&mut self, output: Option<String>) {
        self.ended_at = Some(Utc::now());
        self.status = StepStatus::Success;
        self.output = output;
    }

    pub fn fail(&mut self, status: StepStatus, error: impl Into<String>) {
        self.ended_at = Some(Utc::now());
        self.status = status;
        self.error = Some(error.into());
    }
}

/// Final verdict of an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptResult {
    pub resolved: bool,
    pub notes: String,
}

/// One execution of a playbook against an alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryAttempt {
    pub id: String,
    pub alert_id: String,
    pub action_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub status: AttemptStatus,
    #[serde(default)]
    pub steps: Vec<StepExecution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<AttemptResult>,
}

impl RecoveryAttempt {
    /// Create an in-progress attempt.
    pub fn new(alert_id: impl Into<String>, action_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            alert_id: alert_id.into(),
            action_id: action_id.into(),
            started_at: Utc::now(),
            ended_at: None,
            status: AttemptStatus::InProgress,
            steps: Vec::new(),
            result: None,
        }
    }

    /// Move the attempt to a terminal status.
    pub fn finish(&mut self, status: AttemptStatus, resolved: bool, notes: impl Into<String>) {
        self.ended_at = Some(Utc::now());
        self.status = status;
        self.result = Some(AttemptResult {
            resolved,
            notes: notes.into(),
        });
    }

    /// Wall-clock duration, once finished.
    pub fn duration_ms(&self) -> Option<i64> {
        self.ended_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }

    /// Steps executed within one phase.
    pub fn steps_in(&self, phase: Phase) -> impl Iterator<Item = &StepExecution> {
        self.steps.iter().filter(move |s| s.phase == phase)
    }
}
