use std::fmt;

use serde::{Deserialize, Serialize};

use crate::alert::{Alert, Severity};

/// Machine-readable reason an alert was handed to humans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    /// The orchestrator ran a recovery too recently to start another.
    GlobalCooldown,
    /// No playbook applies to the alert.
    NoActionFound,
    /// Both the immediate and fallback phases failed.
    AutomatedRecoveryFailed,
    /// Recovery aborted on an unexpected error.
    RecoveryError,
    /// Steps succeeded but the triggering metric is still out of bounds.
    RecoveryValidationFailed,
    /// The backpressure queue is full.
    QueueFull,
}

impl EscalationReason {
    /// Whether an automated attempt ran before escalating.
    pub fn after_attempt(self) -> bool {
        matches!(
            self,
            Self::AutomatedRecoveryFailed | Self::RecoveryError | Self::RecoveryValidationFailed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::GlobalCooldown => "global_cooldown",
            Self::NoActionFound => "no_action_found",
            Self::AutomatedRecoveryFailed => "automated_recovery_failed",
            Self::RecoveryError => "recovery_error",
            Self::RecoveryValidationFailed => "recovery_validation_failed",
            Self::QueueFull => "queue_full",
        }
    }
}

impl fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationLevel {
    ManualIntervention,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Immediate,
    High,
}

impl From<Severity> for Urgency {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Critical => Self::Immediate,
            _ => Self::High,
        }
    }
}

/// Payload handed to the escalation sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationRequest {
    pub reason: EscalationReason,
    /// `1` when an automated attempt ran before escalating, else `0`.
    pub auto_recovery_attempt: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt_id: Option<String>,
    pub escalation_level: EscalationLevel,
    pub urgency: Urgency,
}

impl EscalationRequest {
    pub fn new(alert: &Alert, reason: EscalationReason, attempt_id: Option<String>) -> Self {
        Self {
            reason,
            auto_recovery_attempt: u8::from(reason.after_attempt()),
            attempt_id,
            escalation_level: EscalationLevel::ManualIntervention,
            urgency: alert.severity.into(),
        }
    }
}
