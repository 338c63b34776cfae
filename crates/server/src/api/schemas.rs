use mender_circuit::CircuitStats;
use mender_core::{EscalationReason, OrchestratorStatus, RecoveryAction, RecoveryAttempt};
use mender_orchestrator::{AlertDisposition, MetricsSnapshot};
use serde::{Deserialize, Serialize};

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status indicator.
    pub status: String,
    /// Orchestrator health and capacity.
    pub recovery: OrchestratorStatus,
}

/// Orchestrator counters.
#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    #[serde(flatten)]
    pub counters: MetricsSnapshot,
    pub open_circuits: usize,
}

/// Query parameters for `POST /v1/alerts`.
#[derive(Debug, Default, Deserialize)]
pub struct ReceiveAlertQuery {
    /// Run recovery inline and report the outcome instead of answering
    /// immediately.
    #[serde(default)]
    pub wait: bool,
}

/// Outcome of submitting an alert.
#[derive(Debug, Serialize)]
pub struct AlertAcceptedResponse {
    pub alert_id: String,
    /// `accepted` when recovery was handed to a background task, otherwise
    /// what the orchestrator did.
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<EscalationReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<RecoveryAttempt>,
}

impl AlertAcceptedResponse {
    pub fn accepted(alert_id: String) -> Self {
        Self {
            alert_id,
            outcome: "accepted",
            reason: None,
            attempt: None,
        }
    }

    pub fn from_disposition(alert_id: String, disposition: AlertDisposition) -> Self {
        let (outcome, reason, attempt) = match disposition {
            AlertDisposition::Disabled => ("disabled", None, None),
            AlertDisposition::AlreadyActive => ("already_active", None, None),
            AlertDisposition::Queued => ("queued", None, None),
            AlertDisposition::Escalated(reason) => ("escalated", Some(reason), None),
            AlertDisposition::Executed(attempt) => ("executed", None, Some(*attempt)),
        };
        Self {
            alert_id,
            outcome,
            reason,
            attempt,
        }
    }
}

/// Query parameters for `GET /admin/recovery/history`.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

fn default_history_limit() -> usize {
    mender_orchestrator::DEFAULT_HISTORY_LIMIT
}

#[derive(Debug, Serialize)]
pub struct ListActionsResponse {
    pub actions: Vec<RecoveryAction>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct AttemptsResponse {
    pub attempts: Vec<RecoveryAttempt>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct ListCircuitsResponse {
    pub circuits: Vec<CircuitStats>,
    pub count: usize,
}

/// Result of an administrative toggle or circuit operation.
#[derive(Debug, Serialize)]
pub struct AdminActionResponse {
    pub success: bool,
    pub message: String,
}

impl AdminActionResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}
