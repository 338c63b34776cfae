use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use tracing::info;

use mender_core::{
    Alert, OrchestratorStatus, RecoveryAction, RecoveryActionUpdate, RecoveryAttempt,
    RecoveryStats,
};
use mender_orchestrator::{CatalogError, OrchestratorError};

use super::AppState;
use super::extract::ApiJson;
use super::schemas::{
    AdminActionResponse, AttemptsResponse, HistoryQuery, ListActionsResponse,
};
use crate::error::ServerError;

/// `POST /admin/recovery/enable`
pub async fn enable(State(state): State<AppState>) -> Json<AdminActionResponse> {
    state.orchestrator.enable();
    Json(AdminActionResponse::ok("auto-recovery enabled"))
}

/// `POST /admin/recovery/disable`
pub async fn disable(State(state): State<AppState>) -> Json<AdminActionResponse> {
    state.orchestrator.disable();
    Json(AdminActionResponse::ok("auto-recovery disabled"))
}

/// `GET /admin/recovery/status`
pub async fn status(State(state): State<AppState>) -> Json<OrchestratorStatus> {
    Json(state.orchestrator.status())
}

/// `GET /admin/recovery/stats` -- aggregate outcome statistics.
pub async fn stats(State(state): State<AppState>) -> Json<RecoveryStats> {
    Json(state.orchestrator.stats())
}

/// `GET /admin/recovery/history?limit=N` -- finished attempts, newest first.
pub async fn history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Json<AttemptsResponse> {
    let attempts = state.orchestrator.history(query.limit);
    Json(AttemptsResponse {
        count: attempts.len(),
        attempts,
    })
}

/// `GET /admin/recovery/active` -- attempts currently executing.
pub async fn active(State(state): State<AppState>) -> Json<AttemptsResponse> {
    let attempts = state.orchestrator.active_recoveries();
    Json(AttemptsResponse {
        count: attempts.len(),
        attempts,
    })
}

/// `GET /admin/recovery/queue` -- alerts waiting for a recovery slot.
pub async fn queue(State(state): State<AppState>) -> Json<Vec<Alert>> {
    Json(state.orchestrator.queued_alerts())
}

// -- Playbooks --------------------------------------------------------------

/// `GET /admin/recovery/actions`
pub async fn list_actions(State(state): State<AppState>) -> Json<ListActionsResponse> {
    let actions = state.orchestrator.actions();
    Json(ListActionsResponse {
        count: actions.len(),
        actions,
    })
}

/// `GET /admin/recovery/actions/{action_id}`
pub async fn get_action(
    State(state): State<AppState>,
    Path(action_id): Path<String>,
) -> Result<Json<RecoveryAction>, ServerError> {
    state
        .orchestrator
        .action(&action_id)
        .map(Json)
        .ok_or_else(|| OrchestratorError::from(CatalogError::ActionNotFound(action_id)).into())
}

/// `POST /admin/recovery/actions` -- register a new playbook.
pub async fn add_action(
    State(state): State<AppState>,
    ApiJson(action): ApiJson<RecoveryAction>,
) -> Result<(StatusCode, Json<RecoveryAction>), ServerError> {
    state.orchestrator.add_action(action.clone())?;
    Ok((StatusCode::CREATED, Json(action)))
}

/// `PATCH /admin/recovery/actions/{action_id}` -- partial update.
pub async fn update_action(
    State(state): State<AppState>,
    Path(action_id): Path<String>,
    ApiJson(update): ApiJson<RecoveryActionUpdate>,
) -> Result<Json<RecoveryAction>, ServerError> {
    let updated = state.orchestrator.update_action(&action_id, update)?;
    Ok(Json(updated))
}

/// `DELETE /admin/recovery/actions/{action_id}`
pub async fn remove_action(
    State(state): State<AppState>,
    Path(action_id): Path<String>,
) -> Result<Json<RecoveryAction>, ServerError> {
    let removed = state.orchestrator.remove_action(&action_id)?;
    Ok(Json(removed))
}

/// `POST /admin/recovery/actions/{action_id}/test/{alert_id}` -- run a
/// playbook against a stored alert, bypassing eligibility checks.
pub async fn test_action(
    State(state): State<AppState>,
    Path((action_id, alert_id)): Path<(String, String)>,
) -> Result<Json<RecoveryAttempt>, ServerError> {
    info!(action = %action_id, alert.id = %alert_id, "manual recovery test requested");
    let attempt = state
        .orchestrator
        .test_recovery_action(&action_id, &alert_id)
        .await?;
    Ok(Json(attempt))
}
