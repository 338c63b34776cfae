use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use tracing::info;

use mender_core::Alert;
use mender_orchestrator::OrchestratorError;

use super::AppState;
use super::extract::ApiJson;
use super::schemas::{AlertAcceptedResponse, ReceiveAlertQuery};
use crate::error::ServerError;

fn store_error(e: &mender_handlers::HandlerError) -> ServerError {
    ServerError::Orchestrator(OrchestratorError::Store(e.to_string()))
}

/// `POST /v1/alerts` -- persist an alert and start recovery for it.
///
/// By default recovery runs on a background task and the response is `202`.
/// With `?wait=true` the request blocks until the orchestrator has decided
/// (and, if a playbook ran, finished) and reports the outcome.
pub async fn receive_alert(
    State(state): State<AppState>,
    Query(query): Query<ReceiveAlertQuery>,
    ApiJson(alert): ApiJson<Alert>,
) -> Result<(StatusCode, Json<AlertAcceptedResponse>), ServerError> {
    if alert.id.trim().is_empty() {
        return Err(ServerError::BadRequest("alert id must not be empty".into()));
    }
    let alert_id = alert.id.clone();
    info!(alert.id = %alert_id, severity = %alert.severity, "alert received");
    state
        .alerts
        .save(alert.clone())
        .await
        .map_err(|e| store_error(&e))?;

    if !alert.is_open() {
        return Ok((
            StatusCode::OK,
            Json(AlertAcceptedResponse {
                outcome: "ignored",
                ..AlertAcceptedResponse::accepted(alert_id)
            }),
        ));
    }

    if query.wait {
        let disposition = state.orchestrator.handle_alert(alert).await;
        return Ok((
            StatusCode::OK,
            Json(AlertAcceptedResponse::from_disposition(alert_id, disposition)),
        ));
    }

    state.orchestrator.spawn_alert(alert);
    Ok((
        StatusCode::ACCEPTED,
        Json(AlertAcceptedResponse::accepted(alert_id)),
    ))
}

/// `GET /v1/alerts/{alert_id}` -- current state of a stored alert.
pub async fn get_alert(
    State(state): State<AppState>,
    Path(alert_id): Path<String>,
) -> Result<Json<Alert>, ServerError> {
    state
        .alerts
        .get(&alert_id)
        .await
        .map_err(|e| store_error(&e))?
        .map(Json)
        .ok_or_else(|| ServerError::NotFound(format!("alert not found: {alert_id}")))
}
