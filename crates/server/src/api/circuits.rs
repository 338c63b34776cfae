use axum::Json;
use axum::extract::{Path, State};
use mender_circuit::CircuitStats;

use super::AppState;
use super::schemas::{AdminActionResponse, ListCircuitsResponse};
use crate::error::ServerError;

fn not_found(circuit_id: &str) -> ServerError {
    ServerError::NotFound(format!("circuit not found: {circuit_id}"))
}

/// `GET /admin/circuits` -- every circuit with its current statistics.
pub async fn list_circuits(State(state): State<AppState>) -> Json<ListCircuitsResponse> {
    let mut circuits = state.orchestrator.circuit_stats();
    circuits.sort_by(|a, b| a.id.cmp(&b.id));
    Json(ListCircuitsResponse {
        count: circuits.len(),
        circuits,
    })
}

/// `GET /admin/circuits/{circuit_id}`
pub async fn get_circuit(
    State(state): State<AppState>,
    Path(circuit_id): Path<String>,
) -> Result<Json<CircuitStats>, ServerError> {
    state
        .orchestrator
        .circuit(&circuit_id)
        .map(Json)
        .ok_or_else(|| not_found(&circuit_id))
}

/// `POST /admin/circuits/{circuit_id}/reset` -- close a circuit and clear
/// its counters.
pub async fn reset_circuit(
    State(state): State<AppState>,
    Path(circuit_id): Path<String>,
) -> Result<Json<AdminActionResponse>, ServerError> {
    if !state.orchestrator.reset_circuit(&circuit_id) {
        return Err(not_found(&circuit_id));
    }
    Ok(Json(AdminActionResponse::ok(format!(
        "circuit {circuit_id} reset"
    ))))
}

/// `POST /admin/circuits/reset` -- reset every circuit.
pub async fn reset_all_circuits(State(state): State<AppState>) -> Json<AdminActionResponse> {
    let count = state.orchestrator.reset_all_circuits();
    Json(AdminActionResponse::ok(format!("{count} circuits reset")))
}

/// `POST /admin/circuits/{circuit_id}/force-open` -- reject calls until the
/// recovery timeout elapses.
pub async fn force_open_circuit(
    State(state): State<AppState>,
    Path(circuit_id): Path<String>,
) -> Result<Json<AdminActionResponse>, ServerError> {
    if !state.orchestrator.force_open_circuit(&circuit_id) {
        return Err(not_found(&circuit_id));
    }
    Ok(Json(AdminActionResponse::ok(format!(
        "circuit {circuit_id} forced open"
    ))))
}
