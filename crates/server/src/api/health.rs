use axum::Json;
use axum::extract::State;

use mender_circuit::CircuitState;

use super::AppState;
use super::schemas::{HealthResponse, MetricsResponse};

/// `GET /health` -- liveness plus the orchestrator's own health.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        recovery: state.orchestrator.status(),
    })
}

/// `GET /metrics` -- orchestrator counters.
pub async fn metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    let open_circuits = state
        .orchestrator
        .circuit_stats()
        .iter()
        .filter(|c| c.state == CircuitState::Open)
        .count();
    Json(MetricsResponse {
        counters: state.orchestrator.metrics(),
        open_circuits,
    })
}
