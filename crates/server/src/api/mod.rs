pub mod alerts;
pub mod circuits;
pub mod extract;
pub mod health;
pub mod recovery;
pub mod schemas;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use mender_handlers::AlertStore;
use mender_orchestrator::RecoveryOrchestrator;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// The recovery orchestrator.
    pub orchestrator: Arc<RecoveryOrchestrator>,
    /// Store inbound alerts are persisted to before recovery starts.
    pub alerts: Arc<dyn AlertStore>,
}

/// Build the Axum router with all API routes and middleware.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/health", get(health::health))
        .route("/metrics", get(health::metrics))
        // Inbound alerts
        .route("/v1/alerts", post(alerts::receive_alert))
        .route("/v1/alerts/{alert_id}", get(alerts::get_alert))
        // Recovery administration
        .route("/admin/recovery/enable", post(recovery::enable))
        .route("/admin/recovery/disable", post(recovery::disable))
        .route("/admin/recovery/status", get(recovery::status))
        .route("/admin/recovery/stats", get(recovery::stats))
        .route("/admin/recovery/history", get(recovery::history))
        .route("/admin/recovery/active", get(recovery::active))
        .route("/admin/recovery/queue", get(recovery::queue))
        .route(
            "/admin/recovery/actions",
            get(recovery::list_actions).post(recovery::add_action),
        )
        .route(
            "/admin/recovery/actions/{action_id}",
            get(recovery::get_action)
                .patch(recovery::update_action)
                .delete(recovery::remove_action),
        )
        .route(
            "/admin/recovery/actions/{action_id}/test/{alert_id}",
            post(recovery::test_action),
        )
        // Circuit administration
        .route("/admin/circuits", get(circuits::list_circuits))
        .route("/admin/circuits/reset", post(circuits::reset_all_circuits))
        .route("/admin/circuits/{circuit_id}", get(circuits::get_circuit))
        .route(
            "/admin/circuits/{circuit_id}/reset",
            post(circuits::reset_circuit),
        )
        .route(
            "/admin/circuits/{circuit_id}/force-open",
            post(circuits::force_open_circuit),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
