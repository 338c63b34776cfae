use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use mender_orchestrator::{CatalogError, OrchestratorError};
use thiserror::Error;

/// Errors that can occur when running the Mender server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O error (e.g. binding the listener).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An orchestrator error surfaced through the API.
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    /// The requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request was malformed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The JSON body was missing, unparseable or did not match the schema.
    #[error("invalid request body: {}", .0.body_text())]
    InvalidBody(#[from] JsonRejection),
}

impl ServerError {
    fn status(&self) -> StatusCode {
        match self {
            Self::InvalidBody(rejection) => rejection.status(),
            Self::NotFound(_)
            | Self::Orchestrator(
                OrchestratorError::AlertNotFound(_)
                | OrchestratorError::Catalog(CatalogError::ActionNotFound(_)),
            ) => StatusCode::NOT_FOUND,
            Self::BadRequest(_)
            | Self::Orchestrator(OrchestratorError::Catalog(CatalogError::InvalidAction(_))) => {
                StatusCode::BAD_REQUEST
            }
            Self::Orchestrator(
                OrchestratorError::Catalog(CatalogError::DuplicateAction(_))
                | OrchestratorError::RecoveryInProgress(_),
            ) => StatusCode::CONFLICT,
            Self::Config(_) | Self::Io(_) | Self::Orchestrator(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_errors_map_to_client_statuses() {
        let cases = [
            (CatalogError::ActionNotFound("x".into()), StatusCode::NOT_FOUND),
            (CatalogError::DuplicateAction("x".into()), StatusCode::CONFLICT),
            (CatalogError::InvalidAction("x".into()), StatusCode::BAD_REQUEST),
        ];
        for (err, status) in cases {
            let err = ServerError::from(OrchestratorError::from(err));
            assert_eq!(err.status(), status);
        }
    }

    #[test]
    fn orchestrator_errors_map_to_statuses() {
        let in_progress = ServerError::from(OrchestratorError::RecoveryInProgress("a".into()));
        assert_eq!(in_progress.status(), StatusCode::CONFLICT);
        let missing = ServerError::from(OrchestratorError::AlertNotFound("a".into()));
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        let store = ServerError::from(OrchestratorError::Store("down".into()));
        assert_eq!(store.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn response_carries_error_message() {
        let response = ServerError::NotFound("circuit not found: db".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
