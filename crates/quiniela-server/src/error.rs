use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use quiniela_store::{ErrorKind, StoreError};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        match err.kind() {
            ErrorKind::NotFound => ServerError::NotFound(err.to_string()),
            ErrorKind::Hidden => ServerError::Forbidden(err.to_string()),
            ErrorKind::Unexpected => ServerError::Internal(err.to_string()),
            ErrorKind::AlreadyExists
            | ErrorKind::InsufficientTickets
            | ErrorKind::AlreadyParticipated
            | ErrorKind::AlreadySubmitted
            | ErrorKind::NotParticipating
            | ErrorKind::EventNotCurrent
            | ErrorKind::MatchNotInEvent
            | ErrorKind::InvalidOutcome
            | ErrorKind::InvalidInput => ServerError::BadRequest(err.to_string()),
        }
    }
}

// Malformed bodies and query strings get the same JSON error shape as
// validation failures.
impl From<JsonRejection> for ServerError {
    fn from(rejection: JsonRejection) -> Self {
        ServerError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ServerError {
    fn from(rejection: QueryRejection) -> Self {
        ServerError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::Forbidden(_) => (StatusCode::FORBIDDEN, self.to_string()),
            ServerError::Internal(detail) => {
                tracing::error!(error = %detail, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
