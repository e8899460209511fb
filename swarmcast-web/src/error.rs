//! HTTP error mapping

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use swarmcast_core::{SessionError, SwarmcastError};

/// Errors returned by API and streaming handlers, rendered as `{"error": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Timeout(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(error: SessionError) -> Self {
        let error = SwarmcastError::from(error);
        let message = error.user_message();
        let user_error = error.is_user_error();
        match error {
            SwarmcastError::Session(SessionError::NotFound { .. }) => ApiError::NotFound(message),
            SwarmcastError::Session(SessionError::MetadataTimeout { .. }) => {
                ApiError::Timeout(message)
            }
            SwarmcastError::Session(SessionError::Engine(e)) => {
                tracing::error!("Engine failure: {}", e);
                ApiError::Internal(format!("{message}: {e}"))
            }
            _ if user_error => ApiError::BadRequest(message),
            _ => ApiError::Internal(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}", self);
        } else {
            tracing::debug!("Request rejected ({}): {}", status, self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use swarmcast_core::EngineError;

    use super::*;

    #[test]
    fn test_session_errors_map_to_status() {
        let cases = [
            (
                SessionError::NotFound { id: "abc".into() },
                StatusCode::NOT_FOUND,
            ),
            (
                SessionError::MetadataTimeout {
                    timeout: Duration::from_secs(1),
                },
                StatusCode::REQUEST_TIMEOUT,
            ),
            (
                SessionError::InvalidMagnet {
                    reason: "bad".into(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                SessionError::InvalidFileIndex {
                    index: 3,
                    file_count: 1,
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                SessionError::Engine(EngineError::JoinFailed {
                    reason: "no engine".into(),
                }),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(ApiError::from(error).status(), status);
        }
    }
}
