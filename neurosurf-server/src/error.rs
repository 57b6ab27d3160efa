//! Mapping of engine errors onto HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use neurosurf_semantic::SemanticError;
use thiserror::Error;
use tracing::warn;

use crate::protocol::{ErrorBody, ErrorDetail};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Semantic(#[from] SemanticError),

    #[error("{0}")]
    InvalidArgument(String),
}

impl ApiError {
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "invalid_argument"),
            Self::Semantic(e) => match e {
                SemanticError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
                SemanticError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "invalid_argument"),
                SemanticError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
                SemanticError::EmptyIndex => (StatusCode::NOT_FOUND, "empty_index"),
                SemanticError::NoResults => (StatusCode::NOT_FOUND, "no_results"),
                SemanticError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "external_timeout"),
                SemanticError::ExternalCapability { .. } => {
                    (StatusCode::BAD_GATEWAY, "external_capability_error")
                }
                SemanticError::VectorIndex { .. }
                | SemanticError::Storage(_)
                | SemanticError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            warn!(%status, code, error = %self, "request failed");
        }
        let body = ErrorBody { error: ErrorDetail { code: code.to_string(), message: self.to_string() } };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn empty_results_are_not_server_errors() {
        for e in [SemanticError::EmptyIndex, SemanticError::NoResults] {
            let (status, _) = ApiError::from(e).status_and_code();
            assert!(status.is_client_error());
        }
    }

    #[test]
    fn capability_failures_map_to_gateway_statuses() {
        let timeout = SemanticError::Timeout { capability: "embedder".into(), after: Duration::from_secs(1) };
        assert_eq!(ApiError::from(timeout).status_and_code().0, StatusCode::GATEWAY_TIMEOUT);
        let failed = SemanticError::capability("summarizer", "boom");
        assert_eq!(ApiError::from(failed).status_and_code().0, StatusCode::BAD_GATEWAY);
    }
}
