use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::error::NodeError;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<NodeError> for GatewayError {
    fn from(e: NodeError) -> Self {
        match e {
            NodeError::NotFound(what) => GatewayError::NotFound(what),
            NodeError::Unauthorized => GatewayError::Unauthorized,
            err @ (NodeError::DecryptionFailed | NodeError::Protocol(_) | NodeError::InvalidInput(_)) => {
                GatewayError::BadRequest(err.to_string())
            }
            other => GatewayError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            GatewayError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            GatewayError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            GatewayError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            GatewayError::Internal(e) => {
                tracing::error!(error = %e, "Gateway request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
