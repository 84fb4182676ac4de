//! HTTP error mapping for the match API.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// An error response carried to the client as `{"detail": ...}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<vismatch_core::Error> for ApiError {
    fn from(err: vismatch_core::Error) -> Self {
        match err {
            // Client-input problems: reject the request.
            vismatch_core::Error::DegenerateEmbedding | vismatch_core::Error::Embedding(_) => {
                Self::bad_request(err.to_string())
            }
            // Anything else reaching a handler is a server-side fault.
            _ => Self::internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, message = %self.message, "request failed");
        } else {
            tracing::debug!(status = %self.status, message = %self.message, "request rejected");
        }
        (
            self.status,
            Json(serde_json::json!({ "detail": self.message })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degenerate_query_maps_to_bad_request() {
        let err = ApiError::from(vismatch_core::Error::DegenerateEmbedding);
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_encoder_failure_maps_to_bad_request() {
        let err = ApiError::from(vismatch_core::Error::Embedding("bad image".to_string()));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_config_error_maps_to_internal() {
        let err = ApiError::from(vismatch_core::Error::Config("broken".to_string()));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
