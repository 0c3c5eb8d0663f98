use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;

use crate::execution::ExecutionError;

/// API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ExecutionError> for ApiError {
    fn from(error: ExecutionError) -> Self {
        if error.is_client_error() {
            ApiError::BadRequest(error.to_string())
        } else {
            ApiError::Internal(error.to_string())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }
        (status, Json(ApiResponse::<()>::error(self.to_string()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subprocess::ProcessError;

    #[test]
    fn test_execution_errors_map_to_status() {
        let invalid: ApiError = ExecutionError::invalid("test must not be empty").into();
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let spawn: ApiError = ExecutionError::Spawn {
            command: "k6 run".to_string(),
            source: ProcessError::CommandNotFound("k6".to_string()),
        }
        .into();
        assert_eq!(spawn.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(spawn.to_string().contains("Command not found: k6"));
    }

    #[test]
    fn test_response_envelope_shape() {
        let ok = serde_json::to_value(ApiResponse::success(3)).unwrap();
        assert_eq!(ok, serde_json::json!({"success": true, "data": 3, "error": null}));

        let err = serde_json::to_value(ApiResponse::<()>::error("nope".into())).unwrap();
        assert_eq!(
            err,
            serde_json::json!({"success": false, "data": null, "error": "nope"})
        );
    }
}
