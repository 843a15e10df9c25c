//! API error type and its HTTP mapping
//!
//! Error bodies are `{"detail": "<message>"}`.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crop_disease::utils::{CropDiseaseError, DecodeError, ShapeMismatchError};

use crate::fetch::FetchError;

#[derive(Error, Debug)]
pub enum ApiError {
    /// Request body is not the expected JSON
    #[error("{0}")]
    Request(#[from] JsonRejection),

    #[error("Image fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Image decode failed: {0}")]
    Decode(DecodeError),

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(ShapeMismatchError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Request(rejection) => rejection.status(),
            ApiError::Fetch(_) => StatusCode::BAD_REQUEST,
            ApiError::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::ShapeMismatch(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<CropDiseaseError> for ApiError {
    fn from(err: CropDiseaseError) -> Self {
        match err {
            CropDiseaseError::Decode(e) => ApiError::Decode(e),
            CropDiseaseError::ShapeMismatch(e) => ApiError::ShapeMismatch(e),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{}", self);
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_errors_map_to_statuses() {
        let decode = image::load_from_memory(b"garbage").unwrap_err();
        let err: ApiError = CropDiseaseError::Decode(DecodeError::from(decode)).into();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(err.to_string().starts_with("Image decode failed: "));

        let err: ApiError = CropDiseaseError::ShapeMismatch(ShapeMismatchError {
            expected: 2,
            actual: 3,
        })
        .into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let err: ApiError = CropDiseaseError::Inference("bad output".to_string()).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
