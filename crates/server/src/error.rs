use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use services::services::{
    evaluation::{EvaluationError, ValidationError},
    upload::UploadError,
};
use thiserror::Error;
use utils::response::ApiResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error("Multipart error: {0}")]
    Multipart(#[from] MultipartError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status_code, error_type) = match &self {
            ApiError::Evaluation(EvaluationError::Validation(ValidationError::Upload(
                UploadError::TooLarge { .. },
            ))) => (StatusCode::PAYLOAD_TOO_LARGE, "ValidationError"),
            ApiError::Evaluation(EvaluationError::Validation(_)) => {
                (StatusCode::BAD_REQUEST, "ValidationError")
            }
            ApiError::Evaluation(EvaluationError::Configuration(_)) => {
                (StatusCode::BAD_REQUEST, "ConfigurationError")
            }
            ApiError::Evaluation(EvaluationError::Io(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "IoError")
            }
            ApiError::Multipart(e) => (e.status(), "MultipartError"),
        };

        let error_message = match &self {
            ApiError::Evaluation(
                EvaluationError::Validation(_) | EvaluationError::Configuration(_),
            ) => self.to_string(),
            ApiError::Multipart(_) if status_code == StatusCode::PAYLOAD_TOO_LARGE => {
                "The upload is too large. Please send fewer or smaller files.".to_string()
            }
            ApiError::Multipart(_) => {
                "Failed to upload file. Please ensure the file is valid and try again.".to_string()
            }
            _ => format!("{}: {}", error_type, self),
        };

        if status_code.is_server_error() {
            tracing::error!("{}: {}", error_type, self);
        } else {
            tracing::warn!("Rejected request ({}): {}", error_type, self);
        }

        let response = ApiResponse::<()>::error(&error_message);
        (status_code, Json(response)).into_response()
    }
}
