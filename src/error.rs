use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Failed to read PDF: {0}")]
    Decode(String),
    #[error("Unable to fetch metadata, please fill manually")]
    ExtractionEmpty,
    #[error("Speech synthesis unavailable: {0}")]
    Synthesis(String),
    #[error("No document loaded. Please upload a document first.")]
    ContextMissing,
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("AI service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("Failed to fetch metadata: {0}")]
    Lookup(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("Upload exceeds the size limit")]
    PayloadTooLarge,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Decode(_) | AppError::BadRequest(_) | AppError::ContextMissing => {
                StatusCode::BAD_REQUEST
            }
            // The caller is expected to fall back to manual entry.
            AppError::ExtractionEmpty => StatusCode::OK,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Synthesis(_) | AppError::Lookup(_) => StatusCode::BAD_GATEWAY,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Configuration(_) | AppError::Io(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("{}", self);
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
