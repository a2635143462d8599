use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use std::path::PathBuf;
use thiserror::Error;

use crate::models::{ErrorResponse, ValidationErrors};

/// Failures raised while invoking a loaded predictor.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("feature schema mismatch: {0}")]
    SchemaMismatch(String),
    #[error("predictor returned no label")]
    EmptyOutput,
    #[error("non-finite value produced: {0}")]
    NonFinite(f64),
    #[error("malformed model: {0}")]
    Malformed(String),
    #[error("onnx runtime: {0}")]
    Runtime(String),
}

/// Everything `POST /predict` can fail with.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid request: {0}")]
    Validation(ValidationErrors),
    #[error("model artifact not found at {}", .path.display())]
    ArtifactNotFound { path: PathBuf },
    #[error("model artifact at {} could not be loaded: {}", .path.display(), .reason)]
    ArtifactCorrupt { path: PathBuf, reason: String },
    #[error("prediction failed: {0}")]
    Prediction(#[from] PredictError),
    #[error("blocking task failed: {0}")]
    Blocking(String),
}

impl ServiceError {
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        ServiceError::ArtifactCorrupt {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(errors: ValidationErrors) -> Self {
        ServiceError::Validation(errors)
    }
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            ServiceError::Validation(errors) => ErrorResponse::validation(errors),
            // Server faults stay opaque to the client; details go to the log.
            _ => ErrorResponse::new("Internal Server Error"),
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}
