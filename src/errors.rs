use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GradingError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("invalid state: {0}")]
    State(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("not eligible: {0}")]
    Eligibility(String),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type GradingResult<T> = Result<T, GradingError>;

impl GradingError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(context.to_string())
    }

    pub fn not_found(what: &str, id: &str) -> Self {
        Self::NotFound(format!("{what} {id} not found"))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            GradingError::Validation(_)
            | GradingError::State(_)
            | GradingError::Eligibility(_) => StatusCode::UNPROCESSABLE_ENTITY,
            GradingError::NotFound(_) => StatusCode::NOT_FOUND,
            GradingError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn detail(&self) -> String {
        match self {
            GradingError::Validation(message)
            | GradingError::State(message)
            | GradingError::NotFound(message)
            | GradingError::Eligibility(message)
            | GradingError::Internal(message) => message.clone(),
        }
    }
}

impl From<validator::ValidationErrors> for GradingError {
    fn from(errors: validator::ValidationErrors) -> Self {
        GradingError::Validation(errors.to_string())
    }
}

impl IntoResponse for GradingError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Internal grading error");
        }
        (status, Json(ErrorResponse { status: status.as_u16(), detail: self.detail() }))
            .into_response()
    }
}
