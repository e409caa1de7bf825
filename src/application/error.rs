//! Application-level error taxonomy.
//!
//! Transient per-unit failures never surface here; they are counted inside
//! the owning operation. `AppError` covers the structured failures the
//! operation surface must be able to map to a status code.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::application::repos::RepoError;
use crate::domain::error::DomainError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("resource not found")]
    NotFound,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("insufficient credits")]
    InsufficientCredits,
    #[error("an optimization batch is already active for this connection")]
    BatchAlreadyActive,
    #[error("rollback window has expired")]
    RollbackExpired,
    #[error("fix is not in a revertible state")]
    NotRevertible,
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Stable machine-readable code for the external HTTP/UI layer.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Domain(DomainError::NotFound { .. }) | AppError::NotFound => "NOT_FOUND",
            AppError::Repo(RepoError::NotFound) => "NOT_FOUND",
            AppError::Domain(DomainError::Validation { .. }) | AppError::Validation(_) => {
                "VALIDATION_FAILED"
            }
            AppError::Repo(RepoError::InvalidInput { .. }) => "VALIDATION_FAILED",
            AppError::InsufficientCredits => "INSUFFICIENT_CREDITS",
            AppError::BatchAlreadyActive => "BATCH_ALREADY_ACTIVE",
            AppError::RollbackExpired => "ROLLBACK_EXPIRED",
            AppError::NotRevertible => "NOT_REVERTIBLE",
            AppError::Repo(_) => "STORAGE_UNAVAILABLE",
            AppError::Domain(DomainError::Invariant { .. }) | AppError::Unexpected(_) => {
                "INTERNAL"
            }
        }
    }

    fn status_code(&self) -> StatusCode {
        match self.code() {
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_FAILED" => StatusCode::BAD_REQUEST,
            "INSUFFICIENT_CREDITS" => StatusCode::PAYMENT_REQUIRED,
            "BATCH_ALREADY_ACTIVE" => StatusCode::CONFLICT,
            "ROLLBACK_EXPIRED" | "NOT_REVERTIBLE" => StatusCode::CONFLICT,
            "STORAGE_UNAVAILABLE" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            error: self.code(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_map_to_expected_statuses() {
        assert_eq!(AppError::NotFound.code(), "NOT_FOUND");
        assert_eq!(AppError::InsufficientCredits.code(), "INSUFFICIENT_CREDITS");
        assert_eq!(AppError::BatchAlreadyActive.code(), "BATCH_ALREADY_ACTIVE");
        assert_eq!(
            AppError::Repo(RepoError::Persistence("down".into())).code(),
            "STORAGE_UNAVAILABLE"
        );
        assert_eq!(AppError::InsufficientCredits.status_code(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(AppError::BatchAlreadyActive.status_code(), StatusCode::CONFLICT);
    }
}
