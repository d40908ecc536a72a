use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Publish attempted while one or more required fields are absent.
    /// Carries the names of every missing field so the admin sees the
    /// full list, not a generic failure.
    #[error("Publish precondition failed: missing {}", .missing.join(", "))]
    PreconditionFailed { missing: Vec<&'static str> },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    /// A single recipient's mail delivery failed. Recorded per recipient
    /// by the dispatcher; never aborts a batch.
    #[error("Mail transport error: {0}")]
    Transport(String),

    /// Media storage cannot be reached. Transient: the caller is told to
    /// retry rather than treated as fatally broken.
    #[error("Media storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    missing_fields: Option<Vec<&'static str>>,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::PreconditionFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::Token(_) => StatusCode::UNAUTHORIZED,
            AppError::Transport(_) => StatusCode::BAD_GATEWAY,
            AppError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();
        let error_type = match self {
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::PreconditionFailed { .. } => "PUBLISH_PRECONDITION_FAILED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Authentication(_) => "AUTHENTICATION_ERROR",
            AppError::Token(_) => "TOKEN_ERROR",
            AppError::Transport(_) => "MAIL_TRANSPORT_ERROR",
            AppError::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            AppError::Internal(_) => "INTERNAL_ERROR",
        };

        let missing_fields = match self {
            AppError::PreconditionFailed { missing } => Some(missing.clone()),
            _ => None,
        };

        HttpResponse::build(status_code).json(ErrorResponse {
            error: error_type.to_string(),
            message: self.to_string(),
            missing_fields,
        })
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precondition_error_names_every_missing_field() {
        let err = AppError::PreconditionFailed {
            missing: vec!["title", "media", "tags"],
        };
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            err.to_string(),
            "Publish precondition failed: missing title, media, tags"
        );
    }

    #[test]
    fn status_codes_match_error_classes() {
        assert_eq!(
            AppError::Validation("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::NotFound("post".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::StorageUnavailable("s3 down".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::Authentication("bad password".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
    }
}
