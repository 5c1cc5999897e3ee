//! Error types for chirp-service
//!
//! Every failure a handler can produce is an `AppError`; it renders as
//! `{"error": ..., "status": ...}` with the matching HTTP status.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use thiserror::Error;
use validator::ValidationErrors;

use crate::db::StoreError;

/// Result type for chirp-service operations
pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed or missing input
    #[error("{0}")]
    Validation(String),

    #[error("Content exceeds {limit} characters (got {actual})")]
    ContentTooLong { limit: usize, actual: usize },

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// Duplicate resource (follow edge, bookmark, username...)
    #[error("{0}")]
    Conflict(String),

    #[error("You have already voted in this poll")]
    AlreadyVoted,

    #[error("This poll has ended")]
    PollClosed,

    /// A stored row references something that no longer resolves
    #[error("Data integrity error: {0}")]
    Integrity(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::ContentTooLong { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) | AppError::AlreadyVoted | AppError::PollClosed => {
                StatusCode::CONFLICT
            }
            AppError::Integrity(_) | AppError::Database(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        HttpResponse::build(status).json(serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }))
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(what) => AppError::Conflict(what),
            StoreError::NotFound(what) => AppError::NotFound(what),
            StoreError::Database(e) => AppError::Database(e.to_string()),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(msg) => format!("{}: {}", field, msg),
                    None => format!("{}: invalid value", field),
                })
            })
            .collect();
        messages.sort();
        AppError::Validation(messages.join("; "))
    }
}

impl From<crypto_core::AuthError> for AppError {
    fn from(err: crypto_core::AuthError) -> Self {
        use crypto_core::AuthError;
        match err {
            AuthError::InvalidCredentials => {
                AppError::Unauthorized("Invalid email or password".to_string())
            }
            AuthError::WeakPassword => AppError::Validation(err.to_string()),
            AuthError::InvalidToken | AuthError::TokenExpired => {
                AppError::Unauthorized(err.to_string())
            }
            AuthError::Token(msg) | AuthError::Hashing(msg) => AppError::Internal(msg),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::ContentTooLong {
                limit: 144,
                actual: 200
            }
            .status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(AppError::AlreadyVoted.status_code(), StatusCode::CONFLICT);
        assert_eq!(AppError::PollClosed.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::Integrity("dangling author".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::Forbidden("nope".into()).status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_vote_messages() {
        assert_eq!(
            AppError::AlreadyVoted.to_string(),
            "You have already voted in this poll"
        );
        assert_eq!(AppError::PollClosed.to_string(), "This poll has ended");
    }

    #[test]
    fn test_store_error_mapping() {
        let err: AppError = StoreError::Duplicate("Username already taken".into()).into();
        assert!(matches!(err, AppError::Conflict(ref m) if m == "Username already taken"));

        let err: AppError = StoreError::NotFound("Post not found".into()).into();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
