//! Error types for the Drive server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::repository::Permission;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Result type for repository and drive operations
pub type DriveResult<T> = std::result::Result<T, DriveError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Drive error: {0}")]
    Drive(#[from] DriveError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Repository, security and synchronization errors
#[derive(Error, Debug)]
pub enum DriveError {
    /// More audit entries matched than the caller allowed. The caller has
    /// to fall back to a full resynchronization.
    #[error("Too many document changes: more than {limit} since last synchronization")]
    TooManyChanges { limit: usize },

    #[error("Permission denied: {principal} lacks {permission} on {document}")]
    Security {
        principal: String,
        permission: Permission,
        document: String,
    },

    #[error("Document type {0} cannot be synchronized")]
    Blacklisted(String),

    #[error("Document is not folderish: {0}")]
    NotFolderish(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Change limit that cannot be expressed as a query bound
    #[error("Invalid change limit: {0}")]
    InvalidLimit(usize),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
            AppError::Drive(e) => match e {
                DriveError::Security { .. } => {
                    tracing::warn!("{}", e);
                    (StatusCode::FORBIDDEN, "access_denied", e.to_string())
                }
                DriveError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", e.to_string()),
                DriveError::Blacklisted(_)
                | DriveError::NotFolderish(_)
                | DriveError::InvalidPath(_) => {
                    (StatusCode::BAD_REQUEST, "bad_request", e.to_string())
                }
                DriveError::Conflict(_) => (StatusCode::CONFLICT, "conflict", e.to_string()),
                DriveError::TooManyChanges { .. } => {
                    (StatusCode::CONFLICT, "too_many_changes", e.to_string())
                }
                DriveError::InvalidLimit(_) => {
                    tracing::error!("{}", e);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "internal_error",
                        "An internal error occurred".to_string(),
                    )
                }
                DriveError::Database(db) => {
                    tracing::error!("Database error: {}", db);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "database_error",
                        "Database error".to_string(),
                    )
                }
            },
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database_error",
                    "Database error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
            details: if cfg!(debug_assertions) {
                Some(self.to_string())
            } else {
                None
            },
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_error_maps_to_forbidden() {
        let err = AppError::from(DriveError::Security {
            principal: "jdoe".to_string(),
            permission: Permission::Write,
            document: "/workspace".to_string(),
        });
        assert_eq!(err.into_response().status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_blacklisted_maps_to_bad_request() {
        let err = AppError::from(DriveError::Blacklisted("UserProfile".to_string()));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_too_many_changes_message() {
        let err = DriveError::TooManyChanges { limit: 10 };
        assert!(err.to_string().contains("more than 10"));
    }
}
