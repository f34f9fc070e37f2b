use axum::{Json, http::StatusCode, response::{IntoResponse, Response}};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use crate::models::RegistrationStatus;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Not found")]
    NotFound,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Missing account identity")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// User-correctable problems with a course selection, always complete.
    #[error("Registration is not valid: {}", .errors.join("; "))]
    Validation {
        errors: Vec<String>,
        warnings: Vec<String>,
    },

    /// The commit-time capacity re-check failed after the selection had validated.
    #[error("{course_code} is full; registration {registration_id} can no longer be approved")]
    CapacityRace {
        registration_id: String,
        course_code: String,
    },

    #[error("Cannot move registration from {from} to {to}")]
    InvalidTransition {
        from: RegistrationStatus,
        to: RegistrationStatus,
    },

    #[error("Administrative override is not implemented")]
    OverrideUnsupported,

    #[error("Invalid stored record: {0}")]
    InvalidRecord(String),

    #[error("Internal server error")]
    InternalServerError,
}

impl AppError {
    /// Storage failures worth retrying: SQLite busy/locked, pool exhaustion, I/O.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Database(sqlx::Error::PoolTimedOut) | AppError::Database(sqlx::Error::Io(_)) => {
                true
            }
            AppError::Database(sqlx::Error::Database(db)) => db
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .map(|code| matches!(code & 0xff, 5 | 6))
                .unwrap_or(false),
            _ => false,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let (status, error_message) = match self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not Found".to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Missing x-account-id header".to_string(),
            ),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Validation {
                errors: found,
                warnings: advisories,
            } => {
                errors = found;
                warnings = advisories;
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "Registration failed validation".to_string(),
                )
            }
            e @ AppError::CapacityRace { .. } => {
                warn!("{}", e);
                (StatusCode::CONFLICT, e.to_string())
            }
            e @ (AppError::InvalidTransition { .. } | AppError::OverrideUnsupported) => {
                (StatusCode::CONFLICT, e.to_string())
            }
            e @ AppError::Database(_) if e.is_transient() => {
                warn!("transient database error: {}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Database is busy, try again".to_string(),
                )
            }
            AppError::Database(e) => {
                error!("database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error occurred".to_string(),
                )
            }
            e @ (AppError::Migration(_) | AppError::InvalidRecord(_)) => {
                error!("{}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::InternalServerError => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = Json(ErrorResponse {
            error: status.to_string(),
            message: error_message,
            errors,
            warnings,
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_storage_errors_are_transient() {
        assert!(AppError::Database(sqlx::Error::PoolTimedOut).is_transient());
        assert!(!AppError::Database(sqlx::Error::RowNotFound).is_transient());
        assert!(!AppError::Conflict("x".to_string()).is_transient());
        assert!(
            !AppError::CapacityRace {
                registration_id: "r".to_string(),
                course_code: "CS101".to_string(),
            }
            .is_transient()
        );
    }

    #[test]
    fn test_validation_response_carries_full_lists() {
        let response = AppError::Validation {
            errors: vec!["a".to_string(), "b".to_string()],
            warnings: vec!["w".to_string()],
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::Unauthorized.into_response().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::InvalidTransition {
                from: RegistrationStatus::Approved,
                to: RegistrationStatus::Rejected,
            }
            .into_response()
            .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Database(sqlx::Error::PoolTimedOut).into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
