//! Error taxonomy for the identity core.
//!
//! Every component-internal failure is re-raised as one of these kinds
//! before it crosses the HTTP boundary; callers never see raw SQLite
//! error codes. The boundary mapping to status codes lives in the
//! `IntoResponse` impl.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Request-terminal error kinds surfaced by the identity core.
#[derive(Debug)]
pub enum CoreError {
    /// No token, bad token, expired token, or bad credentials.
    Unauthenticated(String),
    /// A valid token whose identity key no longer resolves.
    AccountNotFound,
    /// The identity exists but its active flag is off.
    AccountDeactivated,
    /// Role or ownership check failed.
    Forbidden,
    /// Email (or generated identifier) already taken.
    DuplicateIdentity,
    /// Role outside the accepted set.
    InvalidRole(String),
    /// Missing or malformed role-specific fields.
    ValidationFailed(String),
    /// Pool timeout, busy database, or another retryable storage fault.
    TransientStorage(String),
    /// Missing startup configuration. Fatal before the core goes live.
    Configuration(String),
    /// Unexpected storage or hashing fault. Not retryable.
    Internal(String),
}

impl std::fmt::Display for CoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoreError::Unauthenticated(msg) => write!(f, "{}", msg),
            CoreError::AccountNotFound => write!(f, "Account not found"),
            CoreError::AccountDeactivated => write!(f, "Account is deactivated"),
            CoreError::Forbidden => write!(f, "Not authorized to access this resource"),
            CoreError::DuplicateIdentity => {
                write!(f, "Duplicate entry. This record already exists.")
            }
            CoreError::InvalidRole(msg) => write!(f, "{}", msg),
            CoreError::ValidationFailed(msg) => write!(f, "{}", msg),
            CoreError::TransientStorage(msg) => write!(f, "Storage temporarily unavailable: {}", msg),
            CoreError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            CoreError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for CoreError {}

impl CoreError {
    pub fn status(&self) -> StatusCode {
        match self {
            CoreError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            CoreError::AccountNotFound => StatusCode::NOT_FOUND,
            CoreError::AccountDeactivated => StatusCode::UNAUTHORIZED,
            CoreError::Forbidden => StatusCode::FORBIDDEN,
            CoreError::DuplicateIdentity => StatusCode::BAD_REQUEST,
            CoreError::InvalidRole(_) => StatusCode::BAD_REQUEST,
            CoreError::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            CoreError::TransientStorage(_) => StatusCode::SERVICE_UNAVAILABLE,
            CoreError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether a bounded retry is worth attempting (identifier allocation
    /// under write contention is the one hot spot).
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::TransientStorage(_))
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Internal details stay in the logs, not in the response body.
        let message = match &self {
            CoreError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error surfaced to boundary");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "success": false,
            "error": message,
        }));

        (status, body).into_response()
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _) => match code.code {
                rusqlite::ErrorCode::ConstraintViolation => CoreError::DuplicateIdentity,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                    CoreError::TransientStorage(err.to_string())
                }
                _ => CoreError::Internal(err.to_string()),
            },
            _ => CoreError::Internal(err.to_string()),
        }
    }
}

impl From<r2d2::Error> for CoreError {
    fn from(err: r2d2::Error) -> Self {
        // r2d2 surfaces acquisition timeouts here; that is the pool
        // applying backpressure, so classify as retryable.
        CoreError::TransientStorage(format!("connection pool: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            CoreError::Unauthenticated("no token".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(CoreError::AccountNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            CoreError::AccountDeactivated.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(CoreError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(CoreError::DuplicateIdentity.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            CoreError::ValidationFailed("missing course".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            CoreError::TransientStorage("busy".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_constraint_violation_maps_to_duplicate() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
            Some("UNIQUE constraint failed: users.email".to_string()),
        );
        match CoreError::from(err) {
            CoreError::DuplicateIdentity => {}
            other => panic!("expected DuplicateIdentity, got {:?}", other),
        }
    }

    #[test]
    fn test_busy_maps_to_transient() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        let core = CoreError::from(err);
        assert!(core.is_transient());
    }

    #[test]
    fn test_internal_response_hides_details() {
        let resp = CoreError::Internal("users table missing".into()).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
