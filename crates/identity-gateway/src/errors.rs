//! Identity Gateway error types.
//!
//! All errors map to appropriate HTTP status codes via the `IntoResponse`
//! impl. Error messages returned to clients are intentionally generic so no
//! claim or key detail leaks. Actual causes are logged server-side.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::auth::AuthError;

/// Identity Gateway error type.
///
/// Maps to HTTP status codes:
/// - Database, Internal: 500 Internal Server Error
/// - InvalidToken: 401 Unauthorized
/// - ServiceUnavailable: 503 Service Unavailable
#[derive(Debug, Error)]
pub enum IgError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal server error")]
    Internal,
}

impl IgError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            IgError::Database(_) | IgError::Internal => 500,
            IgError::InvalidToken(_) => 401,
            IgError::ServiceUnavailable(_) => 503,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for IgError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            IgError::Database(err) => {
                // Log actual error server-side, return generic message to client
                tracing::error!(target: "idg.database", error = %err, "Database operation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "An internal database error occurred".to_string(),
                )
            }
            IgError::InvalidToken(reason) => {
                (StatusCode::UNAUTHORIZED, "INVALID_TOKEN", reason.clone())
            }
            IgError::ServiceUnavailable(reason) => {
                // Log actual reason server-side
                tracing::warn!(target: "idg.availability", reason = %reason, "Service unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Service temporarily unavailable".to_string(),
                )
            }
            IgError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        let mut response = (status, Json(error_response)).into_response();

        // Add WWW-Authenticate header for 401 responses
        if status == StatusCode::UNAUTHORIZED {
            if let Ok(header_value) =
                "Bearer realm=\"lectern-api\", error=\"invalid_token\"".parse()
            {
                response
                    .headers_mut()
                    .insert("WWW-Authenticate", header_value);
            }
        }

        response
    }
}

/// Convert sqlx errors to IgError
impl From<sqlx::Error> for IgError {
    fn from(err: sqlx::Error) -> Self {
        IgError::Database(err.to_string())
    }
}

/// Collapse the authentication taxonomy into its user-visible outcome.
///
/// Every rejection kind surfaces as the same generic 401 except a key-source
/// outage, which is a transient dependency failure the caller may retry.
/// The specific kind is logged where the failure occurred.
impl From<AuthError> for IgError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::KeySourceUnavailable(_) => {
                IgError::ServiceUnavailable("Authentication service unavailable".to_string())
            }
            _ => IgError::InvalidToken("The access token is invalid or expired".to_string()),
        }
    }
}
