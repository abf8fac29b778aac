//! Current-caller endpoint.

use crate::errors::IgError;
use crate::middleware::AuthContext;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Response body for GET /v1/me.
///
/// Deliberately excludes the external subject identifier; the local id
/// is the only identifier callers should hold.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: Uuid,
    pub provider: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// GET /v1/me
///
/// Returns the reconciled principal for the presented token.
///
/// # Errors
///
/// Returns 401 when the request carried no credentials.
pub async fn get_me(Extension(ctx): Extension<AuthContext>) -> Result<Json<MeResponse>, IgError> {
    match ctx {
        AuthContext::Anonymous => {
            Err(IgError::InvalidToken("Missing credentials".to_string()))
        }
        AuthContext::Authenticated(user) => Ok(Json(MeResponse {
            id: user.principal.id,
            provider: user.principal.provider,
            email: user.principal.email,
            created_at: user.principal.created_at,
            updated_at: user.principal.updated_at,
        })),
    }
}
