//! Bearer token authentication middleware.
//!
//! Requests without an `Authorization` header pass through tagged as
//! anonymous; whether anonymity is acceptable is a per-route decision
//! made by the handlers. Requests that do present credentials must
//! present valid ones - a bad token is rejected here, never downgraded
//! to anonymous.

use crate::errors::IgError;
use crate::models::Principal;
use crate::routes::AppState;
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use std::fmt;
use std::sync::Arc;

/// The authentication outcome attached to every request.
#[derive(Clone)]
pub enum AuthContext {
    /// No credentials were presented.
    Anonymous,

    /// Credentials were presented and verified.
    Authenticated(CurrentUser),
}

/// The verified caller for this request.
#[derive(Clone)]
pub struct CurrentUser {
    pub principal: Principal,

    /// The raw bearer token, kept for pass-through to upstream calls.
    pub token: String,
}

// The raw token is a credential; never let it reach logs via Debug.
impl fmt::Debug for CurrentUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CurrentUser")
            .field("principal", &self.principal)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Authenticate the request's bearer token, if one is present.
///
/// # Errors
///
/// Returns 401 for malformed headers and failed verification, 503 when
/// the signing key source is unreachable.
pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, IgError> {
    let Some(header) = request.headers().get(AUTHORIZATION) else {
        request.extensions_mut().insert(AuthContext::Anonymous);
        return Ok(next.run(request).await);
    };

    let header = header
        .to_str()
        .map_err(|_| IgError::InvalidToken("Invalid Authorization header format".to_string()))?;

    let token = header
        .strip_prefix("Bearer ")
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            IgError::InvalidToken("Invalid Authorization header format".to_string())
        })?
        .to_string();

    let claims = state.authenticator.authenticate(&token).await.map_err(|e| {
        tracing::debug!(
            target: "idg.middleware.auth",
            kind = e.kind(),
            "Token authentication failed"
        );
        IgError::from(e)
    })?;

    let principal = state.reconciler.reconcile(&claims).await?;

    request.extensions_mut().insert(AuthContext::Authenticated(CurrentUser {
        principal,
        token,
    }));

    Ok(next.run(request).await)
}
