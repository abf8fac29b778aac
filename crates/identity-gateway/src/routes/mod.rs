//! HTTP routes for the Identity Gateway.
//!
//! Defines the Axum router and application state.

use crate::auth::TokenAuthenticator;
use crate::config::Config;
use crate::handlers;
use crate::middleware::authenticate;
use crate::repositories::PrincipalStore;
use crate::services::IdentityReconciler;
use axum::{routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Principal persistence.
    pub store: Arc<dyn PrincipalStore>,

    /// Token verification for all configured providers.
    pub authenticator: Arc<TokenAuthenticator>,

    /// Claims-to-principal reconciliation.
    pub reconciler: IdentityReconciler,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn PrincipalStore>,
        authenticator: Arc<TokenAuthenticator>,
    ) -> Self {
        let reconciler = IdentityReconciler::new(store.clone());
        Self {
            config,
            store,
            authenticator,
            reconciler,
        }
    }
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/v1/health` - Health check endpoint (store ping), outside auth
/// - `/v1/me` - Current principal, behind the auth middleware
/// - TraceLayer for request logging
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>) -> Router {
    // Routes that pass through bearer authentication
    let authenticated_routes = Router::new()
        .route("/v1/me", get(handlers::get_me))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            authenticate,
        ));

    // Public routes (no authentication required)
    let public_routes = Router::new().route("/v1/health", get(handlers::health_check));

    // Apply global middleware layers
    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    public_routes
        .merge(authenticated_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .with_state(state)
}
