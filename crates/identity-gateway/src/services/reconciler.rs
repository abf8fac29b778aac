//! Identity reconciliation.
//!
//! Maps verified token claims to a local principal, creating the row on
//! first sight and keeping the stored email in step with what the
//! provider asserts. Subjects are scoped per provider: the same subject
//! string under two providers is two distinct principals, and no linking
//! across providers is attempted.

use crate::auth::{AuthError, VerifiedClaims};
use crate::errors::IgError;
use crate::models::Principal;
use crate::repositories::PrincipalStore;
use std::sync::Arc;
use tracing::instrument;

/// Reconciles verified claims into local principals.
#[derive(Clone)]
pub struct IdentityReconciler {
    store: Arc<dyn PrincipalStore>,
}

impl IdentityReconciler {
    pub fn new(store: Arc<dyn PrincipalStore>) -> Self {
        Self { store }
    }

    /// Find or create the principal for a verified token.
    ///
    /// Concurrent first requests for the same subject converge on one
    /// row: the insert is conflict-tolerant and a loser re-reads the
    /// winner's row.
    ///
    /// # Errors
    ///
    /// Returns [`IgError::Database`] on store failures, or the internal
    /// conflict error if the subject can neither be found nor created.
    #[instrument(skip_all, fields(provider = %claims.provider))]
    pub async fn reconcile(&self, claims: &VerifiedClaims) -> Result<Principal, IgError> {
        // An absent email claim is stored as empty, and a provider that
        // stops asserting an email clears the stored value.
        let email = claims.email.as_deref().unwrap_or("");

        if let Some(principal) = self.store.find(&claims.provider, &claims.subject).await? {
            return self.sync_email(principal, email).await;
        }

        if let Some(principal) = self
            .store
            .insert_if_absent(&claims.provider, &claims.subject, email)
            .await?
        {
            tracing::info!(
                target: "idg.services.reconciler",
                principal_id = %principal.id,
                provider = %principal.provider,
                "New principal created"
            );
            return Ok(principal);
        }

        // Lost a creation race; the winner's row must exist now.
        if let Some(principal) = self.store.find(&claims.provider, &claims.subject).await? {
            return self.sync_email(principal, email).await;
        }

        tracing::error!(
            target: "idg.services.reconciler",
            provider = %claims.provider,
            "Principal neither found nor created after conflict"
        );
        Err(AuthError::IdentityConflict.into())
    }

    async fn sync_email(&self, principal: Principal, email: &str) -> Result<Principal, IgError> {
        if principal.email == email {
            return Ok(principal);
        }

        tracing::debug!(
            target: "idg.services.reconciler",
            principal_id = %principal.id,
            "Updating principal email from token claims"
        );

        match self.store.update_email(principal.id, email).await? {
            Some(updated) => Ok(updated),
            // Row vanished between read and update; serve the stale copy.
            None => Ok(principal),
        }
    }
}
