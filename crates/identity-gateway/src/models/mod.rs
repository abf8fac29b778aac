//! Domain models for the identity gateway.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// A reconciled local identity.
///
/// One row per (provider, external subject) pair; the provider's subject
/// identifier is opaque here and never parsed.
#[derive(Clone)]
pub struct Principal {
    /// Local identifier, minted at creation and stable thereafter.
    pub id: Uuid,

    /// Which identity provider asserted this subject.
    pub provider: String,

    /// The provider's subject identifier, opaque to this service.
    pub external_subject: String,

    /// Last email asserted by the provider; empty when never asserted.
    pub email: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Subject identifiers and emails are PII; keep them out of Debug output.
impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Principal")
            .field("id", &self.id)
            .field("provider", &self.provider)
            .field("external_subject", &"[REDACTED]")
            .field("email", &"[REDACTED]")
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Response body for the health endpoint.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}
