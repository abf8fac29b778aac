//! Data access layer.
//!
//! The store is a trait so handlers and the reconciler can be exercised
//! against an in-memory implementation in integration tests; production
//! wires in the PostgreSQL implementation.

pub mod principals;

pub use principals::PgPrincipalStore;

use crate::errors::IgError;
use crate::models::Principal;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Persistence operations for principals.
#[async_trait]
pub trait PrincipalStore: Send + Sync {
    /// Look up a principal by its provider-scoped subject.
    async fn find(
        &self,
        provider: &str,
        external_subject: &str,
    ) -> Result<Option<Principal>, IgError>;

    /// Insert a new principal unless the (provider, subject) pair already
    /// exists. Returns `None` when another writer got there first; the
    /// caller re-reads in that case.
    async fn insert_if_absent(
        &self,
        provider: &str,
        external_subject: &str,
        email: &str,
    ) -> Result<Option<Principal>, IgError>;

    /// Overwrite a principal's email. Returns the updated row, or `None`
    /// when the principal no longer exists.
    async fn update_email(&self, id: Uuid, email: &str) -> Result<Option<Principal>, IgError>;

    /// Liveness probe for the backing store.
    async fn ping(&self) -> bool;
}

/// In-memory store used by integration tests.
#[derive(Default)]
pub struct InMemoryPrincipalStore {
    inner: Mutex<HashMap<(String, String), Principal>>,
}

impl InMemoryPrincipalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored principals.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}

#[async_trait]
impl PrincipalStore for InMemoryPrincipalStore {
    async fn find(
        &self,
        provider: &str,
        external_subject: &str,
    ) -> Result<Option<Principal>, IgError> {
        let map = self.inner.lock().await;
        Ok(map
            .get(&(provider.to_string(), external_subject.to_string()))
            .cloned())
    }

    async fn insert_if_absent(
        &self,
        provider: &str,
        external_subject: &str,
        email: &str,
    ) -> Result<Option<Principal>, IgError> {
        let mut map = self.inner.lock().await;
        let key = (provider.to_string(), external_subject.to_string());
        if map.contains_key(&key) {
            return Ok(None);
        }

        let now = Utc::now();
        let principal = Principal {
            id: Uuid::new_v4(),
            provider: provider.to_string(),
            external_subject: external_subject.to_string(),
            email: email.to_string(),
            created_at: now,
            updated_at: now,
        };
        map.insert(key, principal.clone());
        Ok(Some(principal))
    }

    async fn update_email(&self, id: Uuid, email: &str) -> Result<Option<Principal>, IgError> {
        let mut map = self.inner.lock().await;
        for principal in map.values_mut() {
            if principal.id == id {
                principal.email = email.to_string();
                principal.updated_at = Utc::now();
                return Ok(Some(principal.clone()));
            }
        }
        Ok(None)
    }

    async fn ping(&self) -> bool {
        true
    }
}
