//! PostgreSQL-backed principal store.

use crate::errors::IgError;
use crate::models::Principal;
use crate::repositories::PrincipalStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// Row shape returned by principal queries.
#[derive(sqlx::FromRow)]
struct PrincipalRow {
    id: Uuid,
    provider: String,
    external_subject: String,
    email: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PrincipalRow> for Principal {
    fn from(row: PrincipalRow) -> Self {
        Self {
            id: row.id,
            provider: row.provider,
            external_subject: row.external_subject,
            email: row.email,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Production store backed by the `principals` table.
pub struct PgPrincipalStore {
    pool: PgPool,
}

impl PgPrincipalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PrincipalStore for PgPrincipalStore {
    async fn find(
        &self,
        provider: &str,
        external_subject: &str,
    ) -> Result<Option<Principal>, IgError> {
        let row = sqlx::query_as::<_, PrincipalRow>(
            r"
            SELECT id, provider, external_subject, email, created_at, updated_at
            FROM principals
            WHERE provider = $1 AND external_subject = $2
            ",
        )
        .bind(provider)
        .bind(external_subject)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Principal::from))
    }

    async fn insert_if_absent(
        &self,
        provider: &str,
        external_subject: &str,
        email: &str,
    ) -> Result<Option<Principal>, IgError> {
        // ON CONFLICT DO NOTHING makes racing creates idempotent: exactly
        // one writer gets a row back, every other sees None and re-reads.
        let row = sqlx::query_as::<_, PrincipalRow>(
            r"
            INSERT INTO principals (id, provider, external_subject, email)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (provider, external_subject) DO NOTHING
            RETURNING id, provider, external_subject, email, created_at, updated_at
            ",
        )
        .bind(Uuid::new_v4())
        .bind(provider)
        .bind(external_subject)
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Principal::from))
    }

    async fn update_email(&self, id: Uuid, email: &str) -> Result<Option<Principal>, IgError> {
        let row = sqlx::query_as::<_, PrincipalRow>(
            r"
            UPDATE principals
            SET email = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, provider, external_subject, email, created_at, updated_at
            ",
        )
        .bind(id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Principal::from))
    }

    async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}
