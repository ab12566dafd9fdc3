//! Postgres-backed QuickBooks credential store.
//!
//! One row per location in `quickbooks_tokens`. Connect and refresh both
//! upsert on the `location` primary key, so a refresh replaces the stored
//! credential in a single statement.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::instrument;

use amy_core::LocationTag;
use amy_quickbooks::{Credential, CredentialStore, CredentialStoreError};

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS quickbooks_tokens (
        location                 TEXT PRIMARY KEY,
        realm_id                 TEXT NOT NULL,
        access_token             TEXT NOT NULL,
        refresh_token            TEXT NOT NULL,
        expires_at               TIMESTAMPTZ NOT NULL,
        refresh_token_expires_at TIMESTAMPTZ,
        updated_at               TIMESTAMPTZ NOT NULL DEFAULT now()
    )
"#;

#[derive(Debug, Clone)]
pub struct PostgresCredentialStore {
    pool: Arc<PgPool>,
}

impl PostgresCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create `quickbooks_tokens` when missing.
    pub async fn ensure_schema(&self) -> Result<(), CredentialStoreError> {
        sqlx::query(CREATE_TABLE)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for PostgresCredentialStore {
    #[instrument(skip(self), fields(location = %location), err)]
    async fn load(
        &self,
        location: &LocationTag,
    ) -> Result<Option<Credential>, CredentialStoreError> {
        let row = sqlx::query(
            r#"
            SELECT location, realm_id, access_token, refresh_token, expires_at, refresh_token_expires_at, updated_at
            FROM quickbooks_tokens
            WHERE location = $1
            "#,
        )
        .bind(location.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load", e))?;

        row.map(|r| credential_from_row(&r)).transpose()
    }

    #[instrument(skip(self, credential), fields(location = %credential.location), err)]
    async fn upsert(&self, credential: &Credential) -> Result<(), CredentialStoreError> {
        sqlx::query(
            r#"
            INSERT INTO quickbooks_tokens
                (location, realm_id, access_token, refresh_token, expires_at, refresh_token_expires_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (location) DO UPDATE SET
                realm_id = EXCLUDED.realm_id,
                access_token = EXCLUDED.access_token,
                refresh_token = EXCLUDED.refresh_token,
                expires_at = EXCLUDED.expires_at,
                refresh_token_expires_at = EXCLUDED.refresh_token_expires_at,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(credential.location.as_str())
        .bind(&credential.realm_id)
        .bind(&credential.access_token)
        .bind(&credential.refresh_token)
        .bind(credential.expires_at)
        .bind(credential.refresh_token_expires_at)
        .bind(credential.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(location = %location), err)]
    async fn delete(&self, location: &LocationTag) -> Result<bool, CredentialStoreError> {
        let result = sqlx::query("DELETE FROM quickbooks_tokens WHERE location = $1")
            .bind(location.as_str())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> Result<Vec<Credential>, CredentialStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT location, realm_id, access_token, refresh_token, expires_at, refresh_token_expires_at, updated_at
            FROM quickbooks_tokens
            ORDER BY location ASC
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list", e))?;

        rows.iter().map(credential_from_row).collect()
    }
}

fn credential_from_row(row: &sqlx::postgres::PgRow) -> Result<Credential, CredentialStoreError> {
    let decode =
        |e: sqlx::Error| CredentialStoreError(format!("failed to decode credential row: {e}"));

    let location: String = row.try_get("location").map_err(decode)?;
    let location = LocationTag::new(&location)
        .map_err(|e| {
            CredentialStoreError(format!("stored location {location:?} is invalid: {e}"))
        })?;

    Ok(Credential {
        location,
        realm_id: row.try_get("realm_id").map_err(decode)?,
        access_token: row.try_get("access_token").map_err(decode)?,
        refresh_token: row.try_get("refresh_token").map_err(decode)?,
        expires_at: row.try_get::<DateTime<Utc>, _>("expires_at").map_err(decode)?,
        refresh_token_expires_at: row
            .try_get::<Option<DateTime<Utc>>, _>("refresh_token_expires_at")
            .map_err(decode)?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at").map_err(decode)?,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> CredentialStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            CredentialStoreError(format!("database error in {operation}: {}", db_err.message()))
        }
        sqlx::Error::PoolClosed => {
            CredentialStoreError(format!("connection pool closed in {operation}"))
        }
        other => CredentialStoreError(format!("sqlx error in {operation}: {other}")),
    }
}
