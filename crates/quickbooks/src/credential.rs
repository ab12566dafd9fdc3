//! OAuth credentials per location and their storage abstraction.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use amy_core::LocationTag;

use crate::error::QuickBooksError;

/// Access tokens are refreshed once they are this close to expiring.
pub const EXPIRY_BUFFER_SECS: i64 = 5 * 60;

/// Lifetime QuickBooks gives access tokens when the token response omits it.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// OAuth token pair for one location's QuickBooks company.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub location: LocationTag,
    /// QuickBooks company id (`realmId`).
    pub realm_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub refresh_token_expires_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl core::fmt::Debug for Credential {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Credential")
            .field("location", &self.location)
            .field("realm_id", &self.realm_id)
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("refresh_token_expires_at", &self.refresh_token_expires_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

impl Credential {
    /// Build the initial credential from an authorization-code grant.
    pub fn from_grant(
        location: LocationTag,
        realm_id: String,
        grant: TokenGrant,
        now: DateTime<Utc>,
    ) -> Result<Self, QuickBooksError> {
        let refresh_token = grant
            .refresh_token
            .clone()
            .ok_or_else(|| {
                QuickBooksError::InvalidResponse("token response missing refresh_token".into())
            })?;

        Ok(Self {
            location,
            realm_id,
            access_token: grant.access_token.clone(),
            refresh_token,
            expires_at: grant.expires_at(now)?,
            refresh_token_expires_at: grant.refresh_token_expires_at(now)?,
            updated_at: now,
        })
    }

    /// Credential that replaces `self` after a successful refresh.
    ///
    /// QuickBooks may rotate the refresh token; when the response omits it the
    /// current one stays valid.
    pub fn refreshed(
        &self,
        grant: TokenGrant,
        now: DateTime<Utc>,
    ) -> Result<Self, QuickBooksError> {
        Ok(Self {
            location: self.location.clone(),
            realm_id: self.realm_id.clone(),
            expires_at: grant.expires_at(now)?,
            refresh_token_expires_at: grant
                .refresh_token_expires_at(now)?
                .or(self.refresh_token_expires_at),
            access_token: grant.access_token,
            refresh_token: grant
                .refresh_token
                .unwrap_or_else(|| self.refresh_token.clone()),
            updated_at: now,
        })
    }

    /// True when the access token expires within `buffer` of `now`.
    pub fn needs_refresh(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        self.expires_at <= now + buffer
    }
}

/// Token endpoint response (authorization code or refresh grant).
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
    #[serde(default)]
    pub x_refresh_token_expires_in: Option<i64>,
    #[serde(default, rename = "realmId")]
    pub realm_id: Option<String>,
}

impl core::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("expires_in", &self.expires_in)
            .field("x_refresh_token_expires_in", &self.x_refresh_token_expires_in)
            .field("realm_id", &self.realm_id)
            .finish_non_exhaustive()
    }
}

fn default_expires_in() -> i64 {
    DEFAULT_EXPIRES_IN_SECS
}

impl TokenGrant {
    pub fn expires_at(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, QuickBooksError> {
        offset(now, "expires_in", self.expires_in)
    }

    pub fn refresh_token_expires_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, QuickBooksError> {
        self.x_refresh_token_expires_in
            .map(|secs| offset(now, "x_refresh_token_expires_in", secs))
            .transpose()
    }
}

/// `now + secs`, rejecting lifetimes chrono cannot represent.
fn offset(now: DateTime<Utc>, field: &str, secs: i64) -> Result<DateTime<Utc>, QuickBooksError> {
    Duration::try_seconds(secs)
        .and_then(|d| now.checked_add_signed(d))
        .ok_or_else(|| {
            QuickBooksError::InvalidResponse(format!("token response {field} out of range: {secs}"))
        })
}

/// Credential persistence error (backend specific detail in the message).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct CredentialStoreError(pub String);

impl From<CredentialStoreError> for QuickBooksError {
    fn from(e: CredentialStoreError) -> Self {
        QuickBooksError::Store(e.0)
    }
}

/// One row per location; upserted on connect and refresh, deleted on disconnect.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(
        &self,
        location: &LocationTag,
    ) -> Result<Option<Credential>, CredentialStoreError>;

    /// Insert or replace the credential for `credential.location`.
    async fn upsert(&self, credential: &Credential) -> Result<(), CredentialStoreError>;

    /// Returns `true` when a credential existed.
    async fn delete(&self, location: &LocationTag) -> Result<bool, CredentialStoreError>;

    async fn list(&self) -> Result<Vec<Credential>, CredentialStoreError>;
}

#[async_trait]
impl<S> CredentialStore for Arc<S>
where
    S: CredentialStore + ?Sized,
{
    async fn load(
        &self,
        location: &LocationTag,
    ) -> Result<Option<Credential>, CredentialStoreError> {
        (**self).load(location).await
    }

    async fn upsert(&self, credential: &Credential) -> Result<(), CredentialStoreError> {
        (**self).upsert(credential).await
    }

    async fn delete(&self, location: &LocationTag) -> Result<bool, CredentialStoreError> {
        (**self).delete(location).await
    }

    async fn list(&self) -> Result<Vec<Credential>, CredentialStoreError> {
        (**self).list().await
    }
}

/// In-memory credential store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    inner: RwLock<HashMap<LocationTag, Credential>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn load(
        &self,
        location: &LocationTag,
    ) -> Result<Option<Credential>, CredentialStoreError> {
        let map = self
            .inner
            .read()
            .map_err(|_| CredentialStoreError("credential map lock poisoned".into()))?;
        Ok(map.get(location).cloned())
    }

    async fn upsert(&self, credential: &Credential) -> Result<(), CredentialStoreError> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| CredentialStoreError("credential map lock poisoned".into()))?;
        map.insert(credential.location.clone(), credential.clone());
        Ok(())
    }

    async fn delete(&self, location: &LocationTag) -> Result<bool, CredentialStoreError> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| CredentialStoreError("credential map lock poisoned".into()))?;
        Ok(map.remove(location).is_some())
    }

    async fn list(&self) -> Result<Vec<Credential>, CredentialStoreError> {
        let map = self
            .inner
            .read()
            .map_err(|_| CredentialStoreError("credential map lock poisoned".into()))?;
        let mut all: Vec<_> = map.values().cloned().collect();
        all.sort_by(|a, b| a.location.cmp(&b.location));
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(refresh: Option<&str>) -> TokenGrant {
        TokenGrant {
            access_token: "access-2".into(),
            refresh_token: refresh.map(str::to_string),
            expires_in: 3600,
            x_refresh_token_expires_in: None,
            realm_id: None,
        }
    }

    fn credential(now: DateTime<Utc>, expires_in: Duration) -> Credential {
        Credential {
            location: LocationTag::new("austin").unwrap(),
            realm_id: "123".into(),
            access_token: "access-1".into(),
            refresh_token: "refresh-1".into(),
            expires_at: now + expires_in,
            refresh_token_expires_at: None,
            updated_at: now,
        }
    }

    #[test]
    fn expiry_buffer_decides_refresh() {
        let now = Utc::now();
        let buffer = Duration::seconds(EXPIRY_BUFFER_SECS);

        assert!(credential(now, Duration::minutes(2)).needs_refresh(now, buffer));
        assert!(credential(now, Duration::minutes(-1)).needs_refresh(now, buffer));
        assert!(!credential(now, Duration::minutes(10)).needs_refresh(now, buffer));
    }

    #[test]
    fn refresh_keeps_old_refresh_token_when_not_rotated() {
        let now = Utc::now();
        let old = credential(now, Duration::minutes(1));

        let rotated = old.refreshed(grant(Some("refresh-2")), now).unwrap();
        assert_eq!(rotated.refresh_token, "refresh-2");
        assert_eq!(rotated.access_token, "access-2");
        assert_eq!(rotated.expires_at, now + Duration::seconds(3600));

        let kept = old.refreshed(grant(None), now).unwrap();
        assert_eq!(kept.refresh_token, "refresh-1");
        assert_eq!(kept.realm_id, "123");
    }

    #[test]
    fn debug_output_redacts_tokens() {
        let out = format!("{:?}", credential(Utc::now(), Duration::minutes(10)));
        assert!(!out.contains("access-1"));
        assert!(!out.contains("refresh-1"));
        assert!(out.contains("<redacted>"));
    }

    #[test]
    fn token_grant_defaults() {
        let g: TokenGrant = serde_json::from_str(r#"{"access_token":"a","realmId":"99"}"#).unwrap();
        assert_eq!(g.expires_in, 3600);
        assert_eq!(g.realm_id.as_deref(), Some("99"));
        assert!(g.refresh_token.is_none());
    }

    #[test]
    fn out_of_range_lifetimes_are_invalid_responses() {
        let now = Utc::now();
        let g: TokenGrant = serde_json::from_str(
            r#"{"access_token":"a","refresh_token":"r","expires_in":9223372036854775}"#,
        )
        .unwrap();
        assert!(matches!(g.expires_at(now), Err(QuickBooksError::InvalidResponse(_))));

        let old = credential(now, Duration::minutes(1));
        assert!(matches!(old.refreshed(g, now), Err(QuickBooksError::InvalidResponse(_))));

        let mut g = grant(Some("refresh-2"));
        g.x_refresh_token_expires_in = Some(i64::MAX);
        let austin = LocationTag::new("austin").unwrap();
        assert!(matches!(
            Credential::from_grant(austin, "123".into(), g, now),
            Err(QuickBooksError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn in_memory_store_upserts_by_location() {
        let store = InMemoryCredentialStore::new();
        let now = Utc::now();
        let first = credential(now, Duration::minutes(10));
        store.upsert(&first).await.unwrap();

        let second = first.refreshed(grant(Some("refresh-2")), now).unwrap();
        store.upsert(&second).await.unwrap();

        assert_eq!(store.list().await.unwrap().len(), 1);
        let loaded = store.load(&first.location).await.unwrap().unwrap();
        assert_eq!(loaded.refresh_token, "refresh-2");

        assert!(store.delete(&first.location).await.unwrap());
        assert!(!store.delete(&first.location).await.unwrap());
        assert!(store.load(&first.location).await.unwrap().is_none());
    }
}
