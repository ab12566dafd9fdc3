//! Valid-credential provider: loads, refreshes and persists OAuth tokens.
//!
//! ## Refresh ordering
//!
//! A refresh always persists the new credential before handing it out. If the
//! upstream refresh succeeds but persisting fails, the old refresh token is
//! already invalid at QuickBooks; that window is logged at error level and
//! reported as `QuickBooksError::Store` so the location shows up as needing
//! attention rather than silently using a token nobody can renew.
//!
//! Refreshes are serialized per location: concurrent callers wait on the
//! location's lock and then reuse the credential the first caller stored.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use amy_core::{Clock, LocationTag};

use crate::credential::{Credential, CredentialStore, EXPIRY_BUFFER_SECS, TokenGrant};
use crate::error::{QuickBooksError, QuickBooksResult};
use crate::oauth::TokenRefresher;

/// Connection state of one configured location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub location: LocationTag,
    pub connected: bool,
    pub realm_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub refresh_token_expires_at: Option<DateTime<Utc>>,
    pub needs_refresh: bool,
}

pub struct TokenStore {
    credentials: Arc<dyn CredentialStore>,
    refresher: Arc<dyn TokenRefresher>,
    clock: Arc<dyn Clock>,
    buffer: Duration,
    refresh_locks: Mutex<HashMap<LocationTag, Arc<tokio::sync::Mutex<()>>>>,
}

impl TokenStore {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        refresher: Arc<dyn TokenRefresher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            credentials,
            refresher,
            clock,
            buffer: Duration::seconds(EXPIRY_BUFFER_SECS),
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    async fn load(&self, location: &LocationTag) -> QuickBooksResult<Credential> {
        self.credentials
            .load(location)
            .await?
            .ok_or_else(|| QuickBooksError::NotConnected(location.clone()))
    }

    fn refresh_lock(&self, location: &LocationTag) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.refresh_locks.lock() {
            Ok(l) => l,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks
            .entry(location.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// A credential that stays valid for at least the expiry buffer.
    #[instrument(skip(self), fields(location = %location))]
    pub async fn get_valid_credential(
        &self,
        location: &LocationTag,
    ) -> QuickBooksResult<Credential> {
        let current = self.load(location).await?;
        if !current.needs_refresh(self.now(), self.buffer) {
            return Ok(current);
        }

        let lock = self.refresh_lock(location);
        let _guard = lock.lock().await;

        // Another caller may have refreshed while we waited.
        let current = self.load(location).await?;
        if !current.needs_refresh(self.now(), self.buffer) {
            return Ok(current);
        }
        self.refresh_locked(&current).await
    }

    /// Force a refresh of `credential` regardless of its expiry.
    pub async fn refresh(&self, credential: &Credential) -> QuickBooksResult<Credential> {
        let lock = self.refresh_lock(&credential.location);
        let _guard = lock.lock().await;
        self.refresh_locked(credential).await
    }

    async fn refresh_locked(&self, credential: &Credential) -> QuickBooksResult<Credential> {
        let location = &credential.location;
        let grant = match self.refresher.refresh(&credential.refresh_token).await {
            Ok(g) => g,
            Err(e) => {
                warn!(location = %location, error = %e, "QuickBooks token refresh failed");
                return Err(match e {
                    QuickBooksError::RefreshFailed(_)
                    | QuickBooksError::RateLimited { .. }
                    | QuickBooksError::Transport(_) => e,
                    other => QuickBooksError::RefreshFailed(other.to_string()),
                });
            }
        };

        let refreshed = credential.refreshed(grant, self.now())?;
        if let Err(e) = self.credentials.upsert(&refreshed).await {
            error!(
                location = %location,
                error = %e,
                "refreshed QuickBooks credential could not be persisted; the previous refresh token is no longer valid"
            );
            return Err(e.into());
        }

        info!(
            location = %location,
            expires_at = %refreshed.expires_at,
            "QuickBooks token refreshed"
        );
        Ok(refreshed)
    }

    /// Store the credential obtained from the OAuth callback.
    pub async fn connect(
        &self,
        location: LocationTag,
        realm_id: String,
        grant: TokenGrant,
    ) -> QuickBooksResult<Credential> {
        let credential = Credential::from_grant(location, realm_id, grant, self.now())?;
        self.store(&credential).await?;
        info!(
            location = %credential.location,
            realm_id = %credential.realm_id,
            "QuickBooks connected"
        );
        Ok(credential)
    }

    /// Upsert by location.
    pub async fn store(&self, credential: &Credential) -> QuickBooksResult<()> {
        self.credentials.upsert(credential).await?;
        Ok(())
    }

    /// Delete the stored credential; `true` when one existed.
    pub async fn disconnect(&self, location: &LocationTag) -> QuickBooksResult<bool> {
        let removed = self.credentials.delete(location).await?;
        info!(location = %location, removed, "QuickBooks disconnected");
        Ok(removed)
    }

    /// Connection state for each configured location, in the given order.
    pub async fn status(
        &self,
        locations: &[LocationTag],
    ) -> QuickBooksResult<Vec<ConnectionStatus>> {
        let stored: HashMap<LocationTag, Credential> = self
            .credentials
            .list()
            .await?
            .into_iter()
            .map(|c| (c.location.clone(), c))
            .collect();
        let now = self.now();

        Ok(locations
            .iter()
            .map(|location| match stored.get(location) {
                Some(c) => ConnectionStatus {
                    location: location.clone(),
                    connected: true,
                    realm_id: Some(c.realm_id.clone()),
                    expires_at: Some(c.expires_at),
                    refresh_token_expires_at: c.refresh_token_expires_at,
                    needs_refresh: c.needs_refresh(now, self.buffer),
                },
                None => ConnectionStatus {
                    location: location.clone(),
                    connected: false,
                    realm_id: None,
                    expires_at: None,
                    refresh_token_expires_at: None,
                    needs_refresh: false,
                },
            })
            .collect())
    }
}
