//! In-process response cache with a fixed TTL.
//!
//! Entries are never evicted on read; once the map grows past
//! `SWEEP_THRESHOLD`, the next `set` drops every expired entry in one pass.
//! Payloads live behind `Arc`, so repeated hits share one allocation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::debug;

use amy_core::{Clock, Granularity, LocationScope};

pub const DEFAULT_TTL_SECS: i64 = 60 * 60;

/// Entry count above which `set` sweeps expired entries.
pub const SWEEP_THRESHOLD: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Location tag or `"all"`.
    pub scope: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub granularity: Granularity,
    /// Extra discriminator (accounting method); empty when unused.
    pub basis: String,
}

impl CacheKey {
    pub fn new(
        scope: &LocationScope,
        start_date: NaiveDate,
        end_date: NaiveDate,
        granularity: Granularity,
    ) -> Self {
        Self {
            scope: scope.key().to_string(),
            start_date,
            end_date,
            granularity,
            basis: String::new(),
        }
    }

    pub fn with_basis(mut self, basis: impl Into<String>) -> Self {
        self.basis = basis.into();
        self
    }
}

#[derive(Debug)]
struct CacheEntry<V> {
    payload: Arc<V>,
    inserted_at: DateTime<Utc>,
}

pub struct ResponseCache<V> {
    entries: RwLock<HashMap<CacheKey, CacheEntry<V>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<V> ResponseCache<V> {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_ttl(clock, Duration::seconds(DEFAULT_TTL_SECS))
    }

    pub fn with_ttl(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_fresh(&self, entry: &CacheEntry<V>, now: DateTime<Utc>) -> bool {
        now - entry.inserted_at < self.ttl
    }

    /// Cached payload for `key` unless it is older than the TTL.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<V>> {
        let now = self.clock.now();
        let entries = match self.entries.read() {
            Ok(e) => e,
            Err(poisoned) => poisoned.into_inner(),
        };
        let hit = entries
            .get(key)
            .filter(|entry| self.is_fresh(entry, now))
            .map(|entry| entry.payload.clone());
        debug!(
            scope = %key.scope,
            start = %key.start_date,
            end = %key.end_date,
            hit = hit.is_some(),
            "response cache lookup"
        );
        hit
    }

    /// Store `payload` under `key`, replacing any previous entry.
    pub fn set(&self, key: CacheKey, payload: V) -> Arc<V> {
        let now = self.clock.now();
        let payload = Arc::new(payload);
        let mut entries = match self.entries.write() {
            Ok(e) => e,
            Err(poisoned) => poisoned.into_inner(),
        };

        if entries.len() > SWEEP_THRESHOLD {
            let before = entries.len();
            entries.retain(|_, entry| now - entry.inserted_at < self.ttl);
            debug!(removed = before - entries.len(), "response cache swept");
        }

        entries.insert(
            key,
            CacheEntry {
                payload: payload.clone(),
                inserted_at: now,
            },
        );
        payload
    }

    /// Drop every entry whose scope is `scope` or `"all"`.
    pub fn invalidate_scope(&self, scope: &str) {
        let mut entries = match self.entries.write() {
            Ok(e) => e,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.retain(|key, _| key.scope != scope && key.scope != LocationScope::ALL);
    }

    /// Entries currently held, expired or not.
    pub fn len(&self) -> usize {
        match self.entries.read() {
            Ok(e) => e.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
