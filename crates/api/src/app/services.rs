//! Service wiring: credential/ledger stores, QuickBooks clients and the cache.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use amy_core::ledger::{LedgerFilter, LedgerRow};
use amy_core::{
    Clock, DomainError, LocationScope, LocationTag, PeriodWindow, SystemClock, split_into_periods,
};
use amy_infra::{
    AppConfig, CacheKey, InMemoryLedgerRepository, LedgerError, LedgerRepository,
    PostgresCredentialStore, PostgresLedgerRepository, ResponseCache,
};
use amy_quickbooks::{
    AccountingMethod, CredentialStore, InMemoryCredentialStore, OAuthClient, QuickBooksClient,
    QuickBooksResult, ReportFetcher, RevenueAggregator, RevenueReport, TokenStore,
};

use crate::app::dto::{DataSource, ReportParams};

/// Storage backends and clock; everything else is derived from config.
pub struct ServiceDeps {
    pub credentials: Arc<dyn CredentialStore>,
    pub ledger: Arc<dyn LedgerRepository>,
    pub clock: Arc<dyn Clock>,
}

impl ServiceDeps {
    pub fn in_memory() -> Self {
        Self {
            credentials: Arc::new(InMemoryCredentialStore::new()),
            ledger: Arc::new(InMemoryLedgerRepository::new()),
            clock: Arc::new(SystemClock),
        }
    }
}

pub struct AppServices {
    locations: Vec<LocationTag>,
    tokens: Arc<TokenStore>,
    oauth: Arc<OAuthClient>,
    aggregator: RevenueAggregator,
    ledger: Arc<dyn LedgerRepository>,
    revenue_cache: ResponseCache<RevenueReport>,
    dashboard_url: String,
}

/// External figures for one request, plus where they came from.
pub struct RevenueLookup {
    pub report: RevenueReport,
    pub source: DataSource,
}

impl AppServices {
    pub fn new(config: &AppConfig, deps: ServiceDeps) -> QuickBooksResult<Self> {
        let qb = &config.quickbooks;
        let oauth = Arc::new(OAuthClient::new(qb.oauth_config(), qb.http_timeout)?);
        let reports = Arc::new(QuickBooksClient::new(qb.api_base.clone(), qb.http_timeout)?);

        let tokens = Arc::new(TokenStore::new(deps.credentials, oauth.clone(), deps.clock.clone()));
        let aggregator =
            RevenueAggregator::new(ReportFetcher::new(tokens.clone(), reports), qb.concurrency);

        Ok(Self {
            locations: config.locations.clone(),
            tokens,
            oauth,
            aggregator,
            ledger: deps.ledger,
            revenue_cache: ResponseCache::with_ttl(deps.clock, config.cache_ttl),
            dashboard_url: config.dashboard_url.clone(),
        })
    }

    pub fn locations(&self) -> &[LocationTag] {
        &self.locations
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn oauth(&self) -> &OAuthClient {
        &self.oauth
    }

    pub fn dashboard_url(&self) -> &str {
        &self.dashboard_url
    }

    /// A single configured location by tag.
    pub fn configured_location(&self, raw: Option<&str>) -> Result<LocationTag, DomainError> {
        match raw.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => {
                let tag = LocationTag::new(raw)?;
                if self.locations.contains(&tag) {
                    Ok(tag)
                } else {
                    Err(DomainError::UnknownLocation(tag.to_string()))
                }
            }
            // A single-location deployment does not need the parameter.
            None => match self.locations.as_slice() {
                [only] => Ok(only.clone()),
                _ => Err(DomainError::validation("location is required")),
            },
        }
    }

    pub fn windows(&self, params: &ReportParams) -> Result<Vec<PeriodWindow>, DomainError> {
        split_into_periods(params.start, params.end, params.granularity)
    }

    /// QuickBooks figures for the request, from cache when fresh.
    ///
    /// Only reports without per-location failures are cached, so a transient
    /// outage is retried on the next request.
    pub async fn revenue(
        &self,
        params: &ReportParams,
        method: AccountingMethod,
    ) -> Result<RevenueLookup, DomainError> {
        let locations = params.scope.resolve(&self.locations)?;
        let windows = self.windows(params)?;
        let key = CacheKey::new(&params.scope, params.start, params.end, params.granularity)
            .with_basis(method.as_str());

        if let Some(hit) = self.revenue_cache.get(&key) {
            info!(scope = %key.scope, "revenue served from cache");
            return Ok(RevenueLookup {
                report: hit.as_cached(),
                source: DataSource::Cache,
            });
        }

        let report = self.aggregator.aggregate(&locations, &windows, method).await;
        if report.has_failures() {
            warn!(scope = %key.scope, "revenue report has failed locations; not cached");
        } else {
            self.revenue_cache.set(key, report.clone());
        }

        Ok(RevenueLookup {
            report,
            source: DataSource::Quickbooks,
        })
    }

    pub async fn ledger_rows(&self, params: &ReportParams) -> Result<Vec<LedgerRow>, LedgerError> {
        let locations = match &params.scope {
            LocationScope::All => None,
            LocationScope::One(tag) => Some(vec![tag.clone()]),
        };
        self.ledger
            .rows(&LedgerFilter {
                locations,
                start: params.start,
                end: params.end,
            })
            .await
    }

    /// Cached reports covering `location` no longer reflect its connection.
    pub fn invalidate_location(&self, location: &LocationTag) {
        self.revenue_cache.invalidate_scope(location.as_str());
    }
}

/// Production wiring: Postgres when `DATABASE_URL` is set, in-memory otherwise.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let deps = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new().max_connections(5).connect(url).await?;
            let credentials = PostgresCredentialStore::new(pool.clone());
            credentials.ensure_schema().await?;
            info!("using Postgres credential store and ledger");
            ServiceDeps {
                credentials: Arc::new(credentials),
                ledger: Arc::new(PostgresLedgerRepository::new(pool)),
                clock: Arc::new(SystemClock),
            }
        }
        None => {
            warn!("DATABASE_URL not set; credentials and ledger are in-memory and lost on restart");
            ServiceDeps::in_memory()
        }
    };

    Ok(AppServices::new(config, deps)?)
}
