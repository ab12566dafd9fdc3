//! Process configuration from environment variables (optionally via `.env`).

use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use amy_core::LocationTag;
use amy_quickbooks::OAuthConfig;
use amy_quickbooks::oauth::{ACCOUNTING_SCOPE, DEFAULT_AUTH_BASE, DEFAULT_TOKEN_URL};
use amy_quickbooks::report::{PRODUCTION_API_BASE, SANDBOX_API_BASE};

use crate::cache::DEFAULT_TTL_SECS;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8080/api/quickbooks/callback";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 5;
const DEFAULT_CONCURRENCY: usize = 2;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {message}")]
    Invalid { var: &'static str, message: String },
}

fn invalid(var: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        var,
        message: message.into(),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QuickBooksEnvironment {
    #[default]
    Production,
    Sandbox,
}

impl QuickBooksEnvironment {
    pub fn api_base(&self) -> &'static str {
        match self {
            Self::Production => PRODUCTION_API_BASE,
            Self::Sandbox => SANDBOX_API_BASE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QuickBooksSettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub environment: QuickBooksEnvironment,
    pub auth_base: String,
    pub token_url: String,
    pub api_base: String,
    pub http_timeout: Duration,
    /// Locations fetched at once during multi-location aggregation.
    pub concurrency: usize,
}

impl QuickBooksSettings {
    pub fn oauth_config(&self) -> OAuthConfig {
        OAuthConfig {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            redirect_uri: self.redirect_uri.clone(),
            auth_base: self.auth_base.clone(),
            token_url: self.token_url.clone(),
            scope: ACCOUNTING_SCOPE.to_string(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    /// Configured locations, in the order multi-location reports list them.
    pub locations: Vec<LocationTag>,
    /// `None` keeps credentials and the ledger in memory.
    pub database_url: Option<String>,
    pub quickbooks: QuickBooksSettings,
    pub cache_ttl: chrono::Duration,
    /// Where the OAuth callback sends the browser afterwards.
    pub dashboard_url: String,
}

impl AppConfig {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let locations = parse_locations(get("AMY_LOCATIONS").as_deref().unwrap_or("main"))?;

        let environment = match get("QUICKBOOKS_ENVIRONMENT")
            .as_deref()
            .map(str::to_ascii_lowercase)
        {
            None => QuickBooksEnvironment::Production,
            Some(v) if v == "production" => QuickBooksEnvironment::Production,
            Some(v) if v == "sandbox" => QuickBooksEnvironment::Sandbox,
            Some(v) => {
                return Err(invalid(
                    "QUICKBOOKS_ENVIRONMENT",
                    format!("expected production or sandbox, got {v}"),
                ));
            }
        };

        let http_timeout =
            parse_number::<u64>(&get, "QUICKBOOKS_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)?;
        if http_timeout == 0 {
            return Err(invalid("QUICKBOOKS_HTTP_TIMEOUT_SECS", "must be at least 1"));
        }
        let concurrency =
            parse_number::<usize>(&get, "QUICKBOOKS_CONCURRENCY", DEFAULT_CONCURRENCY)?;
        if concurrency == 0 {
            return Err(invalid("QUICKBOOKS_CONCURRENCY", "must be at least 1"));
        }
        let cache_ttl = parse_number::<i64>(&get, "AMY_CACHE_TTL_SECS", DEFAULT_TTL_SECS)?;

        let quickbooks = QuickBooksSettings {
            client_id: get("QUICKBOOKS_CLIENT_ID").unwrap_or_default(),
            client_secret: get("QUICKBOOKS_CLIENT_SECRET").unwrap_or_default(),
            redirect_uri: get("QUICKBOOKS_REDIRECT_URI")
                .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string()),
            environment,
            auth_base: get("QUICKBOOKS_AUTH_BASE").unwrap_or_else(|| DEFAULT_AUTH_BASE.to_string()),
            token_url: get("QUICKBOOKS_TOKEN_URL").unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
            api_base: get("QUICKBOOKS_API_BASE")
                .unwrap_or_else(|| environment.api_base().to_string()),
            http_timeout: Duration::from_secs(http_timeout),
            concurrency,
        };
        if !quickbooks.is_configured() {
            warn!(
                "QUICKBOOKS_CLIENT_ID/QUICKBOOKS_CLIENT_SECRET not set; connecting and refreshing will fail"
            );
        }

        Ok(Self {
            bind_addr: get("AMY_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            locations,
            database_url: get("DATABASE_URL"),
            quickbooks,
            cache_ttl: chrono::Duration::seconds(cache_ttl.max(0)),
            dashboard_url: get("AMY_DASHBOARD_URL").unwrap_or_else(|| "/".to_string()),
        })
    }
}

fn parse_number<T: core::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match get(var) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| invalid(var, format!("expected a number, got {raw}"))),
    }
}

/// Comma separated tags; duplicates are dropped keeping first occurrence.
fn parse_locations(raw: &str) -> Result<Vec<LocationTag>, ConfigError> {
    let mut out: Vec<LocationTag> = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let tag = LocationTag::new(part).map_err(|e| invalid("AMY_LOCATIONS", e.to_string()))?;
        if !out.contains(&tag) {
            out.push(tag);
        }
    }
    if out.is_empty() {
        return Err(invalid("AMY_LOCATIONS", "at least one location is required"));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = load(&[]).unwrap();
        assert_eq!(cfg.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(cfg.locations, vec![LocationTag::new("main").unwrap()]);
        assert!(cfg.database_url.is_none());
        assert_eq!(cfg.quickbooks.api_base, PRODUCTION_API_BASE);
        assert_eq!(cfg.quickbooks.http_timeout, Duration::from_secs(5));
        assert_eq!(cfg.quickbooks.concurrency, 2);
        assert_eq!(cfg.cache_ttl, chrono::Duration::hours(1));
        assert_eq!(cfg.dashboard_url, "/");
        assert!(!cfg.quickbooks.is_configured());
    }

    #[test]
    fn locations_keep_order_and_drop_duplicates() {
        let cfg = load(&[("AMY_LOCATIONS", "Dallas, austin,dallas,,houston")]).unwrap();
        let tags: Vec<_> = cfg.locations.iter().map(LocationTag::as_str).collect();
        assert_eq!(tags, vec!["dallas", "austin", "houston"]);
    }

    #[test]
    fn sandbox_selects_sandbox_api_unless_overridden() {
        let cfg = load(&[("QUICKBOOKS_ENVIRONMENT", "Sandbox")]).unwrap();
        assert_eq!(cfg.quickbooks.api_base, SANDBOX_API_BASE);

        let cfg = load(&[
            ("QUICKBOOKS_ENVIRONMENT", "sandbox"),
            ("QUICKBOOKS_API_BASE", "http://127.0.0.1:9999/v3"),
        ])
        .unwrap();
        assert_eq!(cfg.quickbooks.api_base, "http://127.0.0.1:9999/v3");
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(load(&[("QUICKBOOKS_ENVIRONMENT", "staging")]).is_err());
        assert!(load(&[("QUICKBOOKS_CONCURRENCY", "0")]).is_err());
        assert!(load(&[("QUICKBOOKS_HTTP_TIMEOUT_SECS", "soon")]).is_err());
        assert!(load(&[("AMY_LOCATIONS", "all")]).is_err());
        assert!(load(&[("AMY_LOCATIONS", " , ")]).is_err());
    }

    #[test]
    fn oauth_config_uses_accounting_scope() {
        let cfg = load(&[("QUICKBOOKS_CLIENT_ID", "id"), ("QUICKBOOKS_CLIENT_SECRET", "s")]).unwrap();
        let oauth = cfg.quickbooks.oauth_config();
        assert_eq!(oauth.scope, ACCOUNTING_SCOPE);
        assert_eq!(oauth.token_url, DEFAULT_TOKEN_URL);
        assert!(cfg.quickbooks.is_configured());
    }
}
