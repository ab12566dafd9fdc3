//! QuickBooks OAuth 2.0 client (authorize redirect, code exchange, refresh).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use amy_core::LocationTag;

use crate::credential::TokenGrant;
use crate::error::{QuickBooksError, QuickBooksResult};

pub const DEFAULT_AUTH_BASE: &str = "https://appcenter.intuit.com";
pub const DEFAULT_TOKEN_URL: &str = "https://oauth.platform.intuit.com/oauth2/v1/tokens/bearer";
pub const ACCOUNTING_SCOPE: &str = "com.intuit.quickbooks.accounting";

/// OAuth application settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub auth_base: String,
    pub token_url: String,
    pub scope: String,
}

impl core::fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("auth_base", &self.auth_base)
            .field("token_url", &self.token_url)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Anything that can trade a refresh token for a new token pair.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> QuickBooksResult<TokenGrant>;
}

/// reqwest-backed OAuth client.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    config: OAuthConfig,
    http: reqwest::Client,
}

impl OAuthClient {
    pub fn new(config: OAuthConfig, timeout: Duration) -> QuickBooksResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| QuickBooksError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// URL the browser is redirected to; `state` carries the location tag.
    pub fn authorize_url(&self, location: &LocationTag) -> QuickBooksResult<Url> {
        let base = format!("{}/connect/oauth2", self.config.auth_base.trim_end_matches('/'));
        Url::parse_with_params(
            &base,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("scope", self.config.scope.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("response_type", "code"),
                ("state", location.as_str()),
            ],
        )
        .map_err(|e| QuickBooksError::Config(format!("invalid auth base URL: {e}")))
    }

    /// Exchange the authorization code from the OAuth callback.
    pub async fn exchange_code(&self, code: &str) -> QuickBooksResult<TokenGrant> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];
        self.token_request(&form)
            .await
            .map_err(|e| match e {
                QuickBooksError::RefreshFailed(msg) => QuickBooksError::AuthorizationFailed(msg),
                other => other,
            })
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> QuickBooksResult<TokenGrant> {
        let resp = self
            .http
            .post(&self.config.token_url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .header(reqwest::header::ACCEPT, "application/json")
            .form(form)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            return resp.json::<TokenGrant>().await.map_err(|e| {
                QuickBooksError::InvalidResponse(format!("token response: {e}"))
            });
        }

        let retry_after = retry_after_secs(resp.headers());
        let body = resp.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), "QuickBooks token endpoint rejected request");

        match status {
            StatusCode::TOO_MANY_REQUESTS => Err(QuickBooksError::RateLimited { retry_after }),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(QuickBooksError::RefreshFailed(oauth_error_message(&body, status)))
            }
            _ => Err(QuickBooksError::ExternalApi {
                status: status.as_u16(),
                body,
            }),
        }
    }
}

#[async_trait]
impl TokenRefresher for OAuthClient {
    async fn refresh(&self, refresh_token: &str) -> QuickBooksResult<TokenGrant> {
        debug!("refreshing QuickBooks access token");
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        self.token_request(&form).await
    }
}

/// `Retry-After` in whole seconds, when the header carries a number.
pub(crate) fn retry_after_secs(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

#[derive(Deserialize)]
struct OAuthErrorBody {
    error: Option<String>,
    error_description: Option<String>,
}

fn oauth_error_message(body: &str, status: StatusCode) -> String {
    serde_json::from_str::<OAuthErrorBody>(body)
        .ok()
        .and_then(|b| b.error_description.or(b.error))
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
}
