use thiserror::Error;

use amy_core::LocationTag;

/// Failure talking to QuickBooks (or to the credential store) for one location.
///
/// Every variant is recoverable at the aggregation level: a multi-location
/// report records the error next to the location and keeps going.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QuickBooksError {
    /// No stored credential for the location.
    #[error("QuickBooks is not connected for location {0}")]
    NotConnected(LocationTag),

    /// The refresh token was rejected; the location must be reconnected.
    #[error("QuickBooks token refresh failed: {0}")]
    RefreshFailed(String),

    /// The authorization code could not be exchanged for tokens.
    #[error("QuickBooks authorization failed: {0}")]
    AuthorizationFailed(String),

    /// The access token was rejected mid-use (revoked upstream).
    #[error("QuickBooks rejected the access token")]
    Unauthorized,

    /// QuickBooks throttled the request.
    #[error("QuickBooks rate limit reached{}", retry_hint(.retry_after))]
    RateLimited { retry_after: Option<u64> },

    /// Any other non-2xx answer from the API.
    #[error("QuickBooks API error (HTTP {status}): {body}")]
    ExternalApi { status: u16, body: String },

    /// Timeout, DNS, TLS or connection failure.
    #[error("QuickBooks request failed: {0}")]
    Transport(String),

    /// A 2xx answer whose body could not be decoded.
    #[error("invalid QuickBooks response: {0}")]
    InvalidResponse(String),

    /// Reading or writing the stored credential failed.
    #[error("credential store error: {0}")]
    Store(String),

    #[error("invalid QuickBooks configuration: {0}")]
    Config(String),
}

fn retry_hint(retry_after: &Option<u64>) -> String {
    match retry_after {
        Some(secs) => format!("; retry in {secs}s"),
        None => "; retry later".to_string(),
    }
}

impl QuickBooksError {
    /// Stable machine-readable code used in API payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotConnected(_) => "not_connected",
            Self::RefreshFailed(_) => "refresh_failed",
            Self::AuthorizationFailed(_) => "authorization_failed",
            Self::Unauthorized => "unauthorized",
            Self::RateLimited { .. } => "rate_limited",
            Self::ExternalApi { .. } => "external_api_error",
            Self::Transport(_) => "transport_error",
            Self::InvalidResponse(_) => "invalid_response",
            Self::Store(_) => "store_error",
            Self::Config(_) => "config_error",
        }
    }

    /// True when the location needs to go through OAuth again.
    pub fn requires_reconnect(&self) -> bool {
        matches!(
            self,
            Self::NotConnected(_) | Self::RefreshFailed(_) | Self::Unauthorized
        )
    }
}

impl From<reqwest::Error> for QuickBooksError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Transport(format!("request timed out: {e}"))
        } else if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

pub type QuickBooksResult<T> = Result<T, QuickBooksError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_message_is_user_facing() {
        let err = QuickBooksError::RateLimited { retry_after: Some(30) };
        assert_eq!(err.to_string(), "QuickBooks rate limit reached; retry in 30s");
        assert_eq!(err.code(), "rate_limited");
        assert!(!err.requires_reconnect());
    }

    #[test]
    fn auth_failures_require_reconnect() {
        let loc = LocationTag::new("austin").unwrap();
        assert!(QuickBooksError::NotConnected(loc).requires_reconnect());
        assert!(QuickBooksError::Unauthorized.requires_reconnect());
        assert!(!QuickBooksError::Transport("boom".into()).requires_reconnect());
    }
}
