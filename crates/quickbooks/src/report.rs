//! Profit-and-loss report fetching.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use amy_core::LocationTag;

use crate::credential::Credential;
use crate::error::{QuickBooksError, QuickBooksResult};
use crate::extract::{self, ReportSection};
use crate::oauth::retry_after_secs;
use crate::token_store::TokenStore;

pub const PRODUCTION_API_BASE: &str = "https://quickbooks.api.intuit.com/v3";
pub const SANDBOX_API_BASE: &str = "https://sandbox-quickbooks.api.intuit.com/v3";

/// Longest error body kept in `ExternalApi` errors.
const MAX_ERROR_BODY: usize = 512;

/// Basis the report is computed on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountingMethod {
    #[default]
    Accrual,
    Cash,
}

impl AccountingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accrual => "Accrual",
            Self::Cash => "Cash",
        }
    }
}

impl core::str::FromStr for AccountingMethod {
    type Err = QuickBooksError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "accrual" => Ok(Self::Accrual),
            "cash" => Ok(Self::Cash),
            other => Err(QuickBooksError::Config(format!(
                "accounting method must be Accrual or Cash (got {other})"
            ))),
        }
    }
}

/// Raw JSON report exactly as QuickBooks returned it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawReportTree(pub serde_json::Value);

impl RawReportTree {
    pub fn sections(&self) -> Vec<ReportSection> {
        extract::parse_sections(&self.0)
    }
}

/// Transport for the reports API, given an already valid credential.
#[async_trait]
pub trait ReportSource: Send + Sync {
    async fn profit_and_loss(
        &self,
        credential: &Credential,
        start: NaiveDate,
        end: NaiveDate,
        method: AccountingMethod,
    ) -> QuickBooksResult<RawReportTree>;
}

/// reqwest-backed QuickBooks reports client.
#[derive(Debug, Clone)]
pub struct QuickBooksClient {
    api_base: String,
    http: reqwest::Client,
}

impl QuickBooksClient {
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> QuickBooksResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| QuickBooksError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            http,
        })
    }
}

#[async_trait]
impl ReportSource for QuickBooksClient {
    #[instrument(
        skip(self, credential),
        fields(location = %credential.location, start = %start, end = %end),
        err
    )]
    async fn profit_and_loss(
        &self,
        credential: &Credential,
        start: NaiveDate,
        end: NaiveDate,
        method: AccountingMethod,
    ) -> QuickBooksResult<RawReportTree> {
        let url = format!(
            "{}/company/{}/reports/ProfitAndLoss",
            self.api_base, credential.realm_id
        );
        let start = start.format("%Y-%m-%d").to_string();
        let end = end.format("%Y-%m-%d").to_string();

        let resp = self
            .http
            .get(url)
            .bearer_auth(&credential.access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&[
                ("start_date", start.as_str()),
                ("end_date", end.as_str()),
                ("accounting_method", method.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            return resp
                .json::<RawReportTree>()
                .await
                .map_err(|e| QuickBooksError::InvalidResponse(format!("report body: {e}")));
        }

        let retry_after = retry_after_secs(resp.headers());
        let mut body = resp.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), "QuickBooks report request failed");

        match status {
            StatusCode::UNAUTHORIZED => Err(QuickBooksError::Unauthorized),
            StatusCode::TOO_MANY_REQUESTS => Err(QuickBooksError::RateLimited { retry_after }),
            _ => {
                truncate_on_char_boundary(&mut body, MAX_ERROR_BODY);
                Err(QuickBooksError::ExternalApi {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}

fn truncate_on_char_boundary(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
}

/// Location-aware report fetcher: obtains a valid credential, then fetches.
#[derive(Clone)]
pub struct ReportFetcher {
    tokens: Arc<TokenStore>,
    source: Arc<dyn ReportSource>,
}

impl ReportFetcher {
    pub fn new(tokens: Arc<TokenStore>, source: Arc<dyn ReportSource>) -> Self {
        Self { tokens, source }
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    /// Refresh (if needed) strictly before the fetch that uses the token.
    pub async fn fetch_profit_and_loss(
        &self,
        location: &LocationTag,
        start: NaiveDate,
        end: NaiveDate,
        method: AccountingMethod,
    ) -> QuickBooksResult<RawReportTree> {
        let credential = self.tokens.get_valid_credential(location).await?;
        self.source
            .profit_and_loss(&credential, start, end, method)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accounting_method_parses_case_insensitively() {
        assert_eq!("cash".parse::<AccountingMethod>().unwrap(), AccountingMethod::Cash);
        assert_eq!("Accrual".parse::<AccountingMethod>().unwrap(), AccountingMethod::Accrual);
        assert!("modified".parse::<AccountingMethod>().is_err());
    }

    #[test]
    fn error_bodies_are_truncated_on_char_boundaries() {
        let mut s = "é".repeat(400);
        truncate_on_char_boundary(&mut s, 513);
        assert!(s.len() <= 513);
        assert!(s.chars().all(|c| c == 'é'));
    }
}
