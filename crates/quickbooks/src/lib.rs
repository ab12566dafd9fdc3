//! `amy-quickbooks`: QuickBooks Online integration.
//!
//! - `oauth`: authorize URL, code exchange and token refresh
//! - `credential` / `token_store`: per-location credentials and refresh-before-use
//! - `report` / `extract`: profit-and-loss fetch and tolerant parsing
//! - `revenue`: multi-location fan-out and summing

pub mod credential;
pub mod error;
pub mod extract;
pub mod oauth;
pub mod report;
pub mod revenue;
pub mod token_store;

pub use credential::{
    Credential, CredentialStore, CredentialStoreError, InMemoryCredentialStore, TokenGrant,
};
pub use error::{QuickBooksError, QuickBooksResult};
pub use oauth::{OAuthClient, OAuthConfig, TokenRefresher};
pub use report::{AccountingMethod, QuickBooksClient, RawReportTree, ReportFetcher, ReportSource};
pub use revenue::{LocationOutcome, LocationState, RevenueAggregator, RevenueReport};
pub use token_store::{ConnectionStatus, TokenStore};
