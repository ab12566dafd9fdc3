//! Infrastructure layer: Postgres stores, response cache, config.

pub mod cache;
pub mod config;
pub mod credentials;
pub mod ledger;

pub use cache::{CacheKey, ResponseCache};
pub use config::{AppConfig, ConfigError, QuickBooksEnvironment, QuickBooksSettings};
pub use credentials::PostgresCredentialStore;
pub use ledger::{InMemoryLedgerRepository, LedgerError, LedgerRepository, PostgresLedgerRepository};
