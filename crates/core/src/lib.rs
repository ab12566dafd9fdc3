//! `amy-core`: reporting domain building blocks.
//!
//! This crate contains **pure domain** logic (no HTTP, no database): period
//! bucketing, financial figures, reconciliation and ledger aggregation.

pub mod clock;
pub mod error;
pub mod financials;
pub mod ledger;
pub mod location;
pub mod period;
pub mod reconcile;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{DomainError, DomainResult};
pub use financials::{FinancialTotals, PeriodFinancials};
pub use ledger::{GroupBy, LedgerFilter, LedgerRow, ProfitabilitySummary};
pub use location::{LocationScope, LocationTag};
pub use period::{Granularity, PeriodWindow, split_into_periods};
pub use reconcile::{ComparisonRow, PeriodAmount, reconcile};
