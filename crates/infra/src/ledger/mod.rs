//! Read access to the internal marketer profitability ledger.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use thiserror::Error;

use amy_core::{LedgerFilter, LedgerRow};

mod postgres;

pub use postgres::PostgresLedgerRepository;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("ledger database unavailable: {0}")]
    Unavailable(String),

    #[error("ledger query failed: {0}")]
    Query(String),
}

#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// Rows matching `filter`, ordered by year, month, location, marketer.
    async fn rows(&self, filter: &LedgerFilter) -> Result<Vec<LedgerRow>, LedgerError>;
}

#[async_trait]
impl<R> LedgerRepository for Arc<R>
where
    R: LedgerRepository + ?Sized,
{
    async fn rows(&self, filter: &LedgerFilter) -> Result<Vec<LedgerRow>, LedgerError> {
        (**self).rows(filter).await
    }
}

/// In-memory ledger for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryLedgerRepository {
    rows: RwLock<Vec<LedgerRow>>,
}

impl InMemoryLedgerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<LedgerRow>) -> Self {
        Self {
            rows: RwLock::new(rows),
        }
    }

    pub fn insert(&self, row: LedgerRow) {
        match self.rows.write() {
            Ok(mut rows) => rows.push(row),
            Err(poisoned) => poisoned.into_inner().push(row),
        }
    }
}

#[async_trait]
impl LedgerRepository for InMemoryLedgerRepository {
    async fn rows(&self, filter: &LedgerFilter) -> Result<Vec<LedgerRow>, LedgerError> {
        let rows = self
            .rows
            .read()
            .map_err(|_| LedgerError::Unavailable("ledger lock poisoned".into()))?;
        let mut out: Vec<LedgerRow> = rows.iter().filter(|r| filter.matches(r)).cloned().collect();
        out.sort_by(|a, b| {
            (a.year, a.month, &a.location, &a.marketer_name)
                .cmp(&(b.year, b.month, &b.location, &b.marketer_name))
        });
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amy_core::LocationTag;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn row(location: &str, marketer: &str, year: i32, month: u32) -> LedgerRow {
        LedgerRow {
            location: location.into(),
            marketer_name: marketer.into(),
            patient_state: "TX".into(),
            year,
            month,
            transaction_count: 3,
            acquisition_cost: Decimal::from(30),
            shipping_charged_to_pt: Decimal::from(9),
            shipping_cost_actual: Decimal::from(7),
            total_pt_paid: Decimal::from(120),
            profit_after_product: Decimal::from(90),
            net_profit: Decimal::from(60),
        }
    }

    #[tokio::test]
    async fn in_memory_filters_and_orders_rows() {
        let repo = InMemoryLedgerRepository::with_rows(vec![
            row("Dallas", "zed", 2024, 2),
            row("Austin", "amy", 2024, 3),
            row("Austin", "bob", 2024, 2),
            row("Austin", "bob", 2023, 12),
        ]);
        repo.insert(row("Austin", "cal", 2024, 5));

        let filter = LedgerFilter {
            locations: Some(vec![LocationTag::new("austin").unwrap()]),
            start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        };
        let rows = repo.rows(&filter).await.unwrap();

        let seen: Vec<_> = rows.iter().map(|r| (r.month, r.marketer_name.as_str())).collect();
        assert_eq!(seen, vec![(2, "bob"), (3, "amy")]);
    }
}
