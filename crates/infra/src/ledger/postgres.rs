//! Postgres-backed ledger reads from `marketer_profitability_monthly`.
//!
//! The table is owned by the reporting pipeline; this side only reads it.
//! Columns are cast in SQL so integer and numeric widths in the table do not
//! leak into decoding.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use tracing::{Span, instrument, warn};

use amy_core::{LedgerFilter, LedgerRow};

use super::{LedgerError, LedgerRepository};

#[derive(Debug, Clone)]
pub struct PostgresLedgerRepository {
    pool: Arc<PgPool>,
}

impl PostgresLedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl LedgerRepository for PostgresLedgerRepository {
    #[instrument(
        skip(self, filter),
        fields(start = %filter.start, end = %filter.end, row_count = tracing::field::Empty),
        err
    )]
    async fn rows(&self, filter: &LedgerFilter) -> Result<Vec<LedgerRow>, LedgerError> {
        let (first_year, first_month) = filter.first_month();
        let (last_year, last_month) = filter.last_month();
        let first = i64::from(first_year) * 12 + i64::from(first_month);
        let last = i64::from(last_year) * 12 + i64::from(last_month);
        let locations: Option<Vec<String>> = filter
            .locations
            .as_ref()
            .map(|tags| tags.iter().map(|t| t.as_str().to_string()).collect());

        let rows = sqlx::query(
            r#"
            SELECT
                location::text AS location,
                marketer_name::text AS marketer_name,
                patient_state::text AS patient_state,
                year::int4 AS year,
                month::int4 AS month,
                transaction_count::int8 AS transaction_count,
                acquisition_cost::numeric AS acquisition_cost,
                shipping_charged_to_pt::numeric AS shipping_charged_to_pt,
                shipping_cost_actual::numeric AS shipping_cost_actual,
                total_pt_paid::numeric AS total_pt_paid,
                profit_after_product::numeric AS profit_after_product,
                net_profit::numeric AS net_profit
            FROM marketer_profitability_monthly
            WHERE (year::int8 * 12 + month::int8) BETWEEN $1 AND $2
              AND ($3::text[] IS NULL OR lower(location) = ANY($3))
            ORDER BY year, month, location, marketer_name
            "#,
        )
        .bind(first)
        .bind(last)
        .bind(locations)
        .fetch_all(&*self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let decoded = ledger_row_from_pg(row)
                .map_err(|e| LedgerError::Query(format!("failed to decode ledger row: {e}")))?;
            if let Some(decoded) = decoded {
                out.push(decoded);
            }
        }

        Span::current().record("row_count", out.len());
        Ok(out)
    }
}

/// `None` for rows whose month is not a calendar month; they are logged and skipped.
fn ledger_row_from_pg(row: &sqlx::postgres::PgRow) -> Result<Option<LedgerRow>, sqlx::Error> {
    let raw_month: i32 = row.try_get("month")?;
    let Some(month) = calendar_month(raw_month) else {
        warn!(
            month = raw_month,
            location = ?row.try_get::<Option<String>, _>("location").ok().flatten(),
            "skipping ledger row with invalid month"
        );
        return Ok(None);
    };
    let money = |col: &str| -> Result<Decimal, sqlx::Error> {
        Ok(row.try_get::<Option<Decimal>, _>(col)?.unwrap_or(Decimal::ZERO))
    };

    Ok(Some(LedgerRow {
        location: row.try_get::<Option<String>, _>("location")?.unwrap_or_default(),
        marketer_name: row
            .try_get::<Option<String>, _>("marketer_name")?
            .unwrap_or_else(|| "Unknown".to_string()),
        patient_state: row
            .try_get::<Option<String>, _>("patient_state")?
            .unwrap_or_else(|| "Unknown".to_string()),
        year: row.try_get("year")?,
        month,
        transaction_count: row.try_get::<Option<i64>, _>("transaction_count")?.unwrap_or(0),
        acquisition_cost: money("acquisition_cost")?,
        shipping_charged_to_pt: money("shipping_charged_to_pt")?,
        shipping_cost_actual: money("shipping_cost_actual")?,
        total_pt_paid: money("total_pt_paid")?,
        profit_after_product: money("profit_after_product")?,
        net_profit: money("net_profit")?,
    }))
}

fn calendar_month(raw: i32) -> Option<u32> {
    u32::try_from(raw).ok().filter(|m| (1..=12).contains(m))
}

fn map_sqlx_error(err: sqlx::Error) -> LedgerError {
    match err {
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
            LedgerError::Unavailable(err.to_string())
        }
        sqlx::Error::Database(db_err) => LedgerError::Query(db_err.message().to_string()),
        other => LedgerError::Query(other.to_string()),
    }
}
