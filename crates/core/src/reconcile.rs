//! Internal ledger vs. QuickBooks reconciliation.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::financials::PeriodFinancials;

/// An internally tracked amount for one period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodAmount {
    pub period_label: String,
    pub amount: Decimal,
}

impl PeriodAmount {
    pub fn new(period_label: impl Into<String>, amount: Decimal) -> Self {
        Self {
            period_label: period_label.into(),
            amount,
        }
    }
}

/// One reconciled period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonRow {
    pub period_label: String,
    pub internal_revenue: Decimal,
    pub external_revenue: Decimal,
    pub external_cogs: Decimal,
    pub external_gross_profit: Decimal,
    /// `internal_revenue - external_revenue`.
    pub variance: Decimal,
    /// `variance / external_revenue * 100`, rounded to 2 places; 0 when external revenue is 0.
    pub variance_percentage: Decimal,
}

impl ComparisonRow {
    pub fn new(
        period_label: impl Into<String>,
        internal_revenue: Decimal,
        external: Option<&PeriodFinancials>,
    ) -> Self {
        let (external_revenue, external_cogs, external_gross_profit) = match external {
            Some(f) => (f.revenue, f.cost_of_goods, f.gross_profit),
            None => (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO),
        };
        let variance = internal_revenue - external_revenue;

        Self {
            period_label: period_label.into(),
            internal_revenue,
            external_revenue,
            external_cogs,
            external_gross_profit,
            variance,
            variance_percentage: variance_percentage(variance, external_revenue),
        }
    }
}

/// Join internal totals with external figures on the period label.
///
/// Output follows the order of `internal`. Periods missing on the external
/// side are reported with zero external figures (full variance).
pub fn reconcile(
    internal: &[PeriodAmount],
    external: &HashMap<String, PeriodFinancials>,
) -> Vec<ComparisonRow> {
    internal
        .iter()
        .map(|p| {
            ComparisonRow::new(p.period_label.clone(), p.amount, external.get(&p.period_label))
        })
        .collect()
}

fn variance_percentage(variance: Decimal, external_revenue: Decimal) -> Decimal {
    if external_revenue.is_zero() {
        return Decimal::ZERO;
    }
    variance
        .checked_div(external_revenue)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .map(|pct| pct.round_dp(2))
        .unwrap_or(Decimal::ZERO)
}
