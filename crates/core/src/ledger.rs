//! Internal marketer profitability ledger (monthly rows per location).

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::location::LocationTag;
use crate::period::{Granularity, PeriodWindow};
use crate::reconcile::PeriodAmount;

/// One row of the internal per-location, per-month ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRow {
    pub location: String,
    pub marketer_name: String,
    pub patient_state: String,
    pub year: i32,
    /// 1-based calendar month.
    pub month: u32,
    pub transaction_count: i64,
    pub acquisition_cost: Decimal,
    pub shipping_charged_to_pt: Decimal,
    pub shipping_cost_actual: Decimal,
    pub total_pt_paid: Decimal,
    pub profit_after_product: Decimal,
    pub net_profit: Decimal,
}

impl LedgerRow {
    /// `(year, month)` as a single comparable ordinal.
    fn month_ordinal(&self) -> i64 {
        i64::from(self.year) * 12 + i64::from(self.month)
    }

    fn group_key(&self, group_by: GroupBy) -> &str {
        match group_by {
            GroupBy::Marketer => &self.marketer_name,
            GroupBy::State => &self.patient_state,
            GroupBy::Location => &self.location,
        }
    }
}

/// Row selection: locations plus the months overlapping `[start, end]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerFilter {
    /// `None` selects every location.
    pub locations: Option<Vec<LocationTag>>,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl LedgerFilter {
    pub fn first_month(&self) -> (i32, u32) {
        (self.start.year(), self.start.month())
    }

    pub fn last_month(&self) -> (i32, u32) {
        (self.end.year(), self.end.month())
    }

    pub fn matches(&self, row: &LedgerRow) -> bool {
        let (sy, sm) = self.first_month();
        let (ey, em) = self.last_month();
        let first = i64::from(sy) * 12 + i64::from(sm);
        let last = i64::from(ey) * 12 + i64::from(em);
        if !(1..=12).contains(&row.month) {
            return false;
        }
        let month = row.month_ordinal();
        if month < first || month > last {
            return false;
        }
        match &self.locations {
            None => true,
            Some(tags) => tags
                .iter()
                .any(|t| row.location.eq_ignore_ascii_case(t.as_str())),
        }
    }
}

/// Dimension for profitability summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    #[default]
    Marketer,
    State,
    Location,
}

impl core::str::FromStr for GroupBy {
    type Err = crate::error::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "marketer" => Ok(Self::Marketer),
            "state" | "patient_state" => Ok(Self::State),
            "location" => Ok(Self::Location),
            other => Err(crate::error::DomainError::validation(format!(
                "groupBy must be one of: marketer, state, location (got {other})"
            ))),
        }
    }
}

/// Summed ledger figures for one group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfitabilitySummary {
    pub key: String,
    pub transaction_count: i64,
    pub acquisition_cost: Decimal,
    pub shipping_charged_to_pt: Decimal,
    pub shipping_cost_actual: Decimal,
    pub total_pt_paid: Decimal,
    pub profit_after_product: Decimal,
    pub net_profit: Decimal,
    /// `net_profit / total_pt_paid * 100`, 0 when nothing was paid.
    pub profit_margin: Decimal,
}

impl ProfitabilitySummary {
    fn empty(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    fn add(&mut self, row: &LedgerRow) {
        self.transaction_count += row.transaction_count;
        self.acquisition_cost += row.acquisition_cost;
        self.shipping_charged_to_pt += row.shipping_charged_to_pt;
        self.shipping_cost_actual += row.shipping_cost_actual;
        self.total_pt_paid += row.total_pt_paid;
        self.profit_after_product += row.profit_after_product;
        self.net_profit += row.net_profit;
    }

    fn finish(mut self) -> Self {
        self.profit_margin = if self.total_pt_paid.is_zero() {
            Decimal::ZERO
        } else {
            self.net_profit
                .checked_div(self.total_pt_paid)
                .and_then(|r| r.checked_mul(Decimal::ONE_HUNDRED))
                .map(|m| m.round_dp(2))
                .unwrap_or(Decimal::ZERO)
        };
        self
    }

    /// Grand total over all rows.
    pub fn total<'a>(rows: impl IntoIterator<Item = &'a LedgerRow>) -> Self {
        let mut total = Self::empty("Total");
        for row in rows {
            total.add(row);
        }
        total.finish()
    }
}

/// Group rows and sum them; ordered by net profit, highest first, then by key.
pub fn summarize(rows: &[LedgerRow], group_by: GroupBy) -> Vec<ProfitabilitySummary> {
    let mut groups: HashMap<&str, ProfitabilitySummary> = HashMap::new();
    for row in rows {
        let key = row.group_key(group_by);
        match groups.entry(key) {
            Entry::Occupied(mut e) => e.get_mut().add(row),
            Entry::Vacant(e) => e.insert(ProfitabilitySummary::empty(key)).add(row),
        }
    }

    let mut out: Vec<_> = groups.into_values().map(ProfitabilitySummary::finish).collect();
    out.sort_by(|a, b| b.net_profit.cmp(&a.net_profit).then_with(|| a.key.cmp(&b.key)));
    out
}

/// Internal revenue (`total_pt_paid`) per window, newest window first.
///
/// A monthly row counts toward the window whose label its month maps to;
/// rows outside every window are ignored and windows without rows report 0.
pub fn revenue_by_period(
    rows: &[LedgerRow],
    windows: &[PeriodWindow],
    granularity: Granularity,
) -> Vec<PeriodAmount> {
    let mut by_label: HashMap<String, Decimal> = HashMap::new();
    for row in rows {
        *by_label
            .entry(granularity.label_for_month(row.year, row.month))
            .or_insert(Decimal::ZERO) += row.total_pt_paid;
    }

    windows
        .iter()
        .rev()
        .map(|w| {
            let amount = by_label.get(&w.label).copied().unwrap_or(Decimal::ZERO);
            PeriodAmount::new(w.label.clone(), amount)
        })
        .collect()
}
