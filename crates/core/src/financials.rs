//! Externally reported figures per period.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Revenue and cost of goods for one period, as reported by QuickBooks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodFinancials {
    pub period_label: String,
    pub revenue: Decimal,
    pub cost_of_goods: Decimal,
    pub gross_profit: Decimal,
}

impl PeriodFinancials {
    pub fn new(period_label: impl Into<String>, revenue: Decimal, cost_of_goods: Decimal) -> Self {
        Self {
            period_label: period_label.into(),
            revenue,
            cost_of_goods,
            gross_profit: revenue - cost_of_goods,
        }
    }

    pub fn zero(period_label: impl Into<String>) -> Self {
        Self::new(period_label, Decimal::ZERO, Decimal::ZERO)
    }

    /// Add another location's figures for the same period.
    pub fn accumulate(&mut self, other: &PeriodFinancials) {
        self.revenue += other.revenue;
        self.cost_of_goods += other.cost_of_goods;
        self.gross_profit += other.gross_profit;
    }
}

/// Grand totals over a series of periods.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialTotals {
    pub revenue: Decimal,
    pub cost_of_goods: Decimal,
    pub gross_profit: Decimal,
}

impl FinancialTotals {
    pub fn from_periods<'a>(periods: impl IntoIterator<Item = &'a PeriodFinancials>) -> Self {
        periods.into_iter().fold(Self::default(), |mut acc, p| {
            acc.revenue += p.revenue;
            acc.cost_of_goods += p.cost_of_goods;
            acc.gross_profit += p.gross_profit;
            acc
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn gross_profit_is_revenue_minus_cogs() {
        let p = PeriodFinancials::new("2024-01", Decimal::new(100_000, 2), Decimal::new(40_050, 2));
        assert_eq!(p.gross_profit, Decimal::new(59_950, 2));
    }

    #[test]
    fn accumulate_and_totals() {
        let mut a = PeriodFinancials::new("2024-01", Decimal::from(100), Decimal::from(30));
        a.accumulate(&PeriodFinancials::new("2024-01", Decimal::from(50), Decimal::from(10)));
        assert_eq!(a.revenue, Decimal::from(150));
        assert_eq!(a.gross_profit, Decimal::from(110));

        let b = PeriodFinancials::new("2024-02", Decimal::from(10), Decimal::from(5));
        let totals = FinancialTotals::from_periods([&a, &b]);
        assert_eq!(totals.revenue, Decimal::from(160));
        assert_eq!(totals.cost_of_goods, Decimal::from(45));
        assert_eq!(totals.gross_profit, Decimal::from(115));
    }
}
