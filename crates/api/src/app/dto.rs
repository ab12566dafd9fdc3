use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use amy_core::{
    ComparisonRow, DomainError, FinancialTotals, Granularity, GroupBy, LocationScope,
    PeriodFinancials,
    ProfitabilitySummary,
};
use amy_quickbooks::{AccountingMethod, LocationOutcome, QuickBooksError, RevenueReport};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueQuery {
    pub location: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub granularity: Option<String>,
    pub accounting_method: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketerProfitabilityQuery {
    pub location: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub group_by: Option<String>,
    pub granularity: Option<String>,
    pub include_quick_books: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LocationQuery {
    pub location: Option<String>,
}

/// Query string QuickBooks appends to the redirect URI.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub realm_id: Option<String>,
    pub error: Option<String>,
}

/// Validated report parameters shared by the revenue and profitability endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportParams {
    pub scope: LocationScope,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub granularity: Granularity,
}

impl ReportParams {
    pub fn parse(
        location: Option<&str>,
        start: Option<&str>,
        end: Option<&str>,
        granularity: Option<&str>,
    ) -> Result<Self, DomainError> {
        let start = parse_date("startDate", start)?;
        let end = parse_date("endDate", end)?;
        if start > end {
            return Err(DomainError::InvalidRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        let granularity = match granularity.map(str::trim).filter(|g| !g.is_empty()) {
            Some(g) => g.parse()?,
            None => Granularity::Monthly,
        };
        Ok(Self {
            scope: LocationScope::parse(location)?,
            start,
            end,
            granularity,
        })
    }
}

fn parse_date(field: &str, raw: Option<&str>) -> Result<NaiveDate, DomainError> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| DomainError::validation(format!("{field} is required (YYYY-MM-DD)")))?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        DomainError::validation(format!("{field} must be a date in YYYY-MM-DD format (got {raw})"))
    })
}

pub fn parse_accounting_method(raw: Option<&str>) -> Result<AccountingMethod, DomainError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(AccountingMethod::default()),
        Some(s) => s
            .parse()
            .map_err(|e: QuickBooksError| DomainError::validation(e.to_string())),
    }
}

pub fn parse_group_by(raw: Option<&str>) -> Result<GroupBy, DomainError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(GroupBy::default()),
        Some(s) => s.parse(),
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Quickbooks,
    Cache,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationErrorDto {
    pub location: String,
    pub code: String,
    pub message: String,
}

pub fn location_errors(outcomes: &[LocationOutcome]) -> Vec<LocationErrorDto> {
    outcomes
        .iter()
        .filter(|o| o.is_failure())
        .map(|o| LocationErrorDto {
            location: o.location.to_string(),
            code: o.error_code.clone().unwrap_or_default(),
            message: o.error.clone().unwrap_or_default(),
        })
        .collect()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueResponse {
    pub location: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub granularity: Granularity,
    pub accounting_method: AccountingMethod,
    pub data: Vec<PeriodFinancials>,
    pub totals: FinancialTotals,
    pub locations: Vec<LocationOutcome>,
    pub source: DataSource,
    pub errors: Vec<LocationErrorDto>,
}

impl RevenueResponse {
    pub fn new(
        params: &ReportParams,
        method: AccountingMethod,
        report: RevenueReport,
        source: DataSource,
    ) -> Self {
        Self {
            location: params.scope.key().to_string(),
            start_date: params.start,
            end_date: params.end,
            granularity: params.granularity,
            accounting_method: method,
            errors: location_errors(&report.locations),
            data: report.data,
            totals: report.totals,
            locations: report.locations,
            source,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickBooksComparison {
    pub granularity: Granularity,
    pub rows: Vec<ComparisonRow>,
    pub locations: Vec<LocationOutcome>,
    pub source: DataSource,
    pub errors: Vec<LocationErrorDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketerProfitabilityResponse {
    pub location: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub group_by: GroupBy,
    pub data: Vec<ProfitabilitySummary>,
    pub totals: ProfitabilitySummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quickbooks_comparison: Option<QuickBooksComparison>,
}
