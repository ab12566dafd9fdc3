use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use amy_core::ledger::{revenue_by_period, summarize};
use amy_core::{ProfitabilitySummary, reconcile};
use amy_quickbooks::AccountingMethod;

use crate::app::dto::{
    self, MarketerProfitabilityQuery, MarketerProfitabilityResponse, QuickBooksComparison,
    ReportParams,
};
use crate::app::errors;
use crate::app::services::AppServices;

/// Internal ledger aggregates, optionally reconciled against QuickBooks revenue.
pub async fn marketer_profitability(
    Extension(services): Extension<Arc<AppServices>>,
    Query(q): Query<MarketerProfitabilityQuery>,
) -> axum::response::Response {
    let params = match ReportParams::parse(
        q.location.as_deref(),
        q.start_date.as_deref(),
        q.end_date.as_deref(),
        q.granularity.as_deref(),
    ) {
        Ok(p) => p,
        Err(e) => return errors::domain_error_to_response(e),
    };
    let group_by = match dto::parse_group_by(q.group_by.as_deref()) {
        Ok(g) => g,
        Err(e) => return errors::domain_error_to_response(e),
    };
    if let Err(e) = params.scope.resolve(services.locations()) {
        return errors::domain_error_to_response(e);
    }

    let rows = match services.ledger_rows(&params).await {
        Ok(r) => r,
        Err(e) => return errors::ledger_error_to_response(e),
    };

    let quickbooks_comparison = if q.include_quick_books.unwrap_or(false) {
        let windows = match services.windows(&params) {
            Ok(w) => w,
            Err(e) => return errors::domain_error_to_response(e),
        };
        let lookup = match services.revenue(&params, AccountingMethod::Accrual).await {
            Ok(l) => l,
            Err(e) => return errors::domain_error_to_response(e),
        };
        let internal = revenue_by_period(&rows, &windows, params.granularity);
        Some(QuickBooksComparison {
            granularity: params.granularity,
            rows: reconcile(&internal, &lookup.report.by_period()),
            errors: dto::location_errors(&lookup.report.locations),
            locations: lookup.report.locations,
            source: lookup.source,
        })
    } else {
        None
    };

    (
        StatusCode::OK,
        Json(MarketerProfitabilityResponse {
            location: params.scope.key().to_string(),
            start_date: params.start,
            end_date: params.end,
            group_by,
            data: summarize(&rows, group_by),
            totals: ProfitabilitySummary::total(&rows),
            quickbooks_comparison,
        }),
    )
        .into_response()
}
