//! Multi-location revenue aggregation.
//!
//! Each location is fetched window by window (its token refresh strictly
//! precedes its first fetch). Locations fan out through a bounded,
//! order-preserving stream so the output never depends on completion order.
//! A failing location contributes nothing to the sums and is reported in
//! `RevenueReport::locations`.

use std::collections::HashMap;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use amy_core::financials::FinancialTotals;
use amy_core::{LocationTag, PeriodFinancials, PeriodWindow};

use crate::error::{QuickBooksError, QuickBooksResult};
use crate::extract;
use crate::report::{AccountingMethod, ReportFetcher};

/// Provenance of one location's contribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationState {
    Fresh,
    Cached,
    Error,
    NotConnected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationOutcome {
    pub location: LocationTag,
    pub state: LocationState,
    /// Machine-readable error code (`rate_limited`, `unauthorized`, ...).
    pub error_code: Option<String>,
    pub error: Option<String>,
}

impl LocationOutcome {
    fn fresh(location: LocationTag) -> Self {
        Self {
            location,
            state: LocationState::Fresh,
            error_code: None,
            error: None,
        }
    }

    fn failed(location: LocationTag, err: &QuickBooksError) -> Self {
        let state = match err {
            QuickBooksError::NotConnected(_) => LocationState::NotConnected,
            _ => LocationState::Error,
        };
        Self {
            location,
            state,
            error_code: Some(err.code().to_string()),
            error: Some(err.to_string()),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.state, LocationState::Error | LocationState::NotConnected)
    }
}

/// Summed external figures per window plus per-location provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueReport {
    /// One entry per window, in window order.
    pub data: Vec<PeriodFinancials>,
    pub totals: FinancialTotals,
    pub locations: Vec<LocationOutcome>,
}

impl RevenueReport {
    pub fn has_failures(&self) -> bool {
        self.locations.iter().any(LocationOutcome::is_failure)
    }

    /// External figures keyed by period label, for reconciliation.
    pub fn by_period(&self) -> HashMap<String, PeriodFinancials> {
        self.data
            .iter()
            .map(|p| (p.period_label.clone(), p.clone()))
            .collect()
    }

    /// Copy of this report marked as served from cache.
    pub fn as_cached(&self) -> Self {
        let mut report = self.clone();
        for outcome in &mut report.locations {
            if outcome.state == LocationState::Fresh {
                outcome.state = LocationState::Cached;
            }
        }
        report
    }
}

pub struct RevenueAggregator {
    fetcher: ReportFetcher,
    concurrency: usize,
}

impl RevenueAggregator {
    pub fn new(fetcher: ReportFetcher, concurrency: usize) -> Self {
        Self {
            fetcher,
            concurrency: concurrency.max(1),
        }
    }

    /// One location's figures for every window; the first failure aborts the location.
    pub async fn location_financials(
        &self,
        location: &LocationTag,
        windows: &[PeriodWindow],
        method: AccountingMethod,
    ) -> QuickBooksResult<Vec<PeriodFinancials>> {
        let mut out = Vec::with_capacity(windows.len());
        for window in windows {
            let tree = self
                .fetcher
                .fetch_profit_and_loss(location, window.start_date, window.end_date, method)
                .await?;
            out.push(extract::period_financials(window.label.clone(), &tree));
        }
        Ok(out)
    }

    /// Sum every location's figures per window, tolerating per-location failures.
    pub async fn aggregate(
        &self,
        locations: &[LocationTag],
        windows: &[PeriodWindow],
        method: AccountingMethod,
    ) -> RevenueReport {
        let results: Vec<(LocationTag, QuickBooksResult<Vec<PeriodFinancials>>)> =
            stream::iter(locations.iter().cloned())
                .map(|location| async move {
                    let result = self.location_financials(&location, windows, method).await;
                    (location, result)
                })
                .buffered(self.concurrency)
                .collect()
                .await;

        let mut data: Vec<PeriodFinancials> = windows
            .iter()
            .map(|w| PeriodFinancials::zero(w.label.clone()))
            .collect();
        let mut outcomes = Vec::with_capacity(results.len());

        for (location, result) in results {
            match result {
                Ok(series) => {
                    for (slot, figures) in data.iter_mut().zip(series.iter()) {
                        slot.accumulate(figures);
                    }
                    outcomes.push(LocationOutcome::fresh(location));
                }
                Err(e) => {
                    warn!(
                        location = %location,
                        error = %e,
                        code = e.code(),
                        "QuickBooks revenue fetch failed for location"
                    );
                    outcomes.push(LocationOutcome::failed(location, &e));
                }
            }
        }

        let failed = outcomes.iter().filter(|o| o.is_failure()).count();
        info!(
            locations = outcomes.len(),
            failed,
            windows = windows.len(),
            "QuickBooks revenue aggregated"
        );

        RevenueReport {
            totals: FinancialTotals::from_periods(&data),
            data,
            locations: outcomes,
        }
    }
}
