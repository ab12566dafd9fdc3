//! Calendar period bucketing.
//!
//! A `[start, end]` date range is split into contiguous windows aligned to
//! calendar months, quarters or years. Only the first window may start in the
//! middle of its unit and only the last one may end early; every window is
//! labelled with the nominal period it belongs to.

use core::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Bucketing unit for time-series aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[serde(alias = "month")]
    Monthly,
    #[serde(alias = "quarter")]
    Quarterly,
    #[serde(alias = "year")]
    Yearly,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Yearly => "yearly",
        }
    }

    /// Label of the period containing `year`/`month` (1-based month).
    ///
    /// `YYYY` for years, `YYYY-Q{n}` for quarters, `YYYY-MM` for months.
    pub fn label_for_month(&self, year: i32, month: u32) -> String {
        match self {
            Self::Monthly => format!("{year:04}-{month:02}"),
            Self::Quarterly => format!("{year:04}-Q{}", quarter_of(month)),
            Self::Yearly => format!("{year:04}"),
        }
    }

    pub fn label_for(&self, date: NaiveDate) -> String {
        self.label_for_month(date.year(), date.month())
    }

    /// Last day of the unit that contains `date`.
    fn unit_end(&self, date: NaiveDate) -> Option<NaiveDate> {
        let last_month = match self {
            Self::Monthly => date.month(),
            Self::Quarterly => quarter_of(date.month()) * 3,
            Self::Yearly => 12,
        };
        last_day_of_month(date.year(), last_month)
    }
}

impl core::fmt::Display for Granularity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "month" | "monthly" => Ok(Self::Monthly),
            "quarter" | "quarterly" => Ok(Self::Quarterly),
            "year" | "yearly" | "annual" => Ok(Self::Yearly),
            other => Err(DomainError::UnknownGranularity(other.to_string())),
        }
    }
}

/// One bucket of a split date range (both ends inclusive).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodWindow {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub label: String,
}

/// Split `[start, end]` into ordered, contiguous, non-overlapping windows.
pub fn split_into_periods(
    start: NaiveDate,
    end: NaiveDate,
    granularity: Granularity,
) -> DomainResult<Vec<PeriodWindow>> {
    if start > end {
        return Err(DomainError::InvalidRange {
            start: start.to_string(),
            end: end.to_string(),
        });
    }

    let mut windows = Vec::new();
    let mut cursor = start;
    loop {
        let natural_end = granularity
            .unit_end(cursor)
            .ok_or_else(|| DomainError::validation(format!("date out of range: {cursor}")))?;
        let window_end = natural_end.min(end);

        windows.push(PeriodWindow {
            start_date: cursor,
            end_date: window_end,
            label: granularity.label_for(cursor),
        });

        if window_end >= end {
            break;
        }
        // window_end was the natural end of the unit, so this is the 1st of the next one.
        cursor = window_end
            .succ_opt()
            .ok_or_else(|| DomainError::validation(format!("date out of range: {window_end}")))?;
    }

    Ok(windows)
}

/// Out-of-range months clamp to the nearest calendar month.
fn quarter_of(month: u32) -> u32 {
    (month.clamp(1, 12) - 1) / 3 + 1
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 {
        (year.checked_add(1)?, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}
