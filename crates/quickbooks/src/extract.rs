//! Tolerant profit-and-loss report parsing.
//!
//! QuickBooks reports are a tree of `Rows.Row[]` entries. Sections carry a
//! `Header`, nested `Rows` and a `Summary` whose last column is the section
//! total. The vendor does not guarantee this shape, so parsing never fails:
//! anything unrecognised becomes an `Other` section or is skipped, and missing
//! totals read as zero.

use core::str::FromStr;

use rust_decimal::Decimal;
use serde_json::Value;

use amy_core::PeriodFinancials;

use crate::report::RawReportTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Income,
    Cogs,
    Other,
}

/// One report section reduced to what the reconciliation needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSection {
    pub kind: SectionKind,
    pub title: String,
    pub summary_total: Option<Decimal>,
}

/// Flatten every section of the report, depth first, in document order.
pub fn parse_sections(tree: &Value) -> Vec<ReportSection> {
    let mut out = Vec::new();
    collect_sections(tree, &mut out);
    out
}

fn collect_sections(node: &Value, out: &mut Vec<ReportSection>) {
    let Some(rows) = node
        .get("Rows")
        .and_then(|r| r.get("Row"))
        .and_then(Value::as_array)
    else {
        return;
    };

    for row in rows {
        let is_section = row.get("type").and_then(Value::as_str) == Some("Section")
            || row.get("Header").is_some()
            || row.get("Summary").is_some();
        if !is_section {
            continue;
        }

        let title = first_col(row.get("Header"))
            .or_else(|| first_col(row.get("Summary")))
            .unwrap_or_default();
        let group = row.get("group").and_then(Value::as_str);

        out.push(ReportSection {
            kind: classify(group, &title),
            summary_total: last_col_amount(row.get("Summary")),
            title,
        });

        collect_sections(row, out);
    }
}

fn classify(group: Option<&str>, title: &str) -> SectionKind {
    match group {
        Some("Income") => return SectionKind::Income,
        Some("COGS") => return SectionKind::Cogs,
        _ => {}
    }

    let title = title.trim().to_ascii_lowercase();
    let title = title.strip_prefix("total ").unwrap_or(title.as_str());
    match title {
        "income" | "revenue" | "revenues" | "sales" => SectionKind::Income,
        "cost of goods sold" | "cost of sales" | "cogs" => SectionKind::Cogs,
        _ => SectionKind::Other,
    }
}

fn col_data(part: Option<&Value>) -> Option<&Vec<Value>> {
    part?.get("ColData")?.as_array()
}

fn first_col(part: Option<&Value>) -> Option<String> {
    col_data(part)?
        .first()?
        .get("value")?
        .as_str()
        .map(|s| s.trim().to_string())
}

fn last_col_amount(part: Option<&Value>) -> Option<Decimal> {
    let value = col_data(part)?.last()?.get("value")?;
    match value {
        Value::String(s) => parse_amount(s),
        Value::Number(n) => parse_amount(&n.to_string()),
        _ => None,
    }
}

/// Parse a report amount: `1,234.56`, `-12.5`, `$40`, `(99.00)`.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let (negative, body) = match trimmed.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        Some(inner) => (true, inner),
        None => (false, trimmed),
    };
    let cleaned: String = body.chars().filter(|c| *c != ',' && *c != '$').collect();
    let amount = Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .ok()?;
    Some(if negative { -amount } else { amount })
}

fn first_total(sections: &[ReportSection], kind: SectionKind) -> Decimal {
    sections
        .iter()
        .find(|s| s.kind == kind)
        .and_then(|s| s.summary_total)
        .unwrap_or(Decimal::ZERO)
}

/// Total income of the report, 0 when absent.
pub fn extract_revenue(tree: &RawReportTree) -> Decimal {
    first_total(&tree.sections(), SectionKind::Income)
}

/// Total cost of goods sold, 0 when absent.
pub fn extract_cogs(tree: &RawReportTree) -> Decimal {
    first_total(&tree.sections(), SectionKind::Cogs)
}

/// Both figures for one period, parsing the tree once.
pub fn period_financials(label: impl Into<String>, tree: &RawReportTree) -> PeriodFinancials {
    let sections = tree.sections();
    PeriodFinancials::new(
        label,
        first_total(&sections, SectionKind::Income),
        first_total(&sections, SectionKind::Cogs),
    )
}
