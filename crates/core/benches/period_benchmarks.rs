use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use amy_core::ledger::{LedgerRow, revenue_by_period};
use amy_core::{Granularity, split_into_periods};
use chrono::NaiveDate;
use rust_decimal::Decimal;

fn ledger_rows(years: i32) -> Vec<LedgerRow> {
    let mut rows = Vec::new();
    for year in 2020..2020 + years {
        for month in 1..=12 {
            for marketer in ["alice", "bob", "carol"] {
                rows.push(LedgerRow {
                    location: "main".to_string(),
                    marketer_name: marketer.to_string(),
                    patient_state: "TX".to_string(),
                    year,
                    month,
                    transaction_count: 10,
                    acquisition_cost: Decimal::from(100),
                    shipping_charged_to_pt: Decimal::from(20),
                    shipping_cost_actual: Decimal::from(15),
                    total_pt_paid: Decimal::from(1_000),
                    profit_after_product: Decimal::from(600),
                    net_profit: Decimal::from(500),
                });
            }
        }
    }
    rows
}

fn bench_split_into_periods(c: &mut Criterion) {
    let mut group = c.benchmark_group("split_into_periods");
    let start = NaiveDate::from_ymd_opt(2000, 1, 15).unwrap();

    for years in [1i64, 10, 50] {
        let end = start + chrono::Duration::days(365 * years);
        group.bench_with_input(BenchmarkId::new("monthly", years), &end, |b, &end| {
            b.iter(|| split_into_periods(black_box(start), black_box(end), Granularity::Monthly).unwrap());
        });
    }

    group.finish();
}

fn bench_revenue_by_period(c: &mut Criterion) {
    let rows = ledger_rows(5);
    let windows = split_into_periods(
        NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
        Granularity::Quarterly,
    )
    .unwrap();

    c.bench_function("revenue_by_period_quarterly_5y", |b| {
        b.iter(|| revenue_by_period(black_box(&rows), black_box(&windows), Granularity::Quarterly));
    });
}

criterion_group!(benches, bench_split_into_periods, bench_revenue_by_period);
criterion_main!(benches);
