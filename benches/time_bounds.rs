use air_quality_stats::TimeSeriesDataset;
use air_quality_stats::time::time_bounds;
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use polars::prelude::*;

const ROWS: i64 = 100_000;

/// Hourly observations from 2020-01-01 with a shuffled-looking order
fn hourly_frame() -> DataFrame {
    let base = 1_577_836_800i64 * 1_000_000_000;
    let hour = 3_600i64 * 1_000_000_000;
    let stamps: Vec<i64> = (0..ROWS).map(|i| base + ((i * 7_919) % ROWS) * hour).collect();
    let conc: Vec<f64> = (0..ROWS).map(|i| (i % 97) as f64 * 0.5).collect();

    let datetime = Series::new("datetime".into(), stamps)
        .cast(&DataType::Datetime(TimeUnit::Nanoseconds, None))
        .unwrap();
    DataFrame::new(vec![datetime.into(), Column::new("conc".into(), conc)]).unwrap()
}

fn bench_time_bounds(c: &mut Criterion) {
    let dataset = TimeSeriesDataset::new(hourly_frame(), "datetime").unwrap();

    c.bench_function("time_bounds_100k", |b| {
        b.iter(|| time_bounds(black_box(dataset.lazy()), "datetime").unwrap())
    });
}

criterion_group!(benches, bench_time_bounds);
criterion_main!(benches);
