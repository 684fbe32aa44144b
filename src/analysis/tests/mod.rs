//! Tests for the analysis engines
//!
//! Builds small canonical long-format datasets in memory and checks each
//! engine's results, QC handling and error paths.

pub mod correlation_tests;

use crate::constants::columns;
use crate::dataset::TimeSeriesDataset;
use crate::schema;
use polars::prelude::{DataFrame, DataType, NamedFrom, Series, TimeUnit as PolarsTimeUnit};

const HOUR_NANOS: i64 = 3_600 * 1_000_000_000;

/// One canonical observation
#[derive(Debug, Clone)]
pub struct Obs {
    pub hour: i64,
    pub site: &'static str,
    pub pollutant: &'static str,
    pub conc: Option<f64>,
    pub flag: Option<&'static str>,
}

pub fn obs(hour: i64, site: &'static str, pollutant: &'static str, conc: f64, flag: &'static str) -> Obs {
    Obs {
        hour,
        site,
        pollutant,
        conc: Some(conc),
        flag: Some(flag),
    }
}

/// Frame with `datetime` (ns, naive UTC from 2024-01-01), `site_id`, `pollutant`, `conc`, `flag`
pub fn long_frame(rows: &[Obs]) -> DataFrame {
    // 2024-01-01T00:00:00Z
    let base = 1_704_067_200i64 * 1_000_000_000;
    let datetime = Series::new(
        columns::DATETIME.into(),
        rows.iter().map(|r| base + r.hour * HOUR_NANOS).collect::<Vec<_>>(),
    )
    .cast(&DataType::Datetime(PolarsTimeUnit::Nanoseconds, None))
    .unwrap();

    DataFrame::new(vec![
        datetime.into(),
        Series::new(columns::SITE_ID.into(), rows.iter().map(|r| r.site).collect::<Vec<_>>()).into(),
        Series::new(columns::POLLUTANT.into(), rows.iter().map(|r| r.pollutant).collect::<Vec<_>>()).into(),
        Series::new(columns::CONC.into(), rows.iter().map(|r| r.conc).collect::<Vec<_>>()).into(),
        Series::new(columns::FLAG.into(), rows.iter().map(|r| r.flag).collect::<Vec<_>>()).into(),
    ])
    .unwrap()
}

pub fn dataset(rows: &[Obs]) -> TimeSeriesDataset {
    TimeSeriesDataset::new(long_frame(rows), columns::DATETIME).unwrap()
}

pub fn dataset_with_units(rows: &[Obs], units: &[(&str, &str)]) -> TimeSeriesDataset {
    dataset(rows)
        .with_column_units(units.iter().map(|(c, u)| (c.to_string(), u.to_string())))
        .unwrap()
}

/// Valid observations for one pollutant at consecutive hours
pub fn series(site: &'static str, pollutant: &'static str, values: &[f64]) -> Vec<Obs> {
    values
        .iter()
        .enumerate()
        .map(|(i, &v)| obs(i as i64, site, pollutant, v, "valid"))
        .collect()
}

pub fn strings(frame: &DataFrame, column: &str) -> Vec<Option<String>> {
    schema::string_values(frame, column).unwrap()
}

pub fn floats(frame: &DataFrame, column: &str) -> Vec<Option<f64>> {
    schema::f64_values(frame, column).unwrap()
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {} but got {}",
        expected,
        actual
    );
}
