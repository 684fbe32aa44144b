//! Linear trend engine.
//!
//! Fits `value = intercept + slope * t` per category and group by closed-form
//! ordinary least squares, where `t` is the elapsed time since the group's
//! first valid observation in the configured [`TimeUnit`]. Groups with fewer
//! than `min_samples` valid observations are left out of the result, as are
//! groups whose category or any group-by key is null.

use super::grouping::{GroupKey, KeyColumns, partition_rows};
use crate::config::TrendConfig;
use crate::constants::{OLS_DENOMINATOR_EPSILON, SS_TOT_EPSILON, output};
use crate::dataset::{TimeSeriesDataset, check_units_present};
use crate::error::{Result, StatsError};
use crate::models::{ResultMetadata, UnitsStatus};
use crate::pipeline::QcPipeline;
use crate::qc::{EXCLUDE_FLAGS, MISSING_FLAGS};
use crate::schema::{self, datetime_column, output_datetime_dtype};
use crate::time::{TimeUnit, elapsed, from_nanos};
use chrono::{DateTime, Utc};
use polars::prelude::{Column, DataFrame, DataType};
use serde::Serialize;
use tracing::{debug, info};

/// Least squares fit of `y` against `x`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OlsFit {
    pub slope: f64,
    pub intercept: f64,
    /// Undefined when `y` is constant or every `x` is identical
    pub r_squared: Option<f64>,
}

/// Closed-form OLS from sufficient statistics
pub fn fit_ols(x: &[f64], y: &[f64]) -> OlsFit {
    let n = x.len().min(y.len());
    if n == 0 {
        return OlsFit {
            slope: 0.0,
            intercept: 0.0,
            r_squared: None,
        };
    }
    let (x, y) = (&x[..n], &y[..n]);
    let nf = n as f64;

    let sum_x: f64 = x.iter().sum();
    let sum_y: f64 = y.iter().sum();
    let sum_xy: f64 = x.iter().zip(y).map(|(a, b)| a * b).sum();
    let sum_x2: f64 = x.iter().map(|a| a * a).sum();

    let denominator = nf * sum_x2 - sum_x * sum_x;
    if denominator.abs() < OLS_DENOMINATOR_EPSILON {
        return OlsFit {
            slope: 0.0,
            intercept: sum_y / nf,
            r_squared: None,
        };
    }

    let slope = (nf * sum_xy - sum_x * sum_y) / denominator;
    let intercept = (sum_y - slope * sum_x) / nf;

    let mean_y = sum_y / nf;
    let (ss_res, ss_tot) = x.iter().zip(y).fold((0.0, 0.0), |(res, tot), (a, b)| {
        let residual = b - (slope * a + intercept);
        (res + residual * residual, tot + (b - mean_y) * (b - mean_y))
    });
    let r_squared = (ss_tot.abs() >= SS_TOT_EPSILON).then(|| 1.0 - ss_res / ss_tot);

    OlsFit {
        slope,
        intercept,
        r_squared,
    }
}

/// Trend of one category within one group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendRecord {
    /// Category value followed by the grouping column values
    pub keys: Vec<Option<String>>,
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: Option<f64>,
    pub n: usize,
    /// Calendar years from first to last observation
    pub duration_years: f64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub short_duration_flag: bool,
    /// Always false: groups below `min_samples` produce no record at all
    pub low_n_flag: bool,
    pub slope_units: String,
}

#[derive(Debug, Clone)]
pub struct TrendOutput {
    pub key_columns: Vec<String>,
    pub time_unit: TimeUnit,
    pub records: Vec<TrendRecord>,
    pub table: DataFrame,
    pub metadata: ResultMetadata,
}

fn trend_frame(key_columns: &[String], records: &[TrendRecord], time_dtype: &DataType) -> Result<DataFrame> {
    let mut keys = KeyColumns::new(key_columns);
    for record in records {
        keys.push(&GroupKey(record.keys.clone()));
    }
    let nanos = |t: &DateTime<Utc>| t.timestamp_nanos_opt();

    let mut columns = keys.into_columns();
    columns.push(Column::new(
        output::SLOPE.into(),
        records.iter().map(|r| r.slope).collect::<Vec<_>>(),
    ));
    columns.push(Column::new(
        output::INTERCEPT.into(),
        records.iter().map(|r| r.intercept).collect::<Vec<_>>(),
    ));
    columns.push(Column::new(
        output::R_SQUARED.into(),
        records.iter().map(|r| r.r_squared).collect::<Vec<_>>(),
    ));
    columns.push(Column::new(
        output::N.into(),
        records.iter().map(|r| r.n as u64).collect::<Vec<_>>(),
    ));
    columns.push(Column::new(
        output::DURATION_YEARS.into(),
        records.iter().map(|r| r.duration_years).collect::<Vec<_>>(),
    ));
    columns.push(datetime_column(
        output::START_TIME,
        records.iter().map(|r| nanos(&r.start_time)).collect(),
        time_dtype,
    )?);
    columns.push(datetime_column(
        output::END_TIME,
        records.iter().map(|r| nanos(&r.end_time)).collect(),
        time_dtype,
    )?);
    columns.push(Column::new(
        output::SHORT_DURATION_FLAG.into(),
        records.iter().map(|r| r.short_duration_flag).collect::<Vec<_>>(),
    ));
    columns.push(Column::new(
        output::LOW_N_FLAG.into(),
        records.iter().map(|r| r.low_n_flag).collect::<Vec<_>>(),
    ));
    columns.push(Column::new(
        output::SLOPE_UNITS.into(),
        records.iter().map(|r| r.slope_units.clone()).collect::<Vec<_>>(),
    ));
    Ok(DataFrame::new(columns)?)
}

/// Fit a linear trend per category and group
pub fn compute_linear_trend(dataset: &TimeSeriesDataset, config: &TrendConfig) -> Result<TrendOutput> {
    config.validate()?;

    let (_, missing_units) = check_units_present(
        dataset,
        &[config.value_column.as_str()],
        "Trend analysis",
        config.allow_missing_units,
    )?;
    let slope_units = match dataset.column_unit(&config.value_column) {
        Some(unit) => format!("{}/{}", unit, config.time_unit),
        None => format!("unknown/{}", config.time_unit),
    };
    let units_status = if missing_units.is_empty() {
        UnitsStatus::enforced()
    } else {
        UnitsStatus::overridden(missing_units, Vec::new())
    };

    let frame = dataset.frame();
    schema::require_columns(
        frame,
        &[
            config.value_column.as_str(),
            config.category_column.as_str(),
            config.datetime_column.as_str(),
        ],
        "trend",
    )?;
    schema::validate_grouping_columns(frame, &config.group_by)?;
    schema::validate_numeric_column(frame, &config.value_column, true, true)?;
    let time_dtype = schema::dtype_of(frame, &config.datetime_column)?;
    if !schema::is_temporal_dtype(&time_dtype) {
        return Err(StatsError::data_validation(format!(
            "Column '{}' must be a datetime column, found dtype {}",
            config.datetime_column, time_dtype
        )));
    }

    let mut key_columns = vec![config.category_column.clone()];
    key_columns.extend(config.group_by.iter().cloned());

    let mut pipeline = QcPipeline::new(frame);
    if let Some(flag) = &config.flag_column {
        pipeline = pipeline
            .filter_excluded(flag, &EXCLUDE_FLAGS)
            .mark_missing(&config.value_column, flag, &MISSING_FLAGS);
    }
    let mut projection = key_columns.clone();
    projection.push(config.datetime_column.clone());
    projection.push(config.value_column.clone());
    let prepared = pipeline.select(&projection).materialize()?;

    let values = schema::f64_values(&prepared, &config.value_column)?;
    let stamps = schema::timestamp_nanos(&prepared, &config.datetime_column)?;
    let groups = partition_rows(&prepared, &key_columns)?;

    let mut records = Vec::new();
    let mut skipped = 0usize;
    for (key, rows) in &groups {
        // Null category or group key: no trend
        if key.values().is_empty() || key.values().iter().any(Option::is_none) {
            continue;
        }

        let mut observations: Vec<(i64, f64)> = rows
            .iter()
            .filter_map(|&row| Some((stamps[row]?, values[row]?)))
            .collect();
        if observations.len() < config.min_samples {
            skipped += 1;
            continue;
        }
        observations.sort_by_key(|(t, _)| *t);

        let start = from_nanos(observations[0].0);
        let end = from_nanos(observations[observations.len() - 1].0);
        let x: Vec<f64> = observations
            .iter()
            .map(|(t, _)| elapsed(start, from_nanos(*t), config.time_unit))
            .collect::<Result<_>>()?;
        let y: Vec<f64> = observations.iter().map(|(_, v)| *v).collect();

        let fit = fit_ols(&x, &y);
        let duration_years = elapsed(start, end, TimeUnit::CalendarYear)?;

        records.push(TrendRecord {
            keys: key.values().to_vec(),
            slope: fit.slope,
            intercept: fit.intercept,
            r_squared: fit.r_squared,
            n: observations.len(),
            duration_years,
            start_time: start,
            end_time: end,
            short_duration_flag: duration_years < config.min_duration_years,
            low_n_flag: observations.len() < config.min_samples,
            slope_units: slope_units.clone(),
        });
    }

    if skipped > 0 {
        debug!(
            "Skipped {} groups with fewer than {} valid observations",
            skipped, config.min_samples
        );
    }

    let table = trend_frame(&key_columns, &records, &output_datetime_dtype(&time_dtype))?;
    let metadata = ResultMetadata {
        time_bounds: dataset.time_bounds()?,
        units_status,
        n_input_rows: dataset.n_rows(),
        n_groups: records.len(),
    };
    info!(
        "Linear trend per {}: {} groups fitted, {} skipped",
        config.time_unit,
        records.len(),
        skipped
    );

    Ok(TrendOutput {
        key_columns,
        time_unit: config.time_unit,
        records,
        table,
        metadata,
    })
}
