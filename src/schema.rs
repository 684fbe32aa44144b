//! Column presence checks, dtype validation and typed column extraction.
//!
//! The analysis engines never touch polars arrays directly; they go through
//! the extractors here, which normalise values into plain Rust vectors:
//! numeric columns become `Option<f64>` (NaN read as missing), key columns
//! become `Option<String>` and timestamps become UTC nanoseconds.

use crate::constants::{NANOS_PER_DAY, NANOS_PER_MICRO, NANOS_PER_MILLI};
use crate::error::{Result, StatsError};
use polars::prelude::{Column, DataFrame, DataType, NamedFrom, Series, TimeUnit as PolarsTimeUnit};
use tracing::debug;

/// True for integer and floating point dtypes
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// True for `Datetime` (any unit, any zone) and `Date`
pub fn is_temporal_dtype(dtype: &DataType) -> bool {
    matches!(dtype, DataType::Datetime(_, _) | DataType::Date)
}

/// Fail with a schema error listing every column absent from `frame`
pub fn require_columns<S: AsRef<str>>(frame: &DataFrame, columns: &[S], role: &str) -> Result<()> {
    let missing: Vec<&str> = columns
        .iter()
        .map(AsRef::as_ref)
        .filter(|name| frame.get_column_index(name).is_none())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(StatsError::schema(format!(
            "Required {} column(s) not found in dataset: {:?}",
            role, missing
        )))
    }
}

pub fn has_column(frame: &DataFrame, column: &str) -> bool {
    frame.get_column_index(column).is_some()
}

/// Grouping columns must all exist; dtype is free since keys are rendered as strings
pub fn validate_grouping_columns<S: AsRef<str>>(frame: &DataFrame, group_by: &[S]) -> Result<()> {
    require_columns(frame, group_by, "grouping")
}

/// Check one column is numeric, optionally rejecting nulls and infinite values
///
/// Null and infinity counts are gathered in a single pass over the column.
pub fn validate_numeric_column(
    frame: &DataFrame,
    column: &str,
    allow_null: bool,
    require_finite: bool,
) -> Result<()> {
    require_columns(frame, &[column], "value")?;

    let series = frame.column(column)?.as_materialized_series();
    if !is_numeric_dtype(series.dtype()) {
        return Err(StatsError::data_validation(format!(
            "Column '{}' must be numeric, found dtype {}",
            column,
            series.dtype()
        )));
    }

    let values = series.cast(&DataType::Float64)?;
    let (null_count, infinite_count) =
        values
            .f64()?
            .into_iter()
            .fold((0usize, 0usize), |(nulls, infs), value| match value {
                None => (nulls + 1, infs),
                Some(v) if v.is_infinite() => (nulls, infs + 1),
                Some(_) => (nulls, infs),
            });

    if !allow_null && null_count > 0 {
        return Err(StatsError::data_validation(format!(
            "Column '{}' contains {} null value(s)",
            column, null_count
        )));
    }
    if require_finite && infinite_count > 0 {
        return Err(StatsError::data_validation(format!(
            "Column '{}' contains {} infinite value(s)",
            column, infinite_count
        )));
    }

    debug!(
        "Validated numeric column '{}' ({} nulls, {} infinite)",
        column, null_count, infinite_count
    );
    Ok(())
}

/// Numeric column as `f64` values; nulls and NaN both read as `None`
pub fn f64_values(frame: &DataFrame, column: &str) -> Result<Vec<Option<f64>>> {
    let series = frame.column(column)?.as_materialized_series();
    if !is_numeric_dtype(series.dtype()) && series.dtype() != &DataType::Null {
        return Err(StatsError::data_validation(format!(
            "Column '{}' must be numeric, found dtype {}",
            column,
            series.dtype()
        )));
    }
    let values = series.cast(&DataType::Float64)?;
    Ok(values
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| !x.is_nan()))
        .collect())
}

/// Any column rendered as string keys, nulls preserved
pub fn string_values(frame: &DataFrame, column: &str) -> Result<Vec<Option<String>>> {
    let series = frame.column(column)?.as_materialized_series();
    let strings = series.cast(&DataType::String)?;
    Ok(strings
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

fn nanos_multiplier(unit: &PolarsTimeUnit) -> i64 {
    match unit {
        PolarsTimeUnit::Nanoseconds => 1,
        PolarsTimeUnit::Microseconds => NANOS_PER_MICRO,
        PolarsTimeUnit::Milliseconds => NANOS_PER_MILLI,
    }
}

/// Temporal series as UTC nanoseconds since the epoch
///
/// Naive datetimes are taken as UTC; zoned datetimes are already stored as
/// UTC instants by polars, so no shifting is needed. Dates map to midnight.
pub fn series_timestamp_nanos(series: &Series) -> Result<Vec<Option<i64>>> {
    let multiplier = match series.dtype() {
        DataType::Datetime(unit, _) => nanos_multiplier(unit),
        DataType::Date => NANOS_PER_DAY,
        other => {
            return Err(StatsError::data_validation(format!(
                "Column '{}' must be a datetime column, found dtype {}",
                series.name(),
                other
            )));
        }
    };

    let physical = if series.dtype() == &DataType::Date {
        series.cast(&DataType::Int32)?.cast(&DataType::Int64)?
    } else {
        series.cast(&DataType::Int64)?
    };

    physical
        .i64()?
        .into_iter()
        .map(|v| match v {
            None => Ok(None),
            Some(raw) => raw.checked_mul(multiplier).map(Some).ok_or_else(|| {
                StatsError::time(format!(
                    "Timestamp {} in column '{}' overflows nanosecond range",
                    raw,
                    series.name()
                ))
            }),
        })
        .collect()
}

pub fn timestamp_nanos(frame: &DataFrame, column: &str) -> Result<Vec<Option<i64>>> {
    series_timestamp_nanos(frame.column(column)?.as_materialized_series())
}

/// Datetime dtype for result timestamps: nanoseconds, keeping the input zone
pub fn output_datetime_dtype(input: &DataType) -> DataType {
    match input {
        DataType::Datetime(_, tz) => DataType::Datetime(PolarsTimeUnit::Nanoseconds, tz.clone()),
        _ => DataType::Datetime(PolarsTimeUnit::Nanoseconds, None),
    }
}

/// Build a datetime result column from UTC nanoseconds
pub fn datetime_column(name: &str, nanos: Vec<Option<i64>>, dtype: &DataType) -> Result<Column> {
    let series = Series::new(name.into(), nanos).cast(dtype)?;
    Ok(series.into())
}

pub fn dtype_of(frame: &DataFrame, column: &str) -> Result<DataType> {
    Ok(frame.column(column)?.dtype().clone())
}
