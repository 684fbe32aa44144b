//! Time elapsed and bounds utilities.
//!
//! Elapsed time comes in two flavours. Hours and days are fixed durations,
//! so elapsed values are exact fractional divisions. Calendar months and
//! years vary in length: the elapsed value counts whole calendar steps from
//! the start (clamping the day to the end of shorter months) and adds the
//! fraction of the following step that has passed. One calendar year from
//! 2024-01-01 to 2025-01-01 is therefore exactly 1.0 despite the leap day.

use crate::constants::{MONTHS_PER_YEAR, NANOS_PER_SECOND, SECONDS_PER_DAY, SECONDS_PER_HOUR};
use crate::error::{Result, StatsError};
use crate::schema::{self, datetime_column, is_numeric_dtype, output_datetime_dtype};
use chrono::{DateTime, Datelike, Months, NaiveDateTime, TimeDelta, TimeZone, Utc};
use polars::prelude::{Column, DataFrame, IntoLazy, LazyFrame, NamedFrom, Series, col};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Unit of an elapsed-time axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    Hour,
    Day,
    CalendarMonth,
    CalendarYear,
}

impl TimeUnit {
    pub const ALL: [TimeUnit; 4] = [
        TimeUnit::Hour,
        TimeUnit::Day,
        TimeUnit::CalendarMonth,
        TimeUnit::CalendarYear,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeUnit::Hour => "hour",
            TimeUnit::Day => "day",
            TimeUnit::CalendarMonth => "calendar_month",
            TimeUnit::CalendarYear => "calendar_year",
        }
    }

    /// True for units whose length depends on the calendar
    pub fn is_calendar_aware(&self) -> bool {
        matches!(self, TimeUnit::CalendarMonth | TimeUnit::CalendarYear)
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeUnit {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self> {
        TimeUnit::ALL
            .iter()
            .copied()
            .find(|unit| unit.as_str() == s)
            .ok_or_else(|| {
                StatsError::configuration(format!(
                    "Invalid time unit '{}'. Must be one of: hour, day, calendar_month, calendar_year",
                    s
                ))
            })
    }
}

/// Attach UTC to a naive timestamp, which is assumed to already be UTC
pub fn ensure_utc(naive: NaiveDateTime) -> DateTime<Utc> {
    Utc.from_utc_datetime(&naive)
}

/// Convert a zoned timestamp to UTC, preserving the absolute instant
pub fn to_utc<Tz: TimeZone>(dt: DateTime<Tz>) -> DateTime<Utc> {
    dt.with_timezone(&Utc)
}

pub fn from_nanos(nanos: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(nanos)
}

fn delta_seconds(delta: TimeDelta) -> f64 {
    delta.num_seconds() as f64 + f64::from(delta.subsec_nanos()) / NANOS_PER_SECOND as f64
}

fn shift_months(start: DateTime<Utc>, months: u32) -> Result<DateTime<Utc>> {
    start.checked_add_months(Months::new(months)).ok_or_else(|| {
        StatsError::time(format!(
            "Adding {} months to {} leaves the representable range",
            months, start
        ))
    })
}

fn calendar_elapsed(start: DateTime<Utc>, end: DateTime<Utc>, months_per_step: u32) -> Result<f64> {
    if end < start {
        return calendar_elapsed(end, start, months_per_step).map(|v| -v);
    }

    let month_diff = (i64::from(end.year()) - i64::from(start.year())) * 12
        + i64::from(end.month0())
        - i64::from(start.month0());
    let mut steps = u32::try_from((month_diff / i64::from(months_per_step)).max(0))
        .map_err(|_| StatsError::time(format!("Span from {} to {} is too long", start, end)))?;

    // The month difference may overshoot by one step when the end day is earlier in its month
    while steps > 0 && shift_months(start, steps * months_per_step)? > end {
        steps -= 1;
    }
    while shift_months(start, (steps + 1) * months_per_step)? <= end {
        steps += 1;
    }

    let lower = shift_months(start, steps * months_per_step)?;
    let upper = shift_months(start, (steps + 1) * months_per_step)?;
    let fraction = delta_seconds(end - lower) / delta_seconds(upper - lower);

    Ok(f64::from(steps) + fraction)
}

/// Elapsed time from `start` to `end` in `unit`; negative when `end < start`
pub fn elapsed(start: DateTime<Utc>, end: DateTime<Utc>, unit: TimeUnit) -> Result<f64> {
    match unit {
        TimeUnit::Hour => Ok(delta_seconds(end - start) / SECONDS_PER_HOUR),
        TimeUnit::Day => Ok(delta_seconds(end - start) / SECONDS_PER_DAY),
        TimeUnit::CalendarMonth => calendar_elapsed(start, end, 1),
        TimeUnit::CalendarYear => calendar_elapsed(start, end, MONTHS_PER_YEAR),
    }
}

/// Inclusive UTC time span of a dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBounds {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeBounds {
    pub fn duration(&self, unit: TimeUnit) -> Result<f64> {
        elapsed(self.start, self.end, unit)
    }
}

/// Min and max of `time_column` in one aggregation and a single collect
///
/// Returns `None` when the column holds no non-null timestamps. A missing
/// column surfaces the polars lookup error.
pub fn time_bounds(frame: LazyFrame, time_column: &str) -> Result<Option<TimeBounds>> {
    let result = frame
        .select([
            col(time_column).min().alias("min_time"),
            col(time_column).max().alias("max_time"),
        ])
        .collect()?;

    let start = schema::timestamp_nanos(&result, "min_time")?;
    let end = schema::timestamp_nanos(&result, "max_time")?;

    match (start.first().copied().flatten(), end.first().copied().flatten()) {
        (Some(start), Some(end)) => Ok(Some(TimeBounds {
            start: from_nanos(start),
            end: from_nanos(end),
        })),
        _ => Ok(None),
    }
}

fn target_columns(frame: &DataFrame, time_column: &str, columns: Option<&[String]>) -> Result<Vec<String>> {
    match columns {
        Some(requested) => {
            schema::require_columns(frame, requested, "resample")?;
            Ok(requested.to_vec())
        }
        None => Ok(frame
            .get_columns()
            .iter()
            .filter(|c| c.name().as_str() != time_column && is_numeric_dtype(c.dtype()))
            .map(|c| c.name().to_string())
            .collect()),
    }
}

/// Mean of each numeric column over fixed-width, epoch-aligned time buckets
///
/// Every bucket between the first and last observation is emitted, empty
/// ones with null means. Output columns are the time column (bucket start)
/// followed by the resampled columns.
pub fn resample_mean(
    frame: &DataFrame,
    time_column: &str,
    every: TimeDelta,
    columns: Option<&[String]>,
) -> Result<DataFrame> {
    let width = every.num_nanoseconds().filter(|n| *n > 0).ok_or_else(|| {
        StatsError::configuration(format!("Resample interval must be positive, got {}", every))
    })?;

    let targets = target_columns(frame, time_column, columns)?;
    let output_dtype = output_datetime_dtype(&schema::dtype_of(frame, time_column)?);
    let stamps = schema::timestamp_nanos(frame, time_column)?;

    let buckets: Vec<Option<i64>> = stamps
        .iter()
        .map(|t| t.map(|t| t.div_euclid(width)))
        .collect();
    let (first, last) = match (buckets.iter().flatten().min(), buckets.iter().flatten().max()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => {
            let mut output = vec![datetime_column(time_column, Vec::new(), &output_dtype)?];
            for name in &targets {
                output.push(Column::new(name.as_str().into(), Vec::<Option<f64>>::new()));
            }
            return Ok(DataFrame::new(output)?);
        }
    };

    let n_buckets = usize::try_from(last - first + 1)
        .map_err(|_| StatsError::configuration("Resample interval produces too many buckets"))?;
    let bucket_starts: Vec<Option<i64>> = (first..=last).map(|b| Some(b * width)).collect();
    let mut output = vec![datetime_column(time_column, bucket_starts, &output_dtype)?];

    for name in &targets {
        let values = schema::f64_values(frame, name)?;
        let mut sums = vec![0.0; n_buckets];
        let mut counts = vec![0usize; n_buckets];
        for (bucket, value) in buckets.iter().zip(values) {
            if let (Some(bucket), Some(value)) = (bucket, value) {
                let slot = (bucket - first) as usize;
                sums[slot] += value;
                counts[slot] += 1;
            }
        }
        let means: Vec<Option<f64>> = sums
            .into_iter()
            .zip(counts)
            .map(|(sum, n)| (n > 0).then(|| sum / n as f64))
            .collect();
        output.push(Column::new(name.as_str().into(), means));
    }

    debug!(
        "Resampled {} rows into {} buckets of {}",
        frame.height(),
        n_buckets,
        every
    );
    Ok(DataFrame::new(output)?)
}

/// Centered rolling mean over rows sorted by time, `min_periods = 1`
///
/// Selected columns are replaced by their rolling mean; other columns are
/// carried through unchanged in sorted order.
pub fn rolling_window_mean(
    frame: &DataFrame,
    time_column: &str,
    window: usize,
    columns: Option<&[String]>,
) -> Result<DataFrame> {
    if window < 1 {
        return Err(StatsError::configuration(format!(
            "window must be >= 1, got {}",
            window
        )));
    }

    let targets = target_columns(frame, time_column, columns)?;
    let sorted = frame
        .clone()
        .lazy()
        .sort([time_column], Default::default())
        .collect()?;

    let before = window / 2;
    let after = window - before - 1;
    let mut result = sorted.clone();

    for name in &targets {
        let values = schema::f64_values(&sorted, name)?;
        let n = values.len();
        let rolled: Vec<Option<f64>> = (0..n)
            .map(|i| {
                let lo = i.saturating_sub(before);
                let hi = (i + after).min(n.saturating_sub(1));
                let (sum, count) = values[lo..=hi]
                    .iter()
                    .flatten()
                    .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
                (count > 0).then(|| sum / count as f64)
            })
            .collect();
        result.with_column(Series::new(name.as_str().into(), rolled))?;
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDate};
    use polars::df;
    use polars::prelude::{DataType, TimeUnit as PolarsTimeUnit};

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_time_unit_tokens() {
        assert_eq!("calendar_year".parse::<TimeUnit>().unwrap(), TimeUnit::CalendarYear);
        assert_eq!("hour".parse::<TimeUnit>().unwrap(), TimeUnit::Hour);
        assert!(matches!(
            "fortnight".parse::<TimeUnit>().unwrap_err(),
            StatsError::Configuration { .. }
        ));
    }

    #[test]
    fn test_elapsed_fixed_units() {
        let start = utc(2024, 1, 1, 0);
        let end = utc(2024, 1, 2, 12);
        assert_eq!(elapsed(start, end, TimeUnit::Hour).unwrap(), 36.0);
        assert_eq!(elapsed(start, end, TimeUnit::Day).unwrap(), 1.5);
    }

    #[test]
    fn test_elapsed_subsecond() {
        let start = utc(2024, 1, 1, 0);
        let end = start + TimeDelta::milliseconds(1_800_000) + TimeDelta::nanoseconds(500);
        let hours = elapsed(start, end, TimeUnit::Hour).unwrap();
        assert!((hours - (1_800.0000005 / 3_600.0)).abs() < 1e-12);
    }

    #[test]
    fn test_elapsed_calendar_year_across_leap_day() {
        assert_eq!(
            elapsed(utc(2024, 1, 1, 0), utc(2025, 1, 1, 0), TimeUnit::CalendarYear).unwrap(),
            1.0
        );
        assert_eq!(
            elapsed(utc(2023, 1, 1, 0), utc(2024, 1, 1, 0), TimeUnit::CalendarYear).unwrap(),
            1.0
        );
        assert_eq!(
            elapsed(utc(2020, 3, 1, 0), utc(2024, 3, 1, 0), TimeUnit::CalendarYear).unwrap(),
            4.0
        );
    }

    #[test]
    fn test_elapsed_calendar_month_fraction() {
        // February 2024 has 29 days
        let months = elapsed(utc(2024, 2, 1, 0), utc(2024, 2, 15, 12), TimeUnit::CalendarMonth).unwrap();
        assert!((months - 14.5 / 29.0).abs() < 1e-12);
        assert_eq!(
            elapsed(utc(2024, 1, 31, 0), utc(2024, 2, 29, 0), TimeUnit::CalendarMonth).unwrap(),
            1.0
        );
    }

    #[test]
    fn test_elapsed_negative_when_reversed() {
        let forward = elapsed(utc(2024, 1, 1, 0), utc(2024, 7, 1, 0), TimeUnit::CalendarYear).unwrap();
        let backward = elapsed(utc(2024, 7, 1, 0), utc(2024, 1, 1, 0), TimeUnit::CalendarYear).unwrap();
        assert!(forward > 0.0);
        assert_eq!(backward, -forward);
        assert_eq!(elapsed(utc(2024, 1, 2, 0), utc(2024, 1, 1, 0), TimeUnit::Day).unwrap(), -1.0);
    }

    #[test]
    fn test_utc_helpers() {
        let naive = NaiveDate::from_ymd_opt(2025, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        assert_eq!(ensure_utc(naive), utc(2025, 1, 1, 12));

        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let local = offset.with_ymd_and_hms(2025, 1, 1, 14, 0, 0).unwrap();
        assert_eq!(to_utc(local), utc(2025, 1, 1, 12));
    }

    fn hourly_frame(values: Vec<Option<f64>>) -> DataFrame {
        let base = utc(2025, 1, 1, 0).timestamp_nanos_opt().unwrap();
        let stamps: Vec<i64> = (0..values.len() as i64)
            .map(|i| base + i * 1_800 * NANOS_PER_SECOND)
            .collect();
        let time = Series::new("datetime".into(), stamps)
            .cast(&DataType::Datetime(PolarsTimeUnit::Nanoseconds, None))
            .unwrap();
        let mut frame = DataFrame::new(vec![time.into()]).unwrap();
        frame
            .with_column(Series::new("conc".into(), values))
            .unwrap();
        frame
    }

    #[test]
    fn test_time_bounds_single_collect() {
        let frame = hourly_frame(vec![Some(1.0), Some(2.0), Some(3.0)]);
        let bounds = time_bounds(frame.lazy(), "datetime").unwrap().unwrap();
        assert_eq!(bounds.start, utc(2025, 1, 1, 0));
        assert_eq!(bounds.end, utc(2025, 1, 1, 1));
    }

    #[test]
    fn test_time_bounds_rejects_numeric_column() {
        let frame = df!["datetime" => [1i64, 2]].unwrap();
        assert!(time_bounds(frame.lazy(), "datetime").is_err());
    }

    #[test]
    fn test_time_bounds_missing_column_surfaces_polars_error() {
        let frame = hourly_frame(vec![Some(1.0)]);
        assert!(matches!(
            time_bounds(frame.lazy(), "timestamp").unwrap_err(),
            StatsError::Polars(_)
        ));
    }

    #[test]
    fn test_resample_mean_hourly() {
        let frame = hourly_frame(vec![Some(10.0), Some(20.0), None, Some(30.0), Some(5.0)]);
        let resampled = resample_mean(&frame, "datetime", TimeDelta::hours(1), None).unwrap();
        assert_eq!(resampled.height(), 3);
        let means = schema::f64_values(&resampled, "conc").unwrap();
        assert_eq!(means, vec![Some(15.0), Some(30.0), Some(5.0)]);
    }

    #[test]
    fn test_resample_rejects_unknown_column_and_width() {
        let frame = hourly_frame(vec![Some(1.0)]);
        let err = resample_mean(&frame, "datetime", TimeDelta::hours(1), Some(&["pm25".to_string()]))
            .unwrap_err();
        assert!(matches!(err, StatsError::Schema { .. }));
        assert!(resample_mean(&frame, "datetime", TimeDelta::zero(), None).is_err());
    }

    #[test]
    fn test_rolling_window_mean_centered() {
        let frame = hourly_frame(vec![Some(1.0), Some(2.0), Some(30.0), Some(4.0), Some(5.0)]);
        let rolled = rolling_window_mean(&frame, "datetime", 3, None).unwrap();
        let values = schema::f64_values(&rolled, "conc").unwrap();
        assert_eq!(values[0], Some(1.5));
        assert_eq!(values[2], Some(12.0));
        assert_eq!(values[4], Some(4.5));

        let identity = rolling_window_mean(&frame, "datetime", 1, None).unwrap();
        assert_eq!(schema::f64_values(&identity, "conc").unwrap()[2], Some(30.0));
        assert!(rolling_window_mean(&frame, "datetime", 0, None).is_err());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn elapsed_from_self_is_zero(secs in 0i64..4_000_000_000, unit in prop::sample::select(TimeUnit::ALL.to_vec())) {
                let t = DateTime::from_timestamp(secs, 0).unwrap();
                prop_assert_eq!(elapsed(t, t, unit).unwrap(), 0.0);
            }

            #[test]
            fn one_calendar_year_is_one(year in 1970i32..2200, month in 1u32..=12, day in 1u32..=28) {
                let start = Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap();
                let end = Utc.with_ymd_and_hms(year + 1, month, day, 0, 0, 0).unwrap();
                prop_assert_eq!(elapsed(start, end, TimeUnit::CalendarYear).unwrap(), 1.0);
            }
        }
    }
}
