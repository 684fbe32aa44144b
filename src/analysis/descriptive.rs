//! Descriptive statistics engine.
//!
//! Summarises one or more numeric columns per group with QC applied to each
//! column independently. `n_total` counts every input row of the group,
//! `n_valid` the non-null values left after exclusion and missing-marking,
//! and `n_missing` the difference, so a group whose rows are all excluded
//! still appears with `n_valid = 0` and null statistics.

use super::grouping::{GroupKey, KeyColumns, partition_rows, take};
use crate::config::DescriptiveConfig;
use crate::constants::output;
use crate::dataset::TimeSeriesDataset;
use crate::error::Result;
use crate::models::{OutputFormat, ResultMetadata, Statistic, UnitsStatus};
use crate::pipeline::QcPipeline;
use crate::qc::{EXCLUDE_FLAGS, MISSING_FLAGS};
use crate::schema;
use crate::units::{RoundingPolicy, Unit};
use polars::prelude::{Column, DataFrame};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Output label for a quantile level: `q05`, `q25`, `q02.5`
pub fn quantile_label(q: f64) -> String {
    let percent = q * 100.0;
    if (percent - percent.round()).abs() < 1e-9 {
        format!("q{:02}", percent.round() as u64)
    } else {
        format!("q{:04.1}", percent)
    }
}

/// Nearest-rank quantile of sorted values: index `round((n - 1) * q)`
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let index = ((sorted.len() - 1) as f64 * q).round() as usize;
    sorted.get(index.min(sorted.len() - 1)).copied()
}

/// Median of sorted values, averaging the two middle values for even lengths
pub fn median_sorted(sorted: &[f64]) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Sample standard deviation (ddof = 1)
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    Some((ss / (values.len() - 1) as f64).sqrt())
}

/// One computed statistic
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatValue {
    pub stat: String,
    pub value: Option<f64>,
}

/// All statistics for one group and value column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    /// Grouping column values followed by the category value, if any
    pub keys: Vec<Option<String>>,
    pub value_col_name: String,
    pub n_total: usize,
    pub n_valid: usize,
    pub n_missing: usize,
    pub statistics: Vec<StatValue>,
}

/// Tidy record: one statistic of one group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DescriptiveRecord {
    pub keys: Vec<Option<String>>,
    pub value_col_name: String,
    pub stat: String,
    pub value: Option<f64>,
    pub n_total: usize,
    pub n_valid: usize,
    pub n_missing: usize,
}

#[derive(Debug, Clone)]
pub struct DescriptiveOutput {
    /// Names of the key columns, in the order of `GroupSummary::keys`
    pub key_columns: Vec<String>,
    pub category_column: Option<String>,
    /// Statistic labels in output order
    pub stat_labels: Vec<String>,
    pub summaries: Vec<GroupSummary>,
    pub table: DataFrame,
    pub metadata: ResultMetadata,
}

impl DescriptiveOutput {
    /// Unpivoted records, one per statistic
    pub fn records(&self) -> Vec<DescriptiveRecord> {
        self.summaries
            .iter()
            .flat_map(|summary| {
                summary.statistics.iter().map(move |s| DescriptiveRecord {
                    keys: summary.keys.clone(),
                    value_col_name: summary.value_col_name.clone(),
                    stat: s.stat.clone(),
                    value: s.value,
                    n_total: summary.n_total,
                    n_valid: summary.n_valid,
                    n_missing: summary.n_missing,
                })
            })
            .collect()
    }

    pub fn to_frame(&self, format: OutputFormat) -> Result<DataFrame> {
        match format {
            OutputFormat::Tidy => tidy_frame(&self.key_columns, &self.summaries),
            OutputFormat::Wide => wide_frame(&self.key_columns, &self.stat_labels, &self.summaries),
        }
    }

    /// Round statistic values to reporting precision for columns with known units
    ///
    /// `count` is left untouched. The table is rebuilt in `format`.
    pub fn round_for_reporting(
        mut self,
        policy: &RoundingPolicy,
        units: &HashMap<String, Unit>,
        format: OutputFormat,
    ) -> Result<Self> {
        for summary in &mut self.summaries {
            let Some(unit) = units.get(&summary.value_col_name).copied() else {
                continue;
            };
            let category = self
                .category_column
                .as_ref()
                .and_then(|_| summary.keys.last().cloned().flatten());
            for stat in &mut summary.statistics {
                if stat.stat == Statistic::Count.as_str() {
                    continue;
                }
                if let Some(value) = stat.value {
                    stat.value = Some(policy.round(value, unit, category.as_deref())?);
                }
            }
        }
        self.table = self.to_frame(format)?;
        Ok(self)
    }
}

fn count_columns(summaries: &[GroupSummary], with: impl Fn(&GroupSummary) -> usize) -> Vec<u64> {
    summaries.iter().map(|s| with(s) as u64).collect()
}

fn tidy_frame(key_columns: &[String], summaries: &[GroupSummary]) -> Result<DataFrame> {
    let mut keys = KeyColumns::new(key_columns);
    let mut value_col_names = Vec::new();
    let mut stats = Vec::new();
    let mut values = Vec::new();
    let mut n_total = Vec::new();
    let mut n_valid = Vec::new();
    let mut n_missing = Vec::new();

    for summary in summaries {
        let key = GroupKey(summary.keys.clone());
        for stat in &summary.statistics {
            keys.push(&key);
            value_col_names.push(summary.value_col_name.clone());
            stats.push(stat.stat.clone());
            values.push(stat.value);
            n_total.push(summary.n_total as u64);
            n_valid.push(summary.n_valid as u64);
            n_missing.push(summary.n_missing as u64);
        }
    }

    let mut columns = keys.into_columns();
    columns.push(Column::new(output::VALUE_COL_NAME.into(), value_col_names));
    columns.push(Column::new(output::STAT.into(), stats));
    columns.push(Column::new(output::VALUE.into(), values));
    columns.push(Column::new(output::N_TOTAL.into(), n_total));
    columns.push(Column::new(output::N_VALID.into(), n_valid));
    columns.push(Column::new(output::N_MISSING.into(), n_missing));
    Ok(DataFrame::new(columns)?)
}

fn wide_frame(key_columns: &[String], stat_labels: &[String], summaries: &[GroupSummary]) -> Result<DataFrame> {
    let mut keys = KeyColumns::new(key_columns);
    for summary in summaries {
        keys.push(&GroupKey(summary.keys.clone()));
    }

    let mut columns = keys.into_columns();
    columns.push(Column::new(
        output::VALUE_COL_NAME.into(),
        summaries
            .iter()
            .map(|s| s.value_col_name.clone())
            .collect::<Vec<_>>(),
    ));
    columns.push(Column::new(output::N_TOTAL.into(), count_columns(summaries, |s| s.n_total)));
    columns.push(Column::new(output::N_VALID.into(), count_columns(summaries, |s| s.n_valid)));
    columns.push(Column::new(output::N_MISSING.into(), count_columns(summaries, |s| s.n_missing)));

    for (index, label) in stat_labels.iter().enumerate() {
        let values: Vec<Option<f64>> = summaries
            .iter()
            .map(|s| s.statistics.get(index).and_then(|v| v.value))
            .collect();
        columns.push(Column::new(label.as_str().into(), values));
    }
    Ok(DataFrame::new(columns)?)
}

fn stat_labels(config: &DescriptiveConfig) -> Vec<String> {
    let mut labels = Vec::new();
    for stat in config.ordered_statistics() {
        match stat {
            Statistic::Quantiles => labels.extend(config.quantiles.iter().map(|&q| quantile_label(q))),
            other => labels.push(other.as_str().to_string()),
        }
    }
    labels
}

fn summarise(values: &[f64], config: &DescriptiveConfig) -> Vec<StatValue> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mut out = Vec::new();
    for stat in config.ordered_statistics() {
        let value = |v: Option<f64>| StatValue {
            stat: stat.as_str().to_string(),
            value: v,
        };
        match stat {
            Statistic::Mean => out.push(value(mean(values))),
            Statistic::Median => out.push(value(median_sorted(&sorted))),
            Statistic::Std => out.push(value(sample_std(values))),
            Statistic::Min => out.push(value(sorted.first().copied())),
            Statistic::Max => out.push(value(sorted.last().copied())),
            Statistic::Count => out.push(value(Some(values.len() as f64))),
            Statistic::Quantiles => out.extend(config.quantiles.iter().map(|&q| StatValue {
                stat: quantile_label(q),
                value: quantile_sorted(&sorted, q),
            })),
        }
    }
    out
}

/// Compute descriptive statistics for every configured value column
pub fn compute_descriptives(
    dataset: &TimeSeriesDataset,
    config: &DescriptiveConfig,
) -> Result<DescriptiveOutput> {
    config.validate()?;
    let frame = dataset.frame();

    schema::require_columns(frame, &config.value_columns, "value")?;
    let mut optional: Vec<&str> = config.group_by.iter().map(String::as_str).collect();
    optional.extend(config.category_column.as_deref());
    schema::require_columns(frame, &optional, "grouping")?;
    for column in &config.value_columns {
        schema::validate_numeric_column(frame, column, true, true)?;
    }

    let flag_column = match config.flag_column.as_deref() {
        Some(flag) if schema::has_column(frame, flag) => Some(flag),
        Some(flag) => {
            warn!("Flag column '{}' not found; QC filtering disabled", flag);
            None
        }
        None => None,
    };

    let key_columns: Vec<String> = optional.iter().map(|c| c.to_string()).collect();
    let mut value_columns = config.value_columns.clone();
    value_columns.sort();

    let mut pipeline = QcPipeline::new(frame);
    if let Some(flag) = flag_column {
        for column in &value_columns {
            pipeline = pipeline
                .mask_excluded(column, flag, &EXCLUDE_FLAGS)
                .mark_missing(column, flag, &MISSING_FLAGS);
        }
    }
    let mut projection = key_columns.clone();
    projection.extend(value_columns.iter().cloned());
    let prepared = pipeline.select(&projection).materialize()?;

    let groups = partition_rows(&prepared, &key_columns)?;
    let column_values: Vec<Vec<Option<f64>>> = value_columns
        .iter()
        .map(|c| schema::f64_values(&prepared, c))
        .collect::<Result<_>>()?;

    let mut summaries = Vec::with_capacity(groups.len() * value_columns.len());
    for (key, rows) in &groups {
        for (column, values) in value_columns.iter().zip(&column_values) {
            let valid: Vec<f64> = take(values, rows).into_iter().flatten().collect();
            let n_total = rows.len();
            let n_valid = valid.len();
            summaries.push(GroupSummary {
                keys: key.values().to_vec(),
                value_col_name: column.clone(),
                n_total,
                n_valid,
                n_missing: n_total - n_valid,
                statistics: summarise(&valid, config),
            });
        }
    }

    debug!(
        "Computed descriptives for {} groups x {} columns",
        groups.len(),
        value_columns.len()
    );

    let labels = stat_labels(config);
    let table = match config.output_format {
        OutputFormat::Tidy => tidy_frame(&key_columns, &summaries)?,
        OutputFormat::Wide => wide_frame(&key_columns, &labels, &summaries)?,
    };

    let metadata = ResultMetadata {
        time_bounds: dataset.time_bounds()?,
        units_status: UnitsStatus::not_required(),
        n_input_rows: dataset.n_rows(),
        n_groups: groups.len(),
    };
    info!(
        "Descriptive statistics: {} rows in, {} groups, {} output rows",
        metadata.n_input_rows,
        metadata.n_groups,
        table.height()
    );

    Ok(DescriptiveOutput {
        key_columns,
        category_column: config.category_column.clone(),
        stat_labels: labels,
        summaries,
        table,
        metadata,
    })
}
