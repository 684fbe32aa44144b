//! Pairwise correlation engine.
//!
//! Categories (e.g. pollutants) are correlated against each other within
//! every group. For each value column and group:
//!
//! 1. QC is applied and null values dropped.
//! 2. Categories with fewer than `min_samples` valid values are discarded.
//! 3. Every ordered pair `(x, y)` with `x <= y` over the surviving sorted
//!    labels is evaluated, diagonal included.
//! 4. The two value sequences are truncated to the shorter length and
//!    paired by position, then correlated with Pearson or Spearman.
//!
//! Pairing is positional rather than timestamp-aligned, so callers should
//! supply categories sampled on the same ordered timestamps.

use super::grouping::{GroupKey, KeyColumns, partition_rows};
use crate::config::CorrelationConfig;
use crate::constants::output;
use crate::dataset::{TimeSeriesDataset, check_units_present};
use crate::error::{Result, StatsError};
use crate::models::{CorrelationMethod, OutputFormat, ResultMetadata, UnitsStatus};
use crate::pipeline::QcPipeline;
use crate::qc::{EXCLUDE_FLAGS, MISSING_FLAGS};
use crate::schema;
use crate::units::UnitFamily;
use polars::prelude::{Column, DataFrame};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// All pairs `(x, y)` with `x <= y` from an already sorted label list
pub fn generate_ordered_pairs<S: AsRef<str>>(categories: &[S]) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(categories.len() * (categories.len() + 1) / 2);
    for (i, x) in categories.iter().enumerate() {
        for y in &categories[i..] {
            pairs.push((x.as_ref().to_string(), y.as_ref().to_string()));
        }
    }
    pairs
}

fn is_constant(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0] == w[1])
}

/// Pearson correlation; NaN for fewer than two values or zero variance
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return f64::NAN;
    }
    let (x, y) = (&x[..n], &y[..n]);
    if is_constant(x) || is_constant(y) {
        return f64::NAN;
    }

    let mean_x = x.iter().sum::<f64>() / n as f64;
    let mean_y = y.iter().sum::<f64>() / n as f64;
    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x == 0.0 || var_y == 0.0 {
        return f64::NAN;
    }
    (cov / (var_x * var_y).sqrt()).clamp(-1.0, 1.0)
}

/// 1-based ranks with ties given the average of the ranks they span
pub fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        let rank = (start + end + 1) as f64 / 2.0;
        for &index in &order[start..end] {
            ranks[index] = rank;
        }
        start = end;
    }
    ranks
}

/// Spearman correlation: Pearson over average ranks
pub fn spearman(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    pearson(&average_ranks(&x[..n]), &average_ranks(&y[..n]))
}

pub fn correlate(method: CorrelationMethod, x: &[f64], y: &[f64]) -> f64 {
    match method {
        CorrelationMethod::Pearson => pearson(x, y),
        CorrelationMethod::Spearman => spearman(x, y),
    }
}

/// Correlation of one category pair in one group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationRecord {
    /// Values of the grouping columns
    pub keys: Vec<Option<String>>,
    pub value_col_name: String,
    pub var_x: String,
    pub var_y: String,
    /// NaN when undefined (constant series or fewer than two pairs)
    pub correlation: f64,
    pub n: usize,
}

#[derive(Debug, Clone)]
pub struct CorrelationOutput {
    pub key_columns: Vec<String>,
    pub method: CorrelationMethod,
    pub records: Vec<CorrelationRecord>,
    pub table: DataFrame,
    pub metadata: ResultMetadata,
}

impl CorrelationOutput {
    pub fn to_frame(&self, format: OutputFormat) -> Result<DataFrame> {
        match format {
            OutputFormat::Tidy => tidy_frame(&self.key_columns, &self.records),
            OutputFormat::Wide => wide_frame(&self.key_columns, &self.records),
        }
    }

    /// Look up the correlation of a pair within a group
    pub fn get(&self, keys: &[Option<String>], value_col_name: &str, x: &str, y: &str) -> Option<&CorrelationRecord> {
        self.records.iter().find(|r| {
            r.keys == keys && r.value_col_name == value_col_name && r.var_x == x && r.var_y == y
        })
    }
}

fn tidy_frame(key_columns: &[String], records: &[CorrelationRecord]) -> Result<DataFrame> {
    let mut keys = KeyColumns::new(key_columns);
    for record in records {
        keys.push(&GroupKey(record.keys.clone()));
    }
    let mut columns = keys.into_columns();
    columns.push(Column::new(
        output::VALUE_COL_NAME.into(),
        records.iter().map(|r| r.value_col_name.clone()).collect::<Vec<_>>(),
    ));
    columns.push(Column::new(
        output::VAR_X.into(),
        records.iter().map(|r| r.var_x.clone()).collect::<Vec<_>>(),
    ));
    columns.push(Column::new(
        output::VAR_Y.into(),
        records.iter().map(|r| r.var_y.clone()).collect::<Vec<_>>(),
    ));
    columns.push(Column::new(
        output::CORRELATION.into(),
        records.iter().map(|r| r.correlation).collect::<Vec<_>>(),
    ));
    columns.push(Column::new(
        output::N.into(),
        records.iter().map(|r| r.n as u64).collect::<Vec<_>>(),
    ));
    Ok(DataFrame::new(columns)?)
}

/// One row per (group, value column, var_x), one column per var_y label
fn wide_frame(key_columns: &[String], records: &[CorrelationRecord]) -> Result<DataFrame> {
    let y_labels: BTreeSet<&str> = records.iter().map(|r| r.var_y.as_str()).collect();
    let mut rows: BTreeMap<(GroupKey, &str, &str), BTreeMap<&str, f64>> = BTreeMap::new();
    for record in records {
        rows.entry((
            GroupKey(record.keys.clone()),
            record.value_col_name.as_str(),
            record.var_x.as_str(),
        ))
        .or_default()
        .insert(record.var_y.as_str(), record.correlation);
    }

    let mut keys = KeyColumns::new(key_columns);
    let mut value_col_names = Vec::with_capacity(rows.len());
    let mut var_x = Vec::with_capacity(rows.len());
    for (key, value_col_name, x) in rows.keys() {
        keys.push(key);
        value_col_names.push(value_col_name.to_string());
        var_x.push(x.to_string());
    }

    let mut columns = keys.into_columns();
    columns.push(Column::new(output::VALUE_COL_NAME.into(), value_col_names));
    columns.push(Column::new(output::VAR_X.into(), var_x));
    for label in y_labels {
        let values: Vec<Option<f64>> = rows.values().map(|cells| cells.get(label).copied()).collect();
        columns.push(Column::new(label.into(), values));
    }
    Ok(DataFrame::new(columns)?)
}

/// Fail on missing units or mixed unit families unless overridden
fn resolve_units(dataset: &TimeSeriesDataset, config: &CorrelationConfig) -> Result<UnitsStatus> {
    let (_, missing) = check_units_present(
        dataset,
        &config.value_columns,
        "Correlation analysis",
        config.allow_missing_units,
    )?;

    let by_family: BTreeMap<UnitFamily, Vec<&str>> =
        config
            .value_columns
            .iter()
            .fold(BTreeMap::new(), |mut acc, column| {
                if let Some(unit) = dataset.column_unit(column) {
                    acc.entry(unit.family()).or_insert_with(Vec::new).push(column.as_str());
                }
                acc
            });

    let mixed: Vec<UnitFamily> = if by_family.len() > 1 {
        if !config.allow_mixed_unit_families {
            let detail = by_family
                .iter()
                .map(|(family, columns)| format!("{} ({})", family, columns.join(", ")))
                .collect::<Vec<_>>()
                .join(" vs ");
            return Err(StatsError::unit(format!(
                "Value columns belong to different unit families: {}. Set allow_mixed_unit_families to override",
                detail
            )));
        }
        warn!("Correlating value columns from mixed unit families");
        by_family.keys().copied().collect()
    } else {
        Vec::new()
    };

    if missing.is_empty() && mixed.is_empty() {
        Ok(UnitsStatus::enforced())
    } else {
        Ok(UnitsStatus::overridden(missing, mixed))
    }
}

/// Compute pairwise correlations between categories for each value column
pub fn compute_pairwise(
    dataset: &TimeSeriesDataset,
    config: &CorrelationConfig,
) -> Result<CorrelationOutput> {
    config.validate()?;
    let units_status = resolve_units(dataset, config)?;

    let frame = dataset.frame();
    schema::require_columns(frame, &config.value_columns, "value")?;
    schema::require_columns(frame, &[config.category_column.as_str()], "category")?;
    schema::validate_grouping_columns(frame, &config.group_by)?;
    if let Some(flag) = &config.flag_column {
        schema::require_columns(frame, &[flag.as_str()], "QC flag")?;
    }
    for column in &config.value_columns {
        schema::validate_numeric_column(frame, column, true, true)?;
    }

    let mut key_and_category = config.group_by.clone();
    key_and_category.push(config.category_column.clone());

    let mut records = Vec::new();
    let mut group_keys: BTreeSet<GroupKey> = BTreeSet::new();

    for value_column in &config.value_columns {
        let mut pipeline = QcPipeline::new(frame);
        if let Some(flag) = &config.flag_column {
            pipeline = pipeline
                .filter_excluded(flag, &EXCLUDE_FLAGS)
                .mark_missing(value_column, flag, &MISSING_FLAGS);
        }
        let mut projection = key_and_category.clone();
        projection.push(value_column.clone());
        let prepared = pipeline.select(&projection).materialize()?;

        let values = schema::f64_values(&prepared, value_column)?;
        let cells = partition_rows(&prepared, &key_and_category)?;

        // group -> category -> valid values in row order
        let mut grouped: BTreeMap<GroupKey, BTreeMap<String, Vec<f64>>> = BTreeMap::new();
        for (key, rows) in cells {
            let mut components = key.0;
            let Some(category) = components.pop().flatten() else {
                continue;
            };
            let valid: Vec<f64> = rows.iter().filter_map(|&row| values[row]).collect();
            grouped
                .entry(GroupKey(components))
                .or_default()
                .insert(category, valid);
        }

        for (group, categories) in grouped {
            let eligible: Vec<&String> = categories
                .iter()
                .filter(|(_, v)| v.len() >= config.min_samples)
                .map(|(label, _)| label)
                .collect();
            let dropped = categories.len() - eligible.len();
            if dropped > 0 {
                debug!(
                    "Group {:?}: {} categories below min_samples={}",
                    group.values(),
                    dropped,
                    config.min_samples
                );
            }
            if eligible.is_empty() {
                continue;
            }

            for (x, y) in generate_ordered_pairs(&eligible) {
                let (xs, ys) = (&categories[&x], &categories[&y]);
                let n = xs.len().min(ys.len());
                let correlation = if n == 0 {
                    f64::NAN
                } else {
                    correlate(config.method, &xs[..n], &ys[..n])
                };
                records.push(CorrelationRecord {
                    keys: group.values().to_vec(),
                    value_col_name: value_column.clone(),
                    var_x: x,
                    var_y: y,
                    correlation,
                    n,
                });
            }
            group_keys.insert(group);
        }
    }

    let table = match config.output_format {
        OutputFormat::Tidy => tidy_frame(&config.group_by, &records)?,
        OutputFormat::Wide => wide_frame(&config.group_by, &records)?,
    };
    let metadata = ResultMetadata {
        time_bounds: dataset.time_bounds()?,
        units_status,
        n_input_rows: dataset.n_rows(),
        n_groups: group_keys.len(),
    };
    info!(
        "{} correlation: {} pairs across {} groups",
        config.method,
        records.len(),
        metadata.n_groups
    );

    Ok(CorrelationOutput {
        key_columns: config.group_by.clone(),
        method: config.method,
        records,
        table,
        metadata,
    })
}
