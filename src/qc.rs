//! Quality control flag policy.
//!
//! Flags fall into exactly one of three dispositions:
//!
//! - `invalid` and `outlier` rows are **excluded**: removed before any
//!   statistic sees them, not counted anywhere.
//! - `below_dl` rows are **missing**: the value is nulled but the row still
//!   counts towards totals.
//! - everything else, including a null flag or an unknown token, is **valid**.
//!
//! Every engine applies [`filter_excluded`] first, then [`mark_missing`],
//! then aggregates over the non-null values.

use crate::constants::flag_tokens;
use crate::error::{Result, StatsError};
use crate::schema;
use polars::prelude::{DataFrame, DataType, Expr, IntoLazy, NULL, col, lit, when};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Closed vocabulary of QC flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QcFlag {
    Valid,
    #[serde(rename = "below_dl")]
    BelowDetectionLimit,
    Invalid,
    Outlier,
}

/// What a flag does to its row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QcDisposition {
    Valid,
    Missing,
    Excluded,
}

/// Flags whose rows are dropped entirely
pub const EXCLUDE_FLAGS: [QcFlag; 2] = [QcFlag::Invalid, QcFlag::Outlier];

/// Flags whose values are treated as missing
pub const MISSING_FLAGS: [QcFlag; 1] = [QcFlag::BelowDetectionLimit];

impl QcFlag {
    pub const ALL: [QcFlag; 4] = [
        QcFlag::Valid,
        QcFlag::BelowDetectionLimit,
        QcFlag::Invalid,
        QcFlag::Outlier,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QcFlag::Valid => flag_tokens::VALID,
            QcFlag::BelowDetectionLimit => flag_tokens::BELOW_DL,
            QcFlag::Invalid => flag_tokens::INVALID,
            QcFlag::Outlier => flag_tokens::OUTLIER,
        }
    }

    /// Exact token lookup; unknown tokens are not flags
    pub fn parse(token: &str) -> Option<QcFlag> {
        QcFlag::ALL.iter().copied().find(|f| f.as_str() == token)
    }

    pub fn disposition(&self) -> QcDisposition {
        if EXCLUDE_FLAGS.contains(self) {
            QcDisposition::Excluded
        } else if MISSING_FLAGS.contains(self) {
            QcDisposition::Missing
        } else {
            QcDisposition::Valid
        }
    }
}

impl fmt::Display for QcFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Disposition of a raw flag cell; null and unknown tokens are valid
pub fn disposition_of(token: Option<&str>) -> QcDisposition {
    token
        .and_then(QcFlag::parse)
        .map(|flag| flag.disposition())
        .unwrap_or(QcDisposition::Valid)
}

fn flag_expr(flag_column: &str) -> Expr {
    col(flag_column).cast(DataType::String)
}

/// `flag ∈ flags` as an OR-chain; null flags never match
fn flag_in(flag_column: &str, flags: &[QcFlag]) -> Option<Expr> {
    flags
        .iter()
        .map(|f| flag_expr(flag_column).eq(lit(f.as_str())))
        .reduce(|acc, e| acc.or(e))
}

/// Predicate keeping rows whose flag is null or outside `exclude`
pub fn keep_predicate(flag_column: &str, exclude: &[QcFlag]) -> Expr {
    match flag_in(flag_column, exclude) {
        Some(matches) => flag_expr(flag_column).is_null().or(matches.not()),
        None => lit(true),
    }
}

/// `value` as Float64, nulled where the flag is in `flags`
pub fn null_where_flagged(value_column: &str, flag_column: &str, flags: &[QcFlag]) -> Expr {
    let value = col(value_column).cast(DataType::Float64);
    match flag_in(flag_column, flags) {
        Some(matches) => when(flag_expr(flag_column).is_not_null().and(matches))
            .then(lit(NULL).cast(DataType::Float64))
            .otherwise(value)
            .alias(value_column),
        None => value.alias(value_column),
    }
}

fn require_flag_column(frame: &DataFrame, flag_column: &str) -> Result<()> {
    if schema::has_column(frame, flag_column) {
        return Ok(());
    }
    let available: Vec<String> = frame
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();
    Err(StatsError::schema(format!(
        "Missing required QC flag column '{}'. Available columns: {:?}",
        flag_column, available
    )))
}

/// Drop rows flagged with any of `exclude`
pub fn filter_excluded(frame: &DataFrame, flag_column: &str, exclude: &[QcFlag]) -> Result<DataFrame> {
    require_flag_column(frame, flag_column)?;
    let filtered = frame
        .clone()
        .lazy()
        .filter(keep_predicate(flag_column, exclude))
        .collect()?;
    debug!(
        "QC exclusion on '{}' kept {} of {} rows",
        flag_column,
        filtered.height(),
        frame.height()
    );
    Ok(filtered)
}

/// Null `value_column` where the flag is in `missing`; row count is unchanged
pub fn mark_missing(
    frame: &DataFrame,
    value_column: &str,
    flag_column: &str,
    missing: &[QcFlag],
) -> Result<DataFrame> {
    require_flag_column(frame, flag_column)?;
    schema::require_columns(frame, &[value_column], "value")?;
    Ok(frame
        .clone()
        .lazy()
        .with_column(null_where_flagged(value_column, flag_column, missing))
        .collect()?)
}
