//! Core data structures shared by the analysis engines.
//!
//! Defines the statistic and method vocabularies, output layout selection,
//! and the metadata record every engine returns alongside its results.

use crate::error::{Result, StatsError};
use crate::time::TimeBounds;
use crate::units::UnitFamily;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Result table layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One row per statistic (or pair) per group
    #[default]
    Tidy,
    /// One row per group, one column per statistic (or `var_y`)
    Wide,
}

impl FromStr for OutputFormat {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tidy" => Ok(OutputFormat::Tidy),
            "wide" => Ok(OutputFormat::Wide),
            other => Err(StatsError::configuration(format!(
                "Invalid output format '{}'. Must be one of: tidy, wide",
                other
            ))),
        }
    }
}

/// Statistics the descriptive engine can compute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Statistic {
    Mean,
    Median,
    Std,
    Min,
    Max,
    Count,
    /// Expands to one output statistic per configured quantile level
    Quantiles,
}

impl Statistic {
    /// All statistics in canonical output order
    pub const ALL: [Statistic; 7] = [
        Statistic::Mean,
        Statistic::Median,
        Statistic::Std,
        Statistic::Min,
        Statistic::Max,
        Statistic::Count,
        Statistic::Quantiles,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Statistic::Mean => "mean",
            Statistic::Median => "median",
            Statistic::Std => "std",
            Statistic::Min => "min",
            Statistic::Max => "max",
            Statistic::Count => "count",
            Statistic::Quantiles => "quantiles",
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Statistic {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self> {
        Statistic::ALL
            .iter()
            .copied()
            .find(|stat| stat.as_str() == s)
            .ok_or_else(|| {
                StatsError::configuration(format!(
                    "Invalid statistic '{}'. Must be one of: mean, median, std, min, max, count, quantiles",
                    s
                ))
            })
    }
}

/// Correlation coefficient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationMethod {
    #[default]
    Pearson,
    Spearman,
}

impl CorrelationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorrelationMethod::Pearson => "pearson",
            CorrelationMethod::Spearman => "spearman",
        }
    }
}

impl fmt::Display for CorrelationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CorrelationMethod {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pearson" => Ok(CorrelationMethod::Pearson),
            "spearman" => Ok(CorrelationMethod::Spearman),
            _ => Err(StatsError::configuration(format!(
                "Invalid correlation method '{}'. Must be one of: pearson, spearman",
                s
            ))),
        }
    }
}

/// How unit metadata requirements were resolved for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitsEnforcement {
    /// Every analysed column carried unit metadata
    Enforced,
    /// A unit requirement failed but an override flag allowed the run
    Overridden,
    /// The operation does not depend on units
    NotRequired,
}

impl UnitsEnforcement {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitsEnforcement::Enforced => "enforced",
            UnitsEnforcement::Overridden => "overridden",
            UnitsEnforcement::NotRequired => "not_required",
        }
    }
}

/// Units outcome recorded in result metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitsStatus {
    pub status: UnitsEnforcement,
    /// Value columns that had no unit metadata
    pub missing_units: Vec<String>,
    /// Distinct families seen across value columns when they disagreed
    pub mixed_families: Vec<UnitFamily>,
}

impl UnitsStatus {
    pub fn enforced() -> Self {
        Self {
            status: UnitsEnforcement::Enforced,
            missing_units: Vec::new(),
            mixed_families: Vec::new(),
        }
    }

    pub fn not_required() -> Self {
        Self {
            status: UnitsEnforcement::NotRequired,
            missing_units: Vec::new(),
            mixed_families: Vec::new(),
        }
    }

    pub fn overridden(missing_units: Vec<String>, mixed_families: Vec<UnitFamily>) -> Self {
        Self {
            status: UnitsEnforcement::Overridden,
            missing_units,
            mixed_families,
        }
    }
}

/// Auxiliary information returned with every engine result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    /// Time span of the input dataset (absent when the time column is all null)
    pub time_bounds: Option<TimeBounds>,
    pub units_status: UnitsStatus,
    pub n_input_rows: usize,
    /// Number of result groups (descriptive/correlation) or regressions (trend)
    pub n_groups: usize,
}
