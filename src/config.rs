//! Configuration management and validation.
//!
//! Provides one configuration structure per analysis engine plus the
//! reporting configuration. Every structure is validated before any data is
//! touched so that bad parameters fail fast.

use crate::analysis::descriptive::quantile_label;
use crate::constants::{
    DEFAULT_MIN_DURATION_YEARS, DEFAULT_MIN_SAMPLES, DEFAULT_QUANTILES, columns,
};
use crate::error::{Result, StatsError};
use crate::models::{CorrelationMethod, OutputFormat, Statistic};
use crate::time::TimeUnit;
use crate::units::RoundingPolicy;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

fn require_value_columns(columns: &[String], engine: &str) -> Result<()> {
    if columns.is_empty() {
        return Err(StatsError::configuration(format!(
            "{} analysis requires at least one value column",
            engine
        )));
    }
    let mut seen = HashSet::new();
    for column in columns {
        if !seen.insert(column.as_str()) {
            return Err(StatsError::configuration(format!(
                "Value column '{}' listed more than once",
                column
            )));
        }
    }
    Ok(())
}

fn require_min_samples(min_samples: usize) -> Result<()> {
    if min_samples == 0 {
        return Err(StatsError::configuration(
            "min_samples must be at least 1",
        ));
    }
    Ok(())
}

/// Configuration for the descriptive statistics engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptiveConfig {
    /// Numeric columns to summarise, each with its own QC pass
    pub value_columns: Vec<String>,

    /// Extra grouping columns (e.g. site)
    pub group_by: Vec<String>,

    /// Optional category column added after the grouping columns
    pub category_column: Option<String>,

    /// QC flag column; QC is skipped when unset or absent from the data
    pub flag_column: Option<String>,

    /// Statistics to compute, emitted in canonical order
    pub statistics: Vec<Statistic>,

    /// Quantile levels used when `Statistic::Quantiles` is requested
    pub quantiles: Vec<f64>,

    pub output_format: OutputFormat,
}

impl Default for DescriptiveConfig {
    fn default() -> Self {
        Self {
            value_columns: vec![columns::CONC.to_string()],
            group_by: Vec::new(),
            category_column: None,
            flag_column: Some(columns::FLAG.to_string()),
            statistics: Statistic::ALL.to_vec(),
            quantiles: DEFAULT_QUANTILES.to_vec(),
            output_format: OutputFormat::Tidy,
        }
    }
}

impl DescriptiveConfig {
    pub fn with_value_columns<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.value_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_group_by<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.group_by = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_category_column(mut self, column: impl Into<String>) -> Self {
        self.category_column = Some(column.into());
        self
    }

    pub fn with_flag_column(mut self, column: impl Into<String>) -> Self {
        self.flag_column = Some(column.into());
        self
    }

    /// Disable QC filtering entirely
    pub fn without_flag_column(mut self) -> Self {
        self.flag_column = None;
        self
    }

    pub fn with_statistics(mut self, statistics: impl IntoIterator<Item = Statistic>) -> Self {
        self.statistics = statistics.into_iter().collect();
        self
    }

    pub fn with_quantiles(mut self, quantiles: impl IntoIterator<Item = f64>) -> Self {
        self.quantiles = quantiles.into_iter().collect();
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    /// Requested statistics, deduplicated, in canonical output order
    pub fn ordered_statistics(&self) -> Vec<Statistic> {
        Statistic::ALL
            .iter()
            .copied()
            .filter(|stat| self.statistics.contains(stat))
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        require_value_columns(&self.value_columns, "Descriptive")?;

        if let Some(category) = &self.category_column {
            if self.group_by.contains(category) {
                return Err(StatsError::configuration(format!(
                    "Category column '{}' cannot also be a grouping column",
                    category
                )));
            }
        }

        if self.statistics.is_empty() {
            return Err(StatsError::configuration(
                "At least one statistic must be requested",
            ));
        }

        if self.statistics.contains(&Statistic::Quantiles) {
            if self.quantiles.is_empty() {
                return Err(StatsError::configuration(
                    "Quantiles requested but no quantile levels configured",
                ));
            }
            let mut labels = HashSet::new();
            for &q in &self.quantiles {
                if !q.is_finite() || !(0.0..=1.0).contains(&q) {
                    return Err(StatsError::configuration(format!(
                        "Quantile level {} outside [0, 1]",
                        q
                    )));
                }
                let label = quantile_label(q);
                if !labels.insert(label.clone()) {
                    return Err(StatsError::configuration(format!(
                        "Quantile level {} duplicates output label '{}'",
                        q, label
                    )));
                }
            }
        }

        debug!(
            "Descriptive config validated: {} value columns, {} statistics",
            self.value_columns.len(),
            self.statistics.len()
        );
        Ok(())
    }
}

/// Configuration for the pairwise correlation engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationConfig {
    pub value_columns: Vec<String>,

    /// Column whose labels form the correlated variables
    pub category_column: String,

    pub group_by: Vec<String>,
    pub method: CorrelationMethod,

    /// Minimum valid observations a category needs within a group
    pub min_samples: usize,

    /// QC flag column; must exist in the data when set
    pub flag_column: Option<String>,

    /// Record missing unit metadata as overridden instead of failing
    pub allow_missing_units: bool,

    /// Permit value columns from different unit families
    pub allow_mixed_unit_families: bool,

    pub output_format: OutputFormat,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            value_columns: vec![columns::CONC.to_string()],
            category_column: columns::POLLUTANT.to_string(),
            group_by: Vec::new(),
            method: CorrelationMethod::Pearson,
            min_samples: DEFAULT_MIN_SAMPLES,
            flag_column: Some(columns::FLAG.to_string()),
            allow_missing_units: false,
            allow_mixed_unit_families: false,
            output_format: OutputFormat::Tidy,
        }
    }
}

impl CorrelationConfig {
    pub fn with_value_columns<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.value_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_category_column(mut self, column: impl Into<String>) -> Self {
        self.category_column = column.into();
        self
    }

    pub fn with_group_by<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.group_by = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_method(mut self, method: CorrelationMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_min_samples(mut self, min_samples: usize) -> Self {
        self.min_samples = min_samples;
        self
    }

    pub fn with_flag_column(mut self, column: impl Into<String>) -> Self {
        self.flag_column = Some(column.into());
        self
    }

    pub fn without_flag_column(mut self) -> Self {
        self.flag_column = None;
        self
    }

    pub fn with_allow_missing_units(mut self, allow: bool) -> Self {
        self.allow_missing_units = allow;
        self
    }

    pub fn with_allow_mixed_unit_families(mut self, allow: bool) -> Self {
        self.allow_mixed_unit_families = allow;
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    pub fn validate(&self) -> Result<()> {
        require_value_columns(&self.value_columns, "Correlation")?;
        require_min_samples(self.min_samples)?;
        if self.group_by.contains(&self.category_column) {
            return Err(StatsError::configuration(format!(
                "Category column '{}' cannot also be a grouping column",
                self.category_column
            )));
        }
        Ok(())
    }
}

/// Configuration for the linear trend engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendConfig {
    /// Unit of the regression's time axis
    pub time_unit: TimeUnit,

    pub value_column: String,
    pub category_column: String,
    pub datetime_column: String,
    pub group_by: Vec<String>,
    pub min_samples: usize,

    /// Trends spanning fewer calendar years than this are flagged
    pub min_duration_years: f64,

    pub flag_column: Option<String>,
    pub allow_missing_units: bool,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            time_unit: TimeUnit::CalendarYear,
            value_column: columns::CONC.to_string(),
            category_column: columns::POLLUTANT.to_string(),
            datetime_column: columns::DATETIME.to_string(),
            group_by: Vec::new(),
            min_samples: DEFAULT_MIN_SAMPLES,
            min_duration_years: DEFAULT_MIN_DURATION_YEARS,
            flag_column: Some(columns::FLAG.to_string()),
            allow_missing_units: false,
        }
    }
}

impl TrendConfig {
    pub fn with_time_unit(mut self, time_unit: TimeUnit) -> Self {
        self.time_unit = time_unit;
        self
    }

    pub fn with_value_column(mut self, column: impl Into<String>) -> Self {
        self.value_column = column.into();
        self
    }

    pub fn with_category_column(mut self, column: impl Into<String>) -> Self {
        self.category_column = column.into();
        self
    }

    pub fn with_datetime_column(mut self, column: impl Into<String>) -> Self {
        self.datetime_column = column.into();
        self
    }

    pub fn with_group_by<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.group_by = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_min_samples(mut self, min_samples: usize) -> Self {
        self.min_samples = min_samples;
        self
    }

    pub fn with_min_duration_years(mut self, years: f64) -> Self {
        self.min_duration_years = years;
        self
    }

    pub fn with_flag_column(mut self, column: impl Into<String>) -> Self {
        self.flag_column = Some(column.into());
        self
    }

    pub fn without_flag_column(mut self) -> Self {
        self.flag_column = None;
        self
    }

    pub fn with_allow_missing_units(mut self, allow: bool) -> Self {
        self.allow_missing_units = allow;
        self
    }

    pub fn validate(&self) -> Result<()> {
        require_min_samples(self.min_samples)?;
        if !self.min_duration_years.is_finite() || self.min_duration_years < 0.0 {
            return Err(StatsError::configuration(format!(
                "min_duration_years must be a non-negative finite number, got {}",
                self.min_duration_years
            )));
        }
        if self.group_by.contains(&self.category_column) {
            return Err(StatsError::configuration(format!(
                "Category column '{}' cannot also be a grouping column",
                self.category_column
            )));
        }
        Ok(())
    }
}

/// Reporting precision overrides applied when results are rounded for display
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportingConfig {
    /// Category label (case-insensitive) -> decimal places
    pub rounding_overrides: HashMap<String, u32>,
}

impl ReportingConfig {
    pub fn with_rounding_override(mut self, category: impl Into<String>, decimals: u32) -> Self {
        self.rounding_overrides.insert(category.into(), decimals);
        self
    }

    pub fn rounding_policy(&self) -> RoundingPolicy {
        RoundingPolicy::from_overrides(&self.rounding_overrides)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::Unit;

    #[test]
    fn test_descriptive_defaults() {
        let config = DescriptiveConfig::default();
        assert_eq!(config.value_columns, vec!["conc"]);
        assert_eq!(config.flag_column.as_deref(), Some("flag"));
        assert_eq!(config.quantiles, vec![0.05, 0.25, 0.75, 0.95]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_descriptive_rejects_empty_statistics() {
        let config = DescriptiveConfig::default().with_statistics(Vec::new());
        assert!(matches!(
            config.validate().unwrap_err(),
            StatsError::Configuration { .. }
        ));
    }

    #[test]
    fn test_descriptive_rejects_out_of_range_quantile() {
        let config = DescriptiveConfig::default().with_quantiles([0.5, 1.5]);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("1.5"));
    }

    #[test]
    fn test_descriptive_rejects_duplicate_quantile_labels() {
        let config = DescriptiveConfig::default().with_quantiles([0.25, 0.25]);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("q25"));
    }

    #[test]
    fn test_descriptive_rejects_category_in_group_by() {
        let config = DescriptiveConfig::default()
            .with_group_by(["pollutant"])
            .with_category_column("pollutant");
        match config.validate().unwrap_err() {
            StatsError::Configuration { message } => assert!(message.contains("pollutant")),
            other => panic!("Expected Configuration error, got {:?}", other),
        }
        assert!(
            DescriptiveConfig::default()
                .with_group_by(["site_id"])
                .with_category_column("pollutant")
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn test_quantile_range_ignored_without_quantile_statistic() {
        let config = DescriptiveConfig::default()
            .with_statistics([Statistic::Mean])
            .with_quantiles([2.0]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ordered_statistics_canonical() {
        let config = DescriptiveConfig::default().with_statistics([
            Statistic::Max,
            Statistic::Mean,
            Statistic::Max,
        ]);
        assert_eq!(
            config.ordered_statistics(),
            vec![Statistic::Mean, Statistic::Max]
        );
    }

    #[test]
    fn test_correlation_min_samples_zero_rejected() {
        let config = CorrelationConfig::default().with_min_samples(0);
        assert!(config.validate().is_err());
        assert!(CorrelationConfig::default().validate().is_ok());
    }

    #[test]
    fn test_correlation_category_in_group_by_rejected() {
        let config = CorrelationConfig::default().with_group_by(["pollutant"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_trend_duration_validation() {
        assert!(TrendConfig::default().validate().is_ok());
        assert!(TrendConfig::default().with_min_duration_years(-1.0).validate().is_err());
        assert!(TrendConfig::default().with_min_duration_years(f64::NAN).validate().is_err());
    }

    #[test]
    fn test_trend_config_serde() {
        let config = TrendConfig::default().with_time_unit(TimeUnit::Day);
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"day\""));
        let back: TrendConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.time_unit, TimeUnit::Day);
    }

    #[test]
    fn test_reporting_policy_from_overrides() {
        let policy = ReportingConfig::default()
            .with_rounding_override("pm25", 0)
            .rounding_policy();
        assert_eq!(policy.precision_for(Unit::UG_M3, Some("PM25")), 0);
        assert_eq!(policy.precision_for(Unit::UG_M3, Some("NO2")), 1);
    }
}
