//! Command-line argument definitions for aq-stats
//!
//! This module defines the CLI interface using the clap derive API. Every
//! analysis subcommand shares the [`InputArgs`] block for locating and
//! annotating the input table.

use crate::config::{CorrelationConfig, DescriptiveConfig, ReportingConfig, TrendConfig};
use crate::constants::{DEFAULT_MIN_DURATION_YEARS, DEFAULT_MIN_SAMPLES, columns};
use crate::error::{Result, StatsError};
use crate::models::{CorrelationMethod, OutputFormat, Statistic};
use crate::time::TimeUnit;
use crate::units::Unit;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;

/// CLI arguments for the air quality statistics tool
#[derive(Debug, Clone, Parser)]
#[command(
    name = "aq-stats",
    version,
    about = "QC-aware descriptive, correlation and trend statistics for air quality time series",
    long_about = "Runs quality-controlled statistics over long-format air quality data \
                  (datetime, site_id, pollutant, conc, flag) read from CSV or Parquet. \
                  Invalid and outlier observations are excluded, below-detection-limit \
                  observations are counted as missing, and results are printed as tidy \
                  or wide tables or as JSON records."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Grouped descriptive statistics per value column
    Descriptive(DescriptiveArgs),
    /// Pairwise correlation between categories (e.g. pollutants)
    Correlation(CorrelationArgs),
    /// Linear trend per category over time
    Trend(TrendArgs),
    /// Report the time span covered by the input
    Bounds(BoundsArgs),
}

/// Input location, schema hints and logging options shared by every command
#[derive(Debug, Clone, ClapArgs)]
pub struct InputArgs {
    /// Input table (.csv or .parquet)
    #[arg(short = 'i', long = "input", value_name = "FILE")]
    pub input_path: PathBuf,

    /// Name of the timestamp column
    #[arg(long = "time-column", value_name = "COLUMN", default_value = columns::DATETIME)]
    pub time_column: String,

    /// Unit metadata for a value column, e.g. `--unit conc=ug/m3` (repeatable)
    #[arg(long = "unit", value_name = "COLUMN=UNIT")]
    pub units: Vec<UnitAssignment>,

    /// Logging verbosity level
    #[arg(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
        help = "Increase logging verbosity (-v: info, -vv: debug, -vvv: trace)"
    )]
    pub verbose: u8,

    /// Only show errors
    #[arg(
        short = 'q',
        long = "quiet",
        help = "Suppress output except errors",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,
}

/// Result presentation options
#[derive(Debug, Clone, ClapArgs)]
pub struct OutputArgs {
    /// Table layout (tidy or wide)
    #[arg(long = "format", value_name = "LAYOUT", default_value = "tidy")]
    pub format: OutputFormat,

    /// Print typed records as JSON instead of a table
    #[arg(long = "json")]
    pub json: bool,

    /// Print result metadata (time bounds, unit status, group counts)
    #[arg(long = "metadata")]
    pub show_metadata: bool,
}

#[derive(Debug, Clone, Parser)]
pub struct DescriptiveArgs {
    #[command(flatten)]
    pub input: InputArgs,

    #[command(flatten)]
    pub output: OutputArgs,

    /// Numeric columns to summarise (comma-separated)
    #[arg(long = "value", value_name = "COLUMNS", value_delimiter = ',', default_value = columns::CONC)]
    pub value_columns: Vec<String>,

    /// Grouping columns (comma-separated)
    #[arg(short = 'g', long = "group-by", value_name = "COLUMNS", value_delimiter = ',')]
    pub group_by: Vec<String>,

    /// Category column added to the grouping keys
    #[arg(long = "category", value_name = "COLUMN")]
    pub category: Option<String>,

    /// Statistics to compute (comma-separated); all when omitted
    #[arg(long = "stats", value_name = "LIST", value_delimiter = ',')]
    pub statistics: Vec<Statistic>,

    /// Quantile levels in [0, 1] (comma-separated)
    #[arg(long = "quantiles", value_name = "LIST", value_delimiter = ',')]
    pub quantiles: Vec<f64>,

    /// QC flag column
    #[arg(long = "flag-column", value_name = "COLUMN", default_value = columns::FLAG)]
    pub flag_column: String,

    /// Round statistics to reporting precision of the column unit
    #[arg(long = "round")]
    pub round: bool,

    /// Per-category decimal places, e.g. `--round-override NO2=2` (repeatable)
    #[arg(long = "round-override", value_name = "CATEGORY=DECIMALS", requires = "round")]
    pub round_overrides: Vec<RoundingOverride>,
}

#[derive(Debug, Clone, Parser)]
pub struct CorrelationArgs {
    #[command(flatten)]
    pub input: InputArgs,

    #[command(flatten)]
    pub output: OutputArgs,

    /// Numeric columns to correlate within (comma-separated)
    #[arg(long = "value", value_name = "COLUMNS", value_delimiter = ',', default_value = columns::CONC)]
    pub value_columns: Vec<String>,

    /// Column whose labels are correlated against each other
    #[arg(long = "category", value_name = "COLUMN", default_value = columns::POLLUTANT)]
    pub category: String,

    /// Grouping columns (comma-separated)
    #[arg(short = 'g', long = "group-by", value_name = "COLUMNS", value_delimiter = ',')]
    pub group_by: Vec<String>,

    /// Correlation method (pearson or spearman)
    #[arg(long = "method", default_value = "pearson")]
    pub method: CorrelationMethod,

    /// Minimum valid observations per category within a group
    #[arg(long = "min-samples", default_value_t = DEFAULT_MIN_SAMPLES)]
    pub min_samples: usize,

    /// QC flag column
    #[arg(long = "flag-column", value_name = "COLUMN", default_value = columns::FLAG)]
    pub flag_column: String,

    /// Proceed when value columns have no unit metadata
    #[arg(long = "allow-missing-units")]
    pub allow_missing_units: bool,

    /// Proceed when value columns belong to different unit families
    #[arg(long = "allow-mixed-units")]
    pub allow_mixed_unit_families: bool,
}

#[derive(Debug, Clone, Parser)]
pub struct TrendArgs {
    #[command(flatten)]
    pub input: InputArgs,

    #[command(flatten)]
    pub output: OutputArgs,

    /// Numeric column to regress
    #[arg(long = "value", value_name = "COLUMN", default_value = columns::CONC)]
    pub value_column: String,

    /// Category column; one trend is fitted per category
    #[arg(long = "category", value_name = "COLUMN", default_value = columns::POLLUTANT)]
    pub category: String,

    /// Grouping columns (comma-separated)
    #[arg(short = 'g', long = "group-by", value_name = "COLUMNS", value_delimiter = ',')]
    pub group_by: Vec<String>,

    /// Time axis unit (hour, day, calendar_month, calendar_year)
    #[arg(long = "time-unit", default_value = "calendar_year")]
    pub time_unit: TimeUnit,

    /// Minimum valid observations per fitted group
    #[arg(long = "min-samples", default_value_t = DEFAULT_MIN_SAMPLES)]
    pub min_samples: usize,

    /// Trends spanning fewer calendar years are flagged as short
    #[arg(long = "min-duration-years", default_value_t = DEFAULT_MIN_DURATION_YEARS)]
    pub min_duration_years: f64,

    /// QC flag column
    #[arg(long = "flag-column", value_name = "COLUMN", default_value = columns::FLAG)]
    pub flag_column: String,

    /// Proceed when the value column has no unit metadata
    #[arg(long = "allow-missing-units")]
    pub allow_missing_units: bool,
}

#[derive(Debug, Clone, Parser)]
pub struct BoundsArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Also report the span in this time unit
    #[arg(long = "time-unit", default_value = "calendar_year")]
    pub time_unit: TimeUnit,
}

/// `column=unit` pair given on the command line
#[derive(Debug, Clone, PartialEq)]
pub struct UnitAssignment {
    pub column: String,
    pub unit: Unit,
}

impl FromStr for UnitAssignment {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self> {
        let (column, unit) = s.split_once('=').ok_or_else(|| {
            StatsError::configuration(format!("Expected COLUMN=UNIT, got '{}'", s))
        })?;
        let column = column.trim();
        if column.is_empty() {
            return Err(StatsError::configuration(format!(
                "Missing column name in unit assignment '{}'",
                s
            )));
        }
        Ok(UnitAssignment {
            column: column.to_string(),
            unit: Unit::parse(unit.trim())?,
        })
    }
}

/// `category=decimals` rounding override
#[derive(Debug, Clone, PartialEq)]
pub struct RoundingOverride {
    pub category: String,
    pub decimals: u32,
}

impl FromStr for RoundingOverride {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self> {
        let parsed = s
            .split_once('=')
            .and_then(|(category, decimals)| Some((category.trim(), decimals.trim().parse().ok()?)));
        match parsed {
            Some((category, decimals)) if !category.is_empty() => Ok(RoundingOverride {
                category: category.to_string(),
                decimals,
            }),
            _ => Err(StatsError::configuration(format!(
                "Expected CATEGORY=DECIMALS, got '{}'",
                s
            ))),
        }
    }
}

impl Args {
    /// Get the command if one was specified
    pub fn get_command(&self) -> Option<&Commands> {
        self.command.as_ref()
    }
}

impl Commands {
    pub fn input(&self) -> &InputArgs {
        match self {
            Commands::Descriptive(args) => &args.input,
            Commands::Correlation(args) => &args.input,
            Commands::Trend(args) => &args.input,
            Commands::Bounds(args) => &args.input,
        }
    }
}

impl InputArgs {
    /// Determine the appropriate log level based on verbosity flags
    pub fn get_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            }
        }
    }

    pub fn unit_mapping(&self) -> Vec<(String, Unit)> {
        self.units
            .iter()
            .map(|a| (a.column.clone(), a.unit))
            .collect()
    }
}

impl DescriptiveArgs {
    pub fn to_config(&self) -> DescriptiveConfig {
        let mut config = DescriptiveConfig::default()
            .with_value_columns(self.value_columns.iter().cloned())
            .with_group_by(self.group_by.iter().cloned())
            .with_flag_column(self.flag_column.clone())
            .with_output_format(self.output.format);
        if let Some(category) = &self.category {
            config = config.with_category_column(category.clone());
        }
        if !self.statistics.is_empty() {
            config = config.with_statistics(self.statistics.iter().copied());
        }
        if !self.quantiles.is_empty() {
            config = config.with_quantiles(self.quantiles.iter().copied());
        }
        config
    }

    pub fn reporting_config(&self) -> ReportingConfig {
        self.round_overrides
            .iter()
            .fold(ReportingConfig::default(), |config, o| {
                config.with_rounding_override(o.category.clone(), o.decimals)
            })
    }
}

impl CorrelationArgs {
    pub fn to_config(&self) -> CorrelationConfig {
        CorrelationConfig::default()
            .with_value_columns(self.value_columns.iter().cloned())
            .with_category_column(self.category.clone())
            .with_group_by(self.group_by.iter().cloned())
            .with_method(self.method)
            .with_min_samples(self.min_samples)
            .with_flag_column(self.flag_column.clone())
            .with_allow_missing_units(self.allow_missing_units)
            .with_allow_mixed_unit_families(self.allow_mixed_unit_families)
            .with_output_format(self.output.format)
    }
}

impl TrendArgs {
    pub fn to_config(&self) -> TrendConfig {
        TrendConfig::default()
            .with_time_unit(self.time_unit)
            .with_value_column(self.value_column.clone())
            .with_category_column(self.category.clone())
            .with_datetime_column(self.input.time_column.clone())
            .with_group_by(self.group_by.iter().cloned())
            .with_min_samples(self.min_samples)
            .with_min_duration_years(self.min_duration_years)
            .with_flag_column(self.flag_column.clone())
            .with_allow_missing_units(self.allow_missing_units)
    }
}
