//! Air Quality Statistics Library
//!
//! A QC-aware statistics engine over long-format air quality time series
//! (`datetime`, `site_id`, `pollutant`, `conc`, `flag`) held in polars
//! DataFrames.
//!
//! This library provides tools for:
//! - Parsing and converting concentration units within a unit family
//! - Applying the QC flag policy (exclude invalid/outlier, mark below-DL missing)
//! - Calendar-aware elapsed time, dataset time bounds and resampling
//! - Grouped descriptive statistics in tidy or wide layout
//! - Pairwise Pearson/Spearman correlation between pollutants
//! - Ordinary least squares trends with duration flags

pub mod config;
pub mod constants;
pub mod dataset;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod qc;
pub mod schema;
pub mod time;
pub mod units;

// Statistical engines
pub mod analysis;

// CLI modules
pub mod cli {
    pub mod args;
    pub mod commands;
}

// Re-export commonly used types
pub use analysis::{
    CorrelationOutput, CorrelationRecord, DescriptiveOutput, DescriptiveRecord, TrendOutput,
    TrendRecord, compute_descriptives, compute_linear_trend, compute_pairwise,
};
pub use config::{CorrelationConfig, DescriptiveConfig, ReportingConfig, TrendConfig};
pub use dataset::TimeSeriesDataset;
pub use error::{Result, StatsError};
pub use models::{CorrelationMethod, OutputFormat, ResultMetadata, Statistic, UnitsStatus};
pub use qc::QcFlag;
pub use time::{TimeBounds, TimeUnit};
pub use units::{RoundingPolicy, Unit, UnitFamily};
