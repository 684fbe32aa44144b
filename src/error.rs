//! Error handling for statistical analysis operations.
//!
//! Every failure surfaced by the analysis engines maps onto one of a small
//! set of kinds: schema problems, data validation problems, unit problems,
//! configuration problems and calendar arithmetic problems. Checks are run
//! before any aggregation so that bad inputs fail fast.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StatsError {
    /// A required column is missing or ambiguous
    #[error("Schema error: {message}")]
    Schema { message: String },

    /// Non-numeric column, empty dataset, non-finite values or similar
    #[error("Data validation error: {message}")]
    DataValidation { message: String },

    /// Unparseable unit, missing unit metadata or cross-family conversion
    #[error("Unit error: {message}")]
    Unit { message: String },

    /// Invalid statistic/method selection or out-of-range parameter
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Calendar arithmetic failed (timestamp out of representable range)
    #[error("Time error: {message}")]
    Time { message: String },

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StatsError {
    /// Create a schema error
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Create a data validation error
    pub fn data_validation(message: impl Into<String>) -> Self {
        Self::DataValidation {
            message: message.into(),
        }
    }

    /// Create a unit error
    pub fn unit(message: impl Into<String>) -> Self {
        Self::Unit {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a time arithmetic error
    pub fn time(message: impl Into<String>) -> Self {
        Self::Time {
            message: message.into(),
        }
    }

    /// True for errors raised by the unit registry or unit checks
    pub fn is_unit_error(&self) -> bool {
        matches!(self, Self::Unit { .. })
    }
}

pub type Result<T> = std::result::Result<T, StatsError>;
