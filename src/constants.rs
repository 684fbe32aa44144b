//! Application constants for air quality statistics
//!
//! This module contains default column names, analysis thresholds, QC flag
//! tokens and numeric tolerances used throughout the analysis engines.

// =============================================================================
// Canonical Column Names
// =============================================================================

/// Default column names of the canonical long-format schema
pub mod columns {
    /// Timestamp column
    pub const DATETIME: &str = "datetime";

    /// Monitoring site identifier
    pub const SITE_ID: &str = "site_id";

    /// Category label (pollutant name)
    pub const POLLUTANT: &str = "pollutant";

    /// Numeric concentration value
    pub const CONC: &str = "conc";

    /// Quality-control flag
    pub const FLAG: &str = "flag";
}

/// Output column names shared by the result tables
pub mod output {
    pub const VALUE_COL_NAME: &str = "value_col_name";
    pub const STAT: &str = "stat";
    pub const VALUE: &str = "value";
    pub const N_TOTAL: &str = "n_total";
    pub const N_VALID: &str = "n_valid";
    pub const N_MISSING: &str = "n_missing";

    pub const VAR_X: &str = "var_x";
    pub const VAR_Y: &str = "var_y";
    pub const CORRELATION: &str = "correlation";
    pub const N: &str = "n";

    pub const SLOPE: &str = "slope";
    pub const INTERCEPT: &str = "intercept";
    pub const R_SQUARED: &str = "r_squared";
    pub const DURATION_YEARS: &str = "duration_years";
    pub const START_TIME: &str = "start_time";
    pub const END_TIME: &str = "end_time";
    pub const SHORT_DURATION_FLAG: &str = "short_duration_flag";
    pub const LOW_N_FLAG: &str = "low_n_flag";
    pub const SLOPE_UNITS: &str = "slope_units";
}

// =============================================================================
// Quality Control Flag Tokens
// =============================================================================

/// Flag tokens as they appear in the flag column
pub mod flag_tokens {
    /// Clean observation passing all QC checks
    pub const VALID: &str = "valid";

    /// Measurement below detection limit (treated as missing)
    pub const BELOW_DL: &str = "below_dl";

    /// Instrument malfunction, calibration error etc. (excluded)
    pub const INVALID: &str = "invalid";

    /// Statistical outlier flagged by QC algorithms (excluded)
    pub const OUTLIER: &str = "outlier";
}

// =============================================================================
// Analysis Defaults
// =============================================================================

/// Minimum number of valid observations for correlation and trend analysis
pub const DEFAULT_MIN_SAMPLES: usize = 3;

/// Minimum time span in calendar years before a trend is flagged as short
pub const DEFAULT_MIN_DURATION_YEARS: f64 = 1.0;

/// Quantile levels computed by the descriptive engine unless overridden
pub const DEFAULT_QUANTILES: &[f64] = &[0.05, 0.25, 0.75, 0.95];

// =============================================================================
// Numeric Tolerances
// =============================================================================

/// Below this the OLS denominator (n·Σx² − (Σx)²) is treated as zero
pub const OLS_DENOMINATOR_EPSILON: f64 = 1e-12;

/// Below this the total sum of squares is treated as zero (R² undefined)
pub const SS_TOT_EPSILON: f64 = 1e-12;

// =============================================================================
// Time Constants
// =============================================================================

pub const SECONDS_PER_HOUR: f64 = 3_600.0;
pub const SECONDS_PER_DAY: f64 = 86_400.0;
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;
pub const NANOS_PER_MICRO: i64 = 1_000;
pub const NANOS_PER_MILLI: i64 = 1_000_000;
pub const NANOS_PER_DAY: i64 = 86_400 * NANOS_PER_SECOND;

/// Months per calendar year step
pub const MONTHS_PER_YEAR: u32 = 12;
