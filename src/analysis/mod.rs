//! Statistical analysis engines.
//!
//! Each engine takes a [`TimeSeriesDataset`](crate::dataset::TimeSeriesDataset)
//! and its own configuration, applies the QC flag policy, and returns typed
//! records, a polars table in the requested layout and run metadata.

pub mod correlation;
pub mod descriptive;
pub mod grouping;
pub mod trend;

pub use correlation::{CorrelationOutput, CorrelationRecord, compute_pairwise, generate_ordered_pairs};
pub use descriptive::{DescriptiveOutput, DescriptiveRecord, GroupSummary, compute_descriptives};
pub use trend::{TrendOutput, TrendRecord, compute_linear_trend, fit_ols};

#[cfg(test)]
pub mod tests;
