//! Canonical in-memory time series dataset.

use crate::error::{Result, StatsError};
use crate::schema;
use crate::time::{self, TimeBounds};
use crate::units::{Unit, UnitSpec, validate_schema};
use polars::prelude::{DataFrame, IntoLazy, LazyFrame};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Long-format table with a time index and optional per-column units
#[derive(Debug, Clone)]
pub struct TimeSeriesDataset {
    frame: DataFrame,
    time_index: String,
    column_units: HashMap<String, Unit>,
    metadata: BTreeMap<String, String>,
}

impl TimeSeriesDataset {
    /// Wrap a frame; the time index must exist and the frame must not be empty
    pub fn new(frame: DataFrame, time_index: impl Into<String>) -> Result<Self> {
        let time_index = time_index.into();
        if !schema::has_column(&frame, &time_index) {
            return Err(StatsError::schema(format!(
                "Time index column '{}' not found in dataset",
                time_index
            )));
        }
        if frame.height() == 0 {
            return Err(StatsError::data_validation("Dataset contains no rows"));
        }

        debug!(
            "Created dataset with {} rows, {} columns, time index '{}'",
            frame.height(),
            frame.width(),
            time_index
        );
        Ok(Self {
            frame,
            time_index,
            column_units: HashMap::new(),
            metadata: BTreeMap::new(),
        })
    }

    /// Attach unit metadata; every entry is parsed and validated
    pub fn with_column_units<I, K, V>(mut self, mapping: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<UnitSpec>,
    {
        let units = validate_schema(mapping)?;
        for column in units.keys() {
            if !schema::has_column(&self.frame, column) {
                warn!("Unit metadata given for column '{}' which is not in the dataset", column);
            }
        }
        self.column_units.extend(units);
        Ok(self)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn lazy(&self) -> LazyFrame {
        self.frame.clone().lazy()
    }

    pub fn n_rows(&self) -> usize {
        self.frame.height()
    }

    pub fn time_index(&self) -> &str {
        &self.time_index
    }

    pub fn column_unit(&self, column: &str) -> Option<Unit> {
        self.column_units.get(column).copied()
    }

    pub fn column_units(&self) -> &HashMap<String, Unit> {
        &self.column_units
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Min/max of the time index in a single aggregation pass
    pub fn time_bounds(&self) -> Result<Option<TimeBounds>> {
        time::time_bounds(self.lazy(), &self.time_index)
    }
}

/// Check unit metadata exists for `columns` before `operation` runs
///
/// Returns whether every column has units and the list of those that do
/// not. Missing units are an error naming the columns unless `allow_missing`.
pub fn check_units_present<S: AsRef<str>>(
    dataset: &TimeSeriesDataset,
    columns: &[S],
    operation: &str,
    allow_missing: bool,
) -> Result<(bool, Vec<String>)> {
    let missing: Vec<String> = columns
        .iter()
        .map(AsRef::as_ref)
        .filter(|column| dataset.column_unit(column).is_none())
        .map(str::to_string)
        .collect();

    if missing.is_empty() {
        return Ok((true, missing));
    }
    if !allow_missing {
        return Err(StatsError::unit(format!(
            "{} requires unit metadata for column(s) {:?}. Provide column units or set allow_missing_units",
            operation, missing
        )));
    }

    warn!(
        "{}: proceeding without unit metadata for {:?}",
        operation, missing
    );
    Ok((false, missing))
}
