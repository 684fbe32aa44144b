//! Deferred QC pipeline over a dataset.
//!
//! Stages are recorded against the source frame and only composed into a
//! polars plan when [`QcPipeline::materialize`] is called, so filtering,
//! null-marking and projection run in one fused pass with a single collect.
//! Every column a stage references is checked before the plan is built.

use crate::error::{Result, StatsError};
use crate::qc::{QcFlag, keep_predicate, null_where_flagged};
use crate::schema;
use polars::prelude::{DataFrame, Expr, IntoLazy, col};
use tracing::debug;

#[derive(Debug, Clone)]
enum Stage {
    /// Drop rows whose flag is in the set
    FilterExcluded { flag_column: String, flags: Vec<QcFlag> },
    /// Null one value column where the flag is in the set, keeping rows
    NullFlagged {
        value_column: String,
        flag_column: String,
        flags: Vec<QcFlag>,
    },
}

/// Builder for a filter → mark-null → project plan
#[derive(Debug, Clone)]
pub struct QcPipeline<'a> {
    source: &'a DataFrame,
    stages: Vec<Stage>,
    projection: Option<Vec<String>>,
}

impl<'a> QcPipeline<'a> {
    pub fn new(source: &'a DataFrame) -> Self {
        Self {
            source,
            stages: Vec::new(),
            projection: None,
        }
    }

    /// Remove rows flagged with any of `flags`
    pub fn filter_excluded(mut self, flag_column: &str, flags: &[QcFlag]) -> Self {
        self.stages.push(Stage::FilterExcluded {
            flag_column: flag_column.to_string(),
            flags: flags.to_vec(),
        });
        self
    }

    /// Null `value_column` where the flag is in `flags`
    pub fn mark_missing(mut self, value_column: &str, flag_column: &str, flags: &[QcFlag]) -> Self {
        self.stages.push(Stage::NullFlagged {
            value_column: value_column.to_string(),
            flag_column: flag_column.to_string(),
            flags: flags.to_vec(),
        });
        self
    }

    /// Null `value_column` for excluded rows without dropping them
    ///
    /// Used when pre-filter row counts must survive the exclusion step.
    pub fn mask_excluded(self, value_column: &str, flag_column: &str, flags: &[QcFlag]) -> Self {
        self.mark_missing(value_column, flag_column, flags)
    }

    /// Keep only these columns in the materialized frame
    pub fn select<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        let mut unique: Vec<String> = Vec::with_capacity(columns.len());
        for column in columns {
            if !unique.iter().any(|c| c == column.as_ref()) {
                unique.push(column.as_ref().to_string());
            }
        }
        self.projection = Some(unique);
        self
    }

    fn referenced_columns(&self) -> Vec<&str> {
        let mut columns: Vec<&str> = Vec::new();
        for stage in &self.stages {
            match stage {
                Stage::FilterExcluded { flag_column, .. } => columns.push(flag_column),
                Stage::NullFlagged {
                    value_column,
                    flag_column,
                    ..
                } => {
                    columns.push(value_column);
                    columns.push(flag_column);
                }
            }
        }
        if let Some(projection) = &self.projection {
            columns.extend(projection.iter().map(String::as_str));
        }
        columns
    }

    /// Validate column references, compose every stage and collect once
    pub fn materialize(self) -> Result<DataFrame> {
        let referenced = self.referenced_columns();
        let missing: Vec<&str> = referenced
            .iter()
            .copied()
            .filter(|c| !schema::has_column(self.source, c))
            .collect();
        if !missing.is_empty() {
            return Err(StatsError::schema(format!(
                "QC pipeline references column(s) not found in dataset: {:?}",
                missing
            )));
        }

        let mut plan = self.source.clone().lazy();
        let mut pending: Vec<(&str, Expr)> = Vec::new();

        for stage in &self.stages {
            match stage {
                Stage::FilterExcluded { flag_column, flags } => {
                    if !pending.is_empty() {
                        plan = plan.with_columns(flush(&mut pending));
                    }
                    plan = plan.filter(keep_predicate(flag_column, flags));
                }
                Stage::NullFlagged {
                    value_column,
                    flag_column,
                    flags,
                } => {
                    // A second mask on the same column must see the first one applied
                    if pending.iter().any(|(target, _)| *target == value_column.as_str()) {
                        plan = plan.with_columns(flush(&mut pending));
                    }
                    pending.push((
                        value_column.as_str(),
                        null_where_flagged(value_column, flag_column, flags),
                    ));
                }
            }
        }
        if !pending.is_empty() {
            plan = plan.with_columns(flush(&mut pending));
        }
        if let Some(projection) = &self.projection {
            plan = plan.select(projection.iter().map(|c| col(c.as_str())).collect::<Vec<_>>());
        }

        let frame = plan.collect()?;
        debug!(
            "QC pipeline materialized {} stages: {} -> {} rows",
            self.stages.len(),
            self.source.height(),
            frame.height()
        );
        Ok(frame)
    }
}

fn flush(pending: &mut Vec<(&str, Expr)>) -> Vec<Expr> {
    pending.drain(..).map(|(_, expr)| expr).collect()
}
