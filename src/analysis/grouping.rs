//! Row partitioning by group key.
//!
//! Keys are the string renderings of the grouping columns, so any column
//! dtype can be grouped on. Nulls are kept as their own key component and
//! sort before every non-null value, matching polars' default null order.

use crate::error::Result;
use crate::schema;
use polars::prelude::{Column, DataFrame};
use std::collections::BTreeMap;

/// One group's key: one entry per grouping column
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey(pub Vec<Option<String>>);

impl GroupKey {
    pub fn values(&self) -> &[Option<String>] {
        &self.0
    }

    /// Key extended with one more component
    pub fn with(&self, component: Option<String>) -> GroupKey {
        let mut values = self.0.clone();
        values.push(component);
        GroupKey(values)
    }
}

/// Row indices per group, in ascending key order, row order kept within groups
pub fn partition_rows<S: AsRef<str>>(
    frame: &DataFrame,
    key_columns: &[S],
) -> Result<BTreeMap<GroupKey, Vec<usize>>> {
    let keys: Vec<Vec<Option<String>>> = key_columns
        .iter()
        .map(|c| schema::string_values(frame, c.as_ref()))
        .collect::<Result<_>>()?;

    let mut groups: BTreeMap<GroupKey, Vec<usize>> = BTreeMap::new();
    for row in 0..frame.height() {
        let key = GroupKey(keys.iter().map(|column| column[row].clone()).collect());
        groups.entry(key).or_default().push(row);
    }
    Ok(groups)
}

/// Pick `rows` out of `values`
pub fn take<T: Clone>(values: &[T], rows: &[usize]) -> Vec<T> {
    rows.iter().map(|&row| values[row].clone()).collect()
}

/// Accumulates key components row by row and emits them as string columns
#[derive(Debug, Clone)]
pub struct KeyColumns {
    names: Vec<String>,
    values: Vec<Vec<Option<String>>>,
}

impl KeyColumns {
    pub fn new<S: AsRef<str>>(names: &[S]) -> Self {
        Self {
            names: names.iter().map(|n| n.as_ref().to_string()).collect(),
            values: vec![Vec::new(); names.len()],
        }
    }

    pub fn push(&mut self, key: &GroupKey) {
        for (column, value) in self.values.iter_mut().zip(key.values()) {
            column.push(value.clone());
        }
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.names
            .into_iter()
            .zip(self.values)
            .map(|(name, values)| Column::new(name.into(), values))
            .collect()
    }
}
