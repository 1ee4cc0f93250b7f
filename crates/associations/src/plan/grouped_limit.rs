//! Grouped limit - per-parent top-N emulation for multi-parent fetches

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::query::types::{sort_by_order, OrderBy};
use crate::record::{Key, Row};

/// Fetch at most `limit` rows per value of `on`, ordered by `order`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupedLimit {
    pub on: String,
    pub values: Vec<Value>,
    pub limit: usize,
    pub order: Vec<OrderBy>,
}

impl GroupedLimit {
    pub fn new(on: impl Into<String>, values: Vec<Value>, limit: usize, order: Vec<OrderBy>) -> Self {
        Self {
            on: on.into(),
            values,
            limit,
            order,
        }
    }

    /// Partition `items` by the grouping column, order each partition and
    /// keep at most `limit` per group. Every requested value gets an entry.
    pub fn apply<T>(&self, items: Vec<T>, row_of: impl Fn(&T) -> &Row) -> HashMap<Key, Vec<T>> {
        let mut groups = partition(items, &self.on, &self.values, &row_of);
        for group in groups.values_mut() {
            sort_by_order(group, &self.order, &row_of);
            group.truncate(self.limit);
        }
        groups
    }
}

/// Group `items` by `on`; requested values without items map to an empty
/// list and items outside the requested values are dropped
pub fn partition<T>(
    items: Vec<T>,
    on: &str,
    values: &[Value],
    row_of: &impl Fn(&T) -> &Row,
) -> HashMap<Key, Vec<T>> {
    let mut groups: HashMap<Key, Vec<T>> = values
        .iter()
        .map(|value| (Key::from(value), Vec::new()))
        .collect();
    for item in items {
        let key = row_of(&item).get(on).map(Key::from).unwrap_or(Key::Null);
        if let Some(group) = groups.get_mut(&key) {
            group.push(item);
        }
    }
    groups
}
