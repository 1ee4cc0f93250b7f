//! Association operations
//!
//! `Associations` binds a registry to an executor and runs reads
//! (`get`, `count`, `has`, eager-loading finds) and writes (`set`, `add`,
//! `remove`, `create`) for any association by alias. Statements of one call
//! are issued in a fixed order; atomicity comes from the transaction handle
//! in `QueryOptions`.

pub mod find;
pub mod get;
pub mod mutate;

use serde_json::Value;
use std::collections::HashSet;

use crate::associations::descriptor::Association;
use crate::associations::kind::AssociationKind;
use crate::error::{AssociationError, AssociationResult};
use crate::executor::{Executor, QueryOptions};
use crate::hydration::Instance;
use crate::include::Include;
use crate::query::types::{OrderBy, WhereCondition};
use crate::record::{Key, Record, Row};
use crate::schema::ModelRegistry;

/// Registry plus executor; the entry point for association reads and writes
pub struct Associations<'a, E: Executor + ?Sized> {
    registry: &'a ModelRegistry,
    executor: &'a E,
}

impl<'a, E: Executor + ?Sized> Associations<'a, E> {
    pub fn new(registry: &'a ModelRegistry, executor: &'a E) -> Self {
        Self { registry, executor }
    }

    pub fn registry(&self) -> &'a ModelRegistry {
        self.registry
    }

    fn association(&self, source: &Record, alias: &str) -> AssociationResult<&'a Association> {
        self.registry.association_of(source.model(), alias)
    }

    fn batch_size(&self) -> usize {
        self.registry.config().max_batch_size.max(1)
    }

    /// Attribute identifying a target row in writes and `has` checks
    fn target_identity(&self, association: &Association) -> AssociationResult<String> {
        Ok(match association.kind {
            AssociationKind::HasOne | AssociationKind::HasMany => self
                .registry
                .model(association.target)?
                .primary_key_or_id()
                .to_string(),
            AssociationKind::BelongsTo | AssociationKind::BelongsToMany => {
                association.target_key.clone()
            }
        })
    }
}

/// Options of `get`, `count` and `has`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetOptions {
    pub query: QueryOptions,
    pub attributes: Option<Vec<String>>,
    pub order: Vec<OrderBy>,
    /// Per source, not in total
    pub limit: Option<usize>,
    /// Conditions on the join rows of a many-to-many association
    pub through_conditions: Vec<WhereCondition>,
    pub include: Vec<Include>,
}

impl GetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, query: QueryOptions) -> Self {
        self.query = query;
        self
    }

    pub fn filter(mut self, condition: WhereCondition) -> Self {
        self.query.conditions.push(condition);
        self
    }

    pub fn attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = Some(attributes.into_iter().map(Into::into).collect());
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order.push(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn through_filter(mut self, condition: WhereCondition) -> Self {
        self.through_conditions.push(condition);
        self
    }

    pub fn include(mut self, include: impl Into<Include>) -> Self {
        self.include.push(include.into());
        self
    }
}

/// How a write names a target row
#[derive(Debug, Clone, PartialEq)]
pub enum TargetRef {
    Record(Record),
    Key(Value),
}

/// A target of `set`, `add`, `remove` or `has`, with optional join row
/// attributes for many-to-many writes
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub target: TargetRef,
    pub through: Option<Row>,
}

impl Target {
    pub fn key(value: impl Into<Value>) -> Self {
        Self {
            target: TargetRef::Key(value.into()),
            through: None,
        }
    }

    pub fn record(record: Record) -> Self {
        Self {
            target: TargetRef::Record(record),
            through: None,
        }
    }

    pub fn with_through(mut self, attributes: Row) -> Self {
        self.through = Some(attributes);
        self
    }

    /// Value of `attribute` on the target; a bare key stands for itself
    pub fn value(&self, attribute: &str) -> Value {
        match &self.target {
            TargetRef::Record(record) => record.value(attribute),
            TargetRef::Key(value) => value.clone(),
        }
    }

    fn identity(&self, attribute: &str) -> AssociationResult<Value> {
        let value = self.value(attribute);
        if value.is_null() {
            return Err(AssociationError::InvalidTarget(format!(
                "target has no value for '{}'",
                attribute
            )));
        }
        Ok(value)
    }
}

impl From<Record> for Target {
    fn from(record: Record) -> Self {
        Target::record(record)
    }
}

impl From<&Instance> for Target {
    fn from(instance: &Instance) -> Self {
        let target = Target::record(instance.record.clone());
        match &instance.through {
            Some(through) => target.with_through(through.clone()),
            None => target,
        }
    }
}

impl From<Value> for Target {
    fn from(value: Value) -> Self {
        Target::key(value)
    }
}

impl From<i64> for Target {
    fn from(value: i64) -> Self {
        Target::key(value)
    }
}

impl From<&str> for Target {
    fn from(value: &str) -> Self {
        Target::key(value)
    }
}

/// Value a source row joins on, rejecting sources that have none
fn source_value(source: &Record, association: &Association) -> AssociationResult<Value> {
    let attribute = association.source_attribute();
    let value = source.value(attribute);
    if value.is_null() {
        return Err(AssociationError::InvalidTarget(format!(
            "source {} has no value for '{}'",
            association.reference(),
            attribute
        )));
    }
    Ok(value)
}

/// Non-null values without duplicates, first occurrence kept
fn unique_values(values: impl IntoIterator<Item = Value>) -> Vec<Value> {
    let mut seen = HashSet::new();
    values
        .into_iter()
        .filter(|value| !value.is_null() && seen.insert(Key::from(value)))
        .collect()
}

fn row_of<I>(pairs: I) -> Row
where
    I: IntoIterator<Item = (String, Value)>,
{
    pairs.into_iter().collect()
}
