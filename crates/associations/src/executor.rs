//! Executor interface
//!
//! The association layer never renders SQL. Every statement is handed to an
//! `Executor` together with the caller's `QueryOptions`, which carry the
//! transaction handle and anything else the executor understands.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AssociationResult;
use crate::plan::SelectPlan;
use crate::query::types::WhereCondition;
use crate::record::Row;
use crate::schema::ModelId;

/// Opaque handle of a caller-owned transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionHandle {
    pub id: String,
}

impl TransactionHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Options passed through to every statement of an association call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions {
    pub transaction: Option<TransactionHandle>,
    /// Extra conditions on the target rows
    pub conditions: Vec<WhereCondition>,
    /// `Some(false)` skips the association scope on reads
    pub scope: Option<bool>,
    pub schema: Option<String>,
    /// Default join row attributes for many-to-many writes
    pub through: Option<Row>,
    pub logging: bool,
    /// Passed to the executor as is
    pub extra: Map<String, Value>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            transaction: None,
            conditions: Vec::new(),
            scope: None,
            schema: None,
            through: None,
            logging: true,
            extra: Map::new(),
        }
    }
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transaction(mut self, transaction: TransactionHandle) -> Self {
        self.transaction = Some(transaction);
        self
    }

    pub fn filter(mut self, condition: WhereCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn without_scope(mut self) -> Self {
        self.scope = Some(false);
        self
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn through(mut self, defaults: Row) -> Self {
        self.through = Some(defaults);
        self
    }

    pub fn extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub(crate) fn applies_scope(&self) -> bool {
        self.scope != Some(false)
    }

    /// Same transaction and pass-through settings, no per-call filters
    pub(crate) fn for_statement(&self) -> QueryOptions {
        QueryOptions {
            conditions: Vec::new(),
            through: None,
            ..self.clone()
        }
    }
}

/// Statement execution backend
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run a select plan and return flat rows keyed by `column` for the root
    /// and `Alias->Child.column` for joined includes
    async fn find_all(&self, plan: &SelectPlan, options: &QueryOptions) -> AssociationResult<Vec<Row>>;

    /// Update every row of `model` matching `conditions`, returning the
    /// number of rows affected
    async fn update(
        &self,
        model: ModelId,
        values: &Row,
        conditions: &[WhereCondition],
        options: &QueryOptions,
    ) -> AssociationResult<u64>;

    /// Insert rows in one statement, returning them as stored
    async fn bulk_create(
        &self,
        model: ModelId,
        rows: Vec<Row>,
        options: &QueryOptions,
    ) -> AssociationResult<Vec<Row>>;

    /// Delete every row of `model` matching `conditions`
    async fn destroy(
        &self,
        model: ModelId,
        conditions: &[WhereCondition],
        options: &QueryOptions,
    ) -> AssociationResult<u64>;
}
