//! In-memory executor for integration tests. Evaluates select plans over
//! JSON rows and records every statement it receives.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;

use elif_associations::associations::kind::AssociationKind;
use elif_associations::plan::{IncludeNode, JoinRole, SelectPlan, PATH_SEPARATOR};
use elif_associations::query::types::{matches_all, sort_rows, values_equal};
use elif_associations::{
    AssociationResult, Executor, Key, ModelId, ModelRegistry, QueryOptions, Row, TransactionHandle,
    WhereCondition,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select {
        model: ModelId,
        plan: SelectPlan,
    },
    Update {
        model: ModelId,
        values: Row,
        conditions: Vec<WhereCondition>,
    },
    Insert {
        model: ModelId,
        rows: Vec<Row>,
    },
    Delete {
        model: ModelId,
        conditions: Vec<WhereCondition>,
    },
}

impl Statement {
    pub fn is_write(&self) -> bool {
        !matches!(self, Statement::Select { .. })
    }
}

#[derive(Debug, Clone)]
pub struct Logged {
    pub statement: Statement,
    pub transaction: Option<TransactionHandle>,
}

pub struct MemoryExecutor {
    registry: ModelRegistry,
    tables: Mutex<HashMap<ModelId, Vec<Row>>>,
    log: Mutex<Vec<Logged>>,
}

/// Route crate logs to the test output; `RUST_LOG` picks the level
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn row(value: Value) -> Row {
    value.as_object().cloned().unwrap_or_default()
}

impl MemoryExecutor {
    pub fn new(registry: &ModelRegistry) -> Self {
        Self {
            registry: registry.clone(),
            tables: Mutex::new(HashMap::new()),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Seed rows without logging
    pub fn seed(&self, model: ModelId, rows: Vec<Value>) {
        let mut tables = self.tables.lock().unwrap();
        let table = tables.entry(model).or_default();
        table.extend(rows.into_iter().map(row));
    }

    pub fn rows(&self, model: ModelId) -> Vec<Row> {
        self.tables
            .lock()
            .unwrap()
            .get(&model)
            .cloned()
            .unwrap_or_default()
    }

    /// Find a row by `id`
    pub fn find(&self, model: ModelId, id: i64) -> Option<Row> {
        self.rows(model)
            .into_iter()
            .find(|row| row.get("id") == Some(&json!(id)))
    }

    pub fn statements(&self) -> Vec<Statement> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .map(|logged| logged.statement.clone())
            .collect()
    }

    pub fn writes(&self) -> Vec<Statement> {
        self.statements()
            .into_iter()
            .filter(Statement::is_write)
            .collect()
    }

    pub fn logged(&self) -> Vec<Logged> {
        self.log.lock().unwrap().clone()
    }

    pub fn clear_log(&self) {
        self.log.lock().unwrap().clear();
    }

    fn record(&self, statement: Statement, options: &QueryOptions) {
        self.log.lock().unwrap().push(Logged {
            statement,
            transaction: options.transaction.clone(),
        });
    }

    fn table(&self, model: ModelId) -> Vec<Row> {
        self.rows(model)
    }

    fn select(&self, plan: &SelectPlan) -> Vec<Row> {
        let mut roots: Vec<Row> = self
            .table(plan.model)
            .into_iter()
            .filter(|row| matches_all(&plan.conditions, row))
            .collect();
        sort_rows(&mut roots, &plan.order);

        if let Some(grouped) = &plan.grouped_limit {
            let mut groups = grouped.apply(roots, identity);
            roots = grouped
                .values
                .iter()
                .flat_map(|value| groups.remove(&Key::from(value)).unwrap_or_default())
                .collect();
        }

        let mut expanded: Vec<Vec<Row>> = Vec::new();
        for root in &roots {
            if let Some(partials) = self.expand(&plan.includes, root, None) {
                let base = project(root, plan.attributes.as_deref(), "");
                expanded.push(
                    partials
                        .into_iter()
                        .map(|partial| merge(base.clone(), partial))
                        .collect(),
                );
            }
        }

        let offset = plan.offset.unwrap_or(0);
        let limit = plan.limit.unwrap_or(usize::MAX);
        if plan.sub_query || plan.includes.is_empty() {
            expanded
                .into_iter()
                .skip(offset)
                .take(limit)
                .flatten()
                .collect()
        } else {
            expanded
                .into_iter()
                .flatten()
                .skip(offset)
                .take(limit)
                .collect()
        }
    }

    /// Joined partial rows for `nodes` below `parent`; `None` when a
    /// required join finds nothing
    fn expand(&self, nodes: &[IncludeNode], parent: &Row, parent_path: Option<&str>) -> Option<Vec<Row>> {
        let mut product = vec![Row::new()];
        for node in nodes.iter().filter(|node| !node.separate) {
            let path = node.path(parent_path);
            let mut partials = Vec::new();
            for (target, link) in self.matches(node, parent) {
                let Some(children) = self.expand(&node.children, &target, Some(&path)) else {
                    continue;
                };
                if node.role == JoinRole::Filter {
                    partials.push(Row::new());
                    continue;
                }
                let mut base = project(&target, node.attributes.as_deref(), &format!("{}.", path));
                if let (Some(through), Some(link)) = (&node.through, link) {
                    let prefix = format!("{}{}{}.", path, PATH_SEPARATOR, through.name);
                    base = merge(base, project(&link, through.attributes.as_deref(), &prefix));
                }
                partials.extend(children.into_iter().map(|child| merge(base.clone(), child)));
            }

            if partials.is_empty() {
                if node.required {
                    return None;
                }
                partials.push(Row::new());
            }
            product = product
                .into_iter()
                .flat_map(|left| partials.iter().map(move |right| merge(left.clone(), right.clone())))
                .collect();
        }
        Some(product)
    }

    fn matches(&self, node: &IncludeNode, parent: &Row) -> Vec<(Row, Option<Row>)> {
        let association = &node.association;
        let Some(parent_value) = parent.get(association.source_attribute()).filter(|v| !v.is_null()) else {
            return Vec::new();
        };

        let mut found = Vec::new();
        if association.kind == AssociationKind::BelongsToMany {
            let (Some(through), Some(foreign)) = (&node.through, association.foreign_identifier()) else {
                return Vec::new();
            };
            let targets = self.table(node.model);
            for link in self.table(through.model) {
                let joined = link
                    .get(association.identifier())
                    .is_some_and(|value| values_equal(value, parent_value));
                if !joined || !matches_all(&through.conditions, &link) {
                    continue;
                }
                let Some(foreign_value) = link.get(foreign) else {
                    continue;
                };
                for target in &targets {
                    let hit = target
                        .get(&association.target_key)
                        .is_some_and(|value| values_equal(value, foreign_value));
                    if hit && matches_all(&node.conditions, target) {
                        found.push((target.clone(), Some(link.clone())));
                    }
                }
            }
        } else {
            let mut targets: Vec<Row> = self
                .table(node.model)
                .into_iter()
                .filter(|target| {
                    target
                        .get(association.target_attribute())
                        .is_some_and(|value| values_equal(value, parent_value))
                })
                .filter(|target| matches_all(&node.conditions, target))
                .collect();
            sort_rows(&mut targets, &node.order);
            found.extend(targets.into_iter().map(|target| (target, None)));
        }
        found
    }
}

fn identity(row: &Row) -> &Row {
    row
}

fn project(row: &Row, attributes: Option<&[String]>, prefix: &str) -> Row {
    row.iter()
        .filter(|(column, _)| attributes.map_or(true, |attributes| attributes.contains(*column)))
        .map(|(column, value)| (format!("{}{}", prefix, column), value.clone()))
        .collect()
}

fn merge(mut base: Row, other: Row) -> Row {
    base.extend(other);
    base
}

#[async_trait]
impl Executor for MemoryExecutor {
    async fn find_all(&self, plan: &SelectPlan, options: &QueryOptions) -> AssociationResult<Vec<Row>> {
        self.record(
            Statement::Select {
                model: plan.model,
                plan: plan.clone(),
            },
            options,
        );
        Ok(self.select(plan))
    }

    async fn update(
        &self,
        model: ModelId,
        values: &Row,
        conditions: &[WhereCondition],
        options: &QueryOptions,
    ) -> AssociationResult<u64> {
        self.record(
            Statement::Update {
                model,
                values: values.clone(),
                conditions: conditions.to_vec(),
            },
            options,
        );
        let mut tables = self.tables.lock().unwrap();
        let mut affected = 0;
        for row in tables.entry(model).or_default().iter_mut() {
            if matches_all(conditions, row) {
                row.extend(values.clone());
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn bulk_create(&self, model: ModelId, rows: Vec<Row>, options: &QueryOptions) -> AssociationResult<Vec<Row>> {
        self.record(
            Statement::Insert {
                model,
                rows: rows.clone(),
            },
            options,
        );
        let auto_key = self
            .registry
            .model(model)?
            .primary_key_attribute()
            .map(str::to_string);

        let mut tables = self.tables.lock().unwrap();
        let table = tables.entry(model).or_default();
        let mut created = Vec::new();
        for mut row in rows {
            if let Some(key) = &auto_key {
                if row.get(key).map_or(true, Value::is_null) {
                    let next = table
                        .iter()
                        .filter_map(|existing| existing.get(key).and_then(Value::as_i64))
                        .max()
                        .unwrap_or(0)
                        + 1;
                    row.insert(key.clone(), json!(next));
                }
            }
            table.push(row.clone());
            created.push(row);
        }
        Ok(created)
    }

    async fn destroy(
        &self,
        model: ModelId,
        conditions: &[WhereCondition],
        options: &QueryOptions,
    ) -> AssociationResult<u64> {
        self.record(
            Statement::Delete {
                model,
                conditions: conditions.to_vec(),
            },
            options,
        );
        let mut tables = self.tables.lock().unwrap();
        let table = tables.entry(model).or_default();
        let before = table.len();
        table.retain(|row| !matches_all(conditions, row));
        Ok((before - table.len()) as u64)
    }
}
