//! Eager-loading finder - runs a select plan and assembles instance trees

use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use tracing::debug;

use super::{unique_values, Associations};
use crate::error::AssociationResult;
use crate::executor::{Executor, QueryOptions};
use crate::hydration::instance::visit_path_mut;
use crate::hydration::{Instance, Loaded, ResultAssembler};
use crate::plan::grouped_limit::partition;
use crate::plan::{FindOptions, GroupedLimit, IncludeNode, PlanBuilder, SelectPlan};
use crate::query::types::{sort_by_order, OrderBy, WhereCondition};
use crate::record::{Key, Row};
use crate::schema::ModelId;

type PlanFuture<'f> = Pin<Box<dyn Future<Output = AssociationResult<Vec<Instance>>> + Send + 'f>>;

impl<'a, E: Executor + ?Sized> Associations<'a, E> {
    /// Find instances of `model` with their includes loaded
    pub async fn find_all(
        &self,
        model: ModelId,
        options: &FindOptions,
        query: &QueryOptions,
    ) -> AssociationResult<Vec<Instance>> {
        let plan = PlanBuilder::new(self.registry).build(model, options)?;
        self.execute_plan(&plan, query).await
    }

    /// Run a plan: one joined statement, or an outer statement followed by
    /// second-pass statements keyed by its primary keys; then the separate
    /// includes
    pub(crate) fn execute_plan<'f>(&'f self, plan: &'f SelectPlan, query: &'f QueryOptions) -> PlanFuture<'f> {
        Box::pin(async move {
            let rows = if plan.sub_query {
                self.fetch_with_sub_query(plan, query).await?
            } else {
                self.executor.find_all(&plan.joined_statement(), query).await?
            };

            let mut instances = ResultAssembler::new(plan).assemble(rows);
            for (path, node) in plan.separate_includes() {
                self.load_separate(&mut instances, &path, node, query).await?;
            }
            Ok(instances)
        })
    }

    async fn fetch_with_sub_query(&self, plan: &SelectPlan, query: &QueryOptions) -> AssociationResult<Vec<Row>> {
        let mut rows = self.executor.find_all(&plan.outer_statement(), query).await?;
        let keys = unique_values(rows.iter().filter_map(|row| row.get(&plan.primary_key).cloned()));
        debug!(
            "Sub-query find on {}: {} outer row(s), {} key(s) for the second pass",
            plan.table,
            rows.len(),
            keys.len()
        );

        for chunk in keys.chunks(self.batch_size()) {
            let second = plan.second_pass(chunk.to_vec());
            if second.includes.is_empty() {
                break;
            }
            rows.extend(self.executor.find_all(&second, query).await?);
        }
        Ok(rows)
    }

    /// Fetch a `separate` include for every instance at `path` and attach
    /// the results
    async fn load_separate(
        &self,
        instances: &mut [Instance],
        path: &[String],
        node: &IncludeNode,
        query: &QueryOptions,
    ) -> AssociationResult<()> {
        let parent_attribute = node.parent_attribute().to_string();
        let mut parent_values = Vec::new();
        visit_path_mut(instances, path, &mut |parent: &mut Instance| {
            if let Some(value) = parent.get(&parent_attribute) {
                parent_values.push(value.clone());
            }
        });
        let values = unique_values(parent_values);

        let target_attribute = node.association.target_attribute().to_string();
        let mut groups: HashMap<Key, Vec<Instance>> = HashMap::new();
        for chunk in values.chunks(self.batch_size()) {
            let plan = separate_plan(node, &target_attribute, chunk.to_vec());
            let found = self.execute_plan(&plan, query).await?;
            for (key, group) in group_instances(found, &target_attribute, chunk, plan.grouped_limit.as_ref()) {
                groups.entry(key).or_default().extend(group);
            }
        }

        visit_path_mut(instances, path, &mut |parent: &mut Instance| {
            let key = parent.key(&parent_attribute);
            let group = groups.get(&key).cloned().unwrap_or_default();
            parent.associations.insert(node.alias.clone(), Loaded::Many(group));
        });
        Ok(())
    }
}

/// Statement for a separate include over a set of parent values
fn separate_plan(node: &IncludeNode, target_attribute: &str, values: Vec<Value>) -> SelectPlan {
    let mut plan = SelectPlan::new(node.model, node.table.clone(), node.primary_key.clone());
    plan.attributes = node.attributes.clone();
    plan.order = node.order.clone();
    plan.includes = node.children.clone();
    match node.limit {
        Some(limit) if values.len() > 1 => {
            plan.grouped_limit = Some(GroupedLimit::new(
                target_attribute,
                values.clone(),
                limit,
                node.order.clone(),
            ));
        }
        limit => plan.limit = limit,
    }
    plan.conditions = vec![WhereCondition::eq_or_in(target_attribute, values)];
    plan.conditions.extend(node.conditions.iter().cloned());
    plan
}

fn instance_values(instance: &Instance) -> &Row {
    instance.record.values()
}

/// Group found instances by `attribute`; a grouped limit is re-applied in
/// process
pub(crate) fn group_instances(
    instances: Vec<Instance>,
    attribute: &str,
    values: &[Value],
    grouped_limit: Option<&GroupedLimit>,
) -> HashMap<Key, Vec<Instance>> {
    match grouped_limit {
        Some(grouped_limit) => grouped_limit.apply(instances, instance_values),
        None => partition(instances, attribute, values, &instance_values),
    }
}

/// Order instances gathered from several statements
pub(crate) fn sort_instances(instances: &mut [Instance], order: &[OrderBy]) {
    sort_by_order(instances, order, &instance_values);
}
