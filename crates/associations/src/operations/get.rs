//! Association reads: `get`, `get_many`, `count`, `has`, `has_all`

use serde_json::Value;
use std::collections::{HashMap, HashSet};

use super::find::{group_instances, sort_instances};
use super::{unique_values, Associations, GetOptions, Target};
use crate::associations::descriptor::Association;
use crate::associations::kind::AssociationKind;
use crate::error::{AssociationError, AssociationResult};
use crate::executor::Executor;
use crate::hydration::{Instance, Loaded};
use crate::plan::{FindOptions, GroupedLimit, PlanBuilder, SelectPlan};
use crate::query::types::WhereCondition;
use crate::record::{Key, Record, Row};
use crate::schema::ModelId;

impl<'a, E: Executor + ?Sized> Associations<'a, E> {
    /// Load one association of one source
    pub async fn get(&self, source: &Record, alias: &str, options: &GetOptions) -> AssociationResult<Loaded> {
        let association = self.association(source, alias)?;
        let key = source.key(association.source_attribute());
        let mut loaded = self
            .load(association, std::slice::from_ref(source), options)
            .await?;
        Ok(loaded
            .remove(&key)
            .unwrap_or_else(|| Loaded::empty(association.is_multi())))
    }

    /// Load one association for many sources of the same model. Every
    /// source key is present in the result.
    pub async fn get_many(
        &self,
        sources: &[Record],
        alias: &str,
        options: &GetOptions,
    ) -> AssociationResult<HashMap<Key, Loaded>> {
        let Some(first) = sources.first() else {
            return Ok(HashMap::new());
        };
        if let Some(other) = sources.iter().find(|source| source.model() != first.model()) {
            return Err(AssociationError::InvalidTarget(format!(
                "get_many over records of {} and {}",
                self.registry.name_of(first.model()),
                self.registry.name_of(other.model())
            )));
        }
        let association = self.association(first, alias)?;
        self.load(association, sources, options).await
    }

    pub async fn count(&self, source: &Record, alias: &str, options: &GetOptions) -> AssociationResult<usize> {
        let mut options = options.clone();
        options.include.clear();
        Ok(self.get(source, alias, &options).await?.len())
    }

    /// Whether `target` is associated to `source`
    pub async fn has(
        &self,
        source: &Record,
        alias: &str,
        target: impl Into<Target>,
        options: &GetOptions,
    ) -> AssociationResult<bool> {
        self.has_all(source, alias, vec![target.into()], options).await
    }

    /// Whether every one of `targets` is associated to `source`
    pub async fn has_all(
        &self,
        source: &Record,
        alias: &str,
        targets: Vec<Target>,
        options: &GetOptions,
    ) -> AssociationResult<bool> {
        let association = self.association(source, alias)?;
        let identity = self.target_identity(association)?;
        let wanted = targets
            .iter()
            .map(|target| target.identity(&identity))
            .collect::<AssociationResult<Vec<Value>>>()?;
        let wanted = unique_values(wanted);
        if wanted.is_empty() {
            return Ok(true);
        }

        let mut options = options.clone();
        options
            .query
            .conditions
            .push(WhereCondition::eq_or_in(identity.clone(), wanted.clone()));
        options.include.clear();
        options.limit = None;
        options.attributes = None;

        let loaded = self.get(source, alias, &options).await?;
        let found: HashSet<Key> = loaded
            .instances()
            .into_iter()
            .map(|instance| instance.key(&identity))
            .collect();
        Ok(wanted.iter().all(|value| found.contains(&Key::from(value))))
    }

    pub(crate) async fn load(
        &self,
        association: &Association,
        sources: &[Record],
        options: &GetOptions,
    ) -> AssociationResult<HashMap<Key, Loaded>> {
        let source_attribute = association.source_attribute();
        let mut result: HashMap<Key, Loaded> = sources
            .iter()
            .map(|source| (source.key(source_attribute), Loaded::empty(association.is_multi())))
            .collect();
        let values = unique_values(sources.iter().map(|source| source.value(source_attribute)));
        if values.is_empty() {
            return Ok(result);
        }

        let groups = match association.kind {
            AssociationKind::BelongsToMany => self.load_through(association, &values, options).await?,
            _ => self.load_direct(association, &values, options).await?,
        };
        for (key, group) in groups {
            let loaded = if association.is_multi() {
                Loaded::Many(group)
            } else {
                Loaded::One(group.into_iter().next().map(Box::new))
            };
            result.insert(key, loaded);
        }
        Ok(result)
    }

    /// HasOne, HasMany and BelongsTo: targets whose `target_attribute` holds
    /// one of the source values
    async fn load_direct(
        &self,
        association: &Association,
        values: &[Value],
        options: &GetOptions,
    ) -> AssociationResult<HashMap<Key, Vec<Instance>>> {
        let target_attribute = association.target_attribute();
        let query = options.query.for_statement();
        let mut groups = HashMap::new();

        for chunk in values.chunks(self.batch_size()) {
            let mut find = target_find(association, options, target_attribute);
            find.conditions
                .insert(0, WhereCondition::eq_or_in(target_attribute, chunk.to_vec()));
            if chunk.len() == 1 {
                find.limit = if association.is_multi() {
                    options.limit
                } else {
                    Some(1)
                };
            } else if let (Some(limit), AssociationKind::HasMany) = (options.limit, association.kind) {
                find.grouped_limit = Some(GroupedLimit::new(
                    target_attribute,
                    chunk.to_vec(),
                    limit,
                    options.order.clone(),
                ));
            }

            let plan = PlanBuilder::new(self.registry).build(association.target, &find)?;
            let found = self.execute_plan(&plan, &query).await?;
            groups.extend(group_instances(
                found,
                target_attribute,
                chunk,
                plan.grouped_limit.as_ref(),
            ));
        }
        Ok(groups)
    }

    /// BelongsToMany: join rows for the source values, then the targets they
    /// point at, each carrying its join row
    async fn load_through(
        &self,
        association: &Association,
        values: &[Value],
        options: &GetOptions,
    ) -> AssociationResult<HashMap<Key, Vec<Instance>>> {
        let (through, identifier, foreign_identifier) = through_keys(self, association)?;
        let join = self.registry.model(through)?;
        let query = options.query.for_statement();

        let mut links: Vec<Row> = Vec::new();
        for chunk in values.chunks(self.batch_size()) {
            let mut plan = SelectPlan::new(through, join.table_name.clone(), join.primary_key_or_id());
            plan.conditions = vec![WhereCondition::eq_or_in(identifier, chunk.to_vec())];
            if options.query.applies_scope() {
                plan.conditions.extend(through_scope(association));
            }
            plan.conditions.extend(options.through_conditions.iter().cloned());
            links.extend(self.executor.find_all(&plan, &query).await?);
        }

        let target_key = association.target_key.as_str();
        let foreign_values = unique_values(links.iter().filter_map(|link| link.get(foreign_identifier).cloned()));
        let mut targets: Vec<Instance> = Vec::new();
        let chunks: Vec<&[Value]> = foreign_values.chunks(self.batch_size()).collect();
        for chunk in &chunks {
            let mut find = target_find(association, options, target_key);
            find.conditions
                .insert(0, WhereCondition::eq_or_in(target_key, chunk.to_vec()));
            if values.len() == 1 {
                find.limit = options.limit;
            }
            let plan = PlanBuilder::new(self.registry).build(association.target, &find)?;
            targets.extend(self.execute_plan(&plan, &query).await?);
        }
        if chunks.len() > 1 {
            sort_instances(&mut targets, &options.order);
        }

        let positions: HashMap<Key, usize> = targets
            .iter()
            .enumerate()
            .map(|(position, target)| (target.key(target_key), position))
            .collect();
        let mut linked: HashMap<Key, Vec<(usize, Row)>> = HashMap::new();
        for link in links {
            let target = link.get(foreign_identifier).map(Key::from).unwrap_or(Key::Null);
            let Some(&position) = positions.get(&target) else {
                continue;
            };
            let source = link.get(identifier).map(Key::from).unwrap_or(Key::Null);
            linked.entry(source).or_default().push((position, link));
        }

        let mut groups: HashMap<Key, Vec<Instance>> =
            values.iter().map(|value| (Key::from(value), Vec::new())).collect();
        for (source, mut entries) in linked {
            entries.sort_by_key(|(position, _)| *position);
            let group = groups.entry(source).or_default();
            for (position, link) in entries {
                let mut instance = targets[position].clone();
                instance.through = Some(link);
                group.push(instance);
            }
            if let Some(limit) = options.limit {
                group.truncate(limit);
            }
        }
        Ok(groups)
    }
}

/// Find options on the target model common to every read
fn target_find(association: &Association, options: &GetOptions, key_attribute: &str) -> FindOptions {
    let mut find = FindOptions::new();
    find.conditions = options.query.conditions.clone();
    if options.query.applies_scope() {
        find.conditions.extend(association.scope.iter().cloned());
    }
    find.attributes = options.attributes.clone().map(|mut attributes| {
        if !attributes.iter().any(|attribute| attribute == key_attribute) {
            attributes.push(key_attribute.to_string());
        }
        attributes
    });
    find.order = options.order.clone();
    find.include = options.include.clone();
    find
}

/// Join model and the two key columns on it
pub(crate) fn through_keys<'r, E: Executor + ?Sized>(
    associations: &Associations<'_, E>,
    association: &'r Association,
) -> AssociationResult<(ModelId, &'r str, &'r str)> {
    let missing = || AssociationError::MissingThrough {
        source_model: associations.registry.name_of(association.source),
        target: associations.registry.name_of(association.target),
    };
    let through = association.through_model().ok_or_else(missing)?;
    let foreign_identifier = association.foreign_identifier().ok_or_else(missing)?;
    Ok((through, association.identifier(), foreign_identifier))
}

pub(crate) fn through_scope(association: &Association) -> Vec<WhereCondition> {
    association
        .through
        .as_ref()
        .map(|through| through.scope.clone())
        .unwrap_or_default()
}
