//! Association writes: `set`, `add`, `remove`, `create`
//!
//! Statements are issued in a fixed order. For `set`: obsolete links are
//! removed first, then changed join rows are updated, then new links are
//! written.

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::get::{through_keys, through_scope};
use super::{row_of, source_value, unique_values, Associations, GetOptions, Target};
use crate::associations::descriptor::{scope_values, Association};
use crate::associations::kind::AssociationKind;
use crate::error::{AssociationError, AssociationResult};
use crate::executor::{Executor, QueryOptions};
use crate::plan::SelectPlan;
use crate::query::types::{values_equal, WhereCondition};
use crate::record::{Key, Record, Row};
use crate::schema::ModelId;

impl<'a, E: Executor + ?Sized> Associations<'a, E> {
    /// Replace the targets of an association. `None` clears it. For single
    /// associations at most one target may be given; BelongsTo writes the
    /// key onto `source`.
    pub async fn set(
        &self,
        source: &mut Record,
        alias: &str,
        targets: Option<Vec<Target>>,
        options: &QueryOptions,
    ) -> AssociationResult<()> {
        let association = self.association(source, alias)?;
        let targets = targets.unwrap_or_default();
        match association.kind {
            AssociationKind::HasMany => self.set_has_many(association, source, targets, options).await,
            AssociationKind::BelongsToMany => {
                self.set_belongs_to_many(association, source, targets, options).await
            }
            AssociationKind::HasOne => {
                let target = single_target(association, targets)?;
                self.set_has_one(association, source, target, options).await
            }
            AssociationKind::BelongsTo => {
                let target = single_target(association, targets)?;
                self.set_belongs_to(association, source, target, options).await
            }
        }
    }

    /// Associate more targets to a collection association. Empty input
    /// issues no statement.
    pub async fn add(
        &self,
        source: &Record,
        alias: &str,
        targets: Vec<Target>,
        options: &QueryOptions,
    ) -> AssociationResult<()> {
        let association = self.association(source, alias)?;
        if targets.is_empty() {
            return Ok(());
        }
        match association.kind {
            AssociationKind::HasMany => {
                let source_value = source_value(source, association)?;
                let identity = self.target_identity(association)?;
                let keys = target_keys(&targets, &identity)?;
                self.point_targets(association, &source_value, &identity, keys, options)
                    .await
            }
            AssociationKind::BelongsToMany => {
                let source_value = source_value(source, association)?;
                let requested = link_requests(association, targets, options)?;
                let keys: Vec<Value> = requested.iter().map(|(key, _)| key.clone()).collect();
                let current = self
                    .current_links(association, &source_value, Some(keys), options)
                    .await?;
                self.write_links(association, &source_value, &current, requested, options)
                    .await
            }
            kind => Err(not_a_collection("add", association, kind)),
        }
    }

    /// Disassociate targets from a collection association. Empty input
    /// issues no statement.
    pub async fn remove(
        &self,
        source: &Record,
        alias: &str,
        targets: Vec<Target>,
        options: &QueryOptions,
    ) -> AssociationResult<()> {
        let association = self.association(source, alias)?;
        if targets.is_empty() {
            return Ok(());
        }
        let source_value = source_value(source, association)?;
        let identity = self.target_identity(association)?;
        let keys = target_keys(&targets, &identity)?;
        match association.kind {
            AssociationKind::HasMany => {
                self.release_targets(association, &source_value, &identity, keys, options)
                    .await
            }
            AssociationKind::BelongsToMany => {
                self.destroy_links(association, &source_value, keys, options).await
            }
            kind => Err(not_a_collection("remove", association, kind)),
        }
    }

    /// Create a target and associate it in one call
    pub async fn create(
        &self,
        source: &mut Record,
        alias: &str,
        mut values: Row,
        options: &QueryOptions,
    ) -> AssociationResult<Record> {
        let association = self.association(source, alias)?;
        match association.kind {
            AssociationKind::HasMany | AssociationKind::HasOne => {
                let source_value = source_value(source, association)?;
                values.insert(association.foreign_key.clone(), source_value);
                if options.applies_scope() {
                    values.extend(association.scope_values());
                }
                self.insert_one(association.target, values, options).await
            }
            AssociationKind::BelongsTo => {
                let created = self.insert_one(association.target, values, options).await?;
                self.set_belongs_to(association, source, Some(Target::record(created.clone())), options)
                    .await?;
                Ok(created)
            }
            AssociationKind::BelongsToMany => {
                if options.applies_scope() {
                    values.extend(association.scope_values());
                }
                let created = self.insert_one(association.target, values, options).await?;
                self.add(source, alias, vec![Target::record(created.clone())], options)
                    .await?;
                Ok(created)
            }
        }
    }

    async fn set_has_many(
        &self,
        association: &Association,
        source: &Record,
        targets: Vec<Target>,
        options: &QueryOptions,
    ) -> AssociationResult<()> {
        let source_value = source_value(source, association)?;
        let identity = self.target_identity(association)?;
        let requested = target_keys(&targets, &identity)?;
        let current = self.current_keys(association, source, &identity, options).await?;

        let (obsolete, new) = diff(&current, &requested);
        debug!(
            "Setting {}: {} obsolete, {} new target(s)",
            association.reference(),
            obsolete.len(),
            new.len()
        );
        self.release_targets(association, &source_value, &identity, obsolete, options)
            .await?;
        self.point_targets(association, &source_value, &identity, new, options)
            .await
    }

    async fn set_has_one(
        &self,
        association: &Association,
        source: &Record,
        target: Option<Target>,
        options: &QueryOptions,
    ) -> AssociationResult<()> {
        let source_value = source_value(source, association)?;
        let identity = self.target_identity(association)?;
        let new = target.map(|target| target.identity(&identity)).transpose()?;
        let current = self.current_keys(association, source, &identity, options).await?;

        let new_key = new.as_ref().map(Key::from);
        let obsolete: Vec<Value> = current
            .into_iter()
            .filter(|value| Some(Key::from(value)) != new_key)
            .collect();
        self.release_targets(association, &source_value, &identity, obsolete, options)
            .await?;
        if let Some(new) = new {
            self.point_targets(association, &source_value, &identity, vec![new], options)
                .await?;
        }
        Ok(())
    }

    async fn set_belongs_to(
        &self,
        association: &Association,
        source: &mut Record,
        target: Option<Target>,
        options: &QueryOptions,
    ) -> AssociationResult<()> {
        let value = match target {
            Some(target) => target.identity(&association.target_key)?,
            None => Value::Null,
        };
        let model = self.registry.model(source.model())?;
        let primary_key = model.primary_key_or_id();
        let key = source.value(primary_key);
        if key.is_null() {
            return Err(AssociationError::InvalidTarget(format!(
                "{} record has no value for '{}'",
                model.name, primary_key
            )));
        }

        let values = row_of([(association.foreign_key.clone(), value.clone())]);
        self.executor
            .update(
                source.model(),
                &values,
                &[WhereCondition::eq(primary_key, key)],
                &options.for_statement(),
            )
            .await?;
        source.set(association.foreign_key.clone(), value);
        Ok(())
    }

    async fn set_belongs_to_many(
        &self,
        association: &Association,
        source: &Record,
        targets: Vec<Target>,
        options: &QueryOptions,
    ) -> AssociationResult<()> {
        let source_value = source_value(source, association)?;
        let requested = link_requests(association, targets, options)?;
        let current = self
            .current_links(association, &source_value, None, options)
            .await?;

        let (_, _, foreign_identifier) = through_keys(self, association)?;
        let requested_keys: HashSet<Key> = requested.iter().map(|(key, _)| Key::from(key)).collect();
        let obsolete = unique_values(
            current
                .iter()
                .filter_map(|link| link.get(foreign_identifier))
                .filter(|value| !requested_keys.contains(&Key::from(*value)))
                .cloned(),
        );
        debug!(
            "Setting {}: {} current link(s), {} obsolete",
            association.reference(),
            current.len(),
            obsolete.len()
        );

        self.destroy_links(association, &source_value, obsolete, options)
            .await?;
        self.write_links(association, &source_value, &current, requested, options)
            .await
    }

    /// Keys of the targets currently associated, ignoring the scope
    async fn current_keys(
        &self,
        association: &Association,
        source: &Record,
        identity: &str,
        options: &QueryOptions,
    ) -> AssociationResult<Vec<Value>> {
        let query = QueryOptions {
            conditions: Vec::new(),
            scope: Some(false),
            ..options.clone()
        };
        let get = GetOptions::new().query(query).attributes([identity]);
        let key = source.key(association.source_attribute());
        let mut loaded = self
            .load(association, std::slice::from_ref(source), &get)
            .await?;
        let current = loaded.remove(&key).map(|loaded| {
            loaded
                .instances()
                .into_iter()
                .map(|instance| instance.record.value(identity))
                .collect::<Vec<_>>()
        });
        Ok(unique_values(current.unwrap_or_default()))
    }

    /// Point targets at the source: foreign key plus scope
    async fn point_targets(
        &self,
        association: &Association,
        source_value: &Value,
        identity: &str,
        keys: Vec<Value>,
        options: &QueryOptions,
    ) -> AssociationResult<()> {
        let mut values = row_of([(association.foreign_key.clone(), source_value.clone())]);
        values.extend(association.scope_values());
        let statement = options.for_statement();
        for chunk in keys.chunks(self.batch_size()) {
            self.executor
                .update(
                    association.target,
                    &values,
                    &[WhereCondition::eq_or_in(identity, chunk.to_vec())],
                    &statement,
                )
                .await?;
        }
        Ok(())
    }

    /// Null the foreign key of targets currently pointing at the source
    async fn release_targets(
        &self,
        association: &Association,
        source_value: &Value,
        identity: &str,
        keys: Vec<Value>,
        options: &QueryOptions,
    ) -> AssociationResult<()> {
        let values = row_of([(association.foreign_key.clone(), Value::Null)]);
        let statement = options.for_statement();
        for chunk in keys.chunks(self.batch_size()) {
            let conditions = [
                WhereCondition::eq(association.foreign_key.clone(), source_value.clone()),
                WhereCondition::eq_or_in(identity, chunk.to_vec()),
            ];
            self.executor
                .update(association.target, &values, &conditions, &statement)
                .await?;
        }
        Ok(())
    }

    /// Join rows of the source, optionally restricted to some targets
    async fn current_links(
        &self,
        association: &Association,
        source_value: &Value,
        targets: Option<Vec<Value>>,
        options: &QueryOptions,
    ) -> AssociationResult<Vec<Row>> {
        let (through, identifier, foreign_identifier) = through_keys(self, association)?;
        let join = self.registry.model(through)?;
        let mut plan = SelectPlan::new(through, join.table_name.clone(), join.primary_key_or_id());
        plan.conditions = vec![WhereCondition::eq(identifier, source_value.clone())];
        if let Some(targets) = targets {
            plan.conditions
                .push(WhereCondition::eq_or_in(foreign_identifier, targets));
        }
        plan.conditions.extend(through_scope(association));
        self.executor.find_all(&plan, &options.for_statement()).await
    }

    /// Update join rows whose attributes differ and insert the missing ones
    async fn write_links(
        &self,
        association: &Association,
        source_value: &Value,
        current: &[Row],
        requested: Vec<(Value, Row)>,
        options: &QueryOptions,
    ) -> AssociationResult<()> {
        let (through, identifier, foreign_identifier) = through_keys(self, association)?;
        let statement = options.for_statement();
        let existing: HashMap<Key, &Row> = current
            .iter()
            .filter_map(|link| link.get(foreign_identifier).map(|key| (Key::from(key), link)))
            .collect();

        let mut created = Vec::new();
        for (key, attributes) in requested {
            match existing.get(&Key::from(&key)) {
                Some(link) => {
                    let changed: Row = attributes
                        .into_iter()
                        .filter(|(column, value)| {
                            !link
                                .get(column)
                                .is_some_and(|current| values_equal(current, value))
                        })
                        .collect();
                    if changed.is_empty() {
                        continue;
                    }
                    let conditions = [
                        WhereCondition::eq(identifier, source_value.clone()),
                        WhereCondition::eq(foreign_identifier, key),
                    ];
                    self.executor
                        .update(through, &changed, &conditions, &statement)
                        .await?;
                }
                None => {
                    let mut row = attributes;
                    row.insert(identifier.to_string(), source_value.clone());
                    row.insert(foreign_identifier.to_string(), key);
                    row.extend(scope_values(&through_scope(association)));
                    created.push(row);
                }
            }
        }

        if !created.is_empty() {
            debug!("Linking {} new target(s) through {}", created.len(), self.registry.name_of(through));
        }
        while !created.is_empty() {
            let rest = created.split_off(created.len().min(self.batch_size()));
            self.executor.bulk_create(through, created, &statement).await?;
            created = rest;
        }
        Ok(())
    }

    async fn destroy_links(
        &self,
        association: &Association,
        source_value: &Value,
        keys: Vec<Value>,
        options: &QueryOptions,
    ) -> AssociationResult<()> {
        let (through, identifier, foreign_identifier) = through_keys(self, association)?;
        let statement = options.for_statement();
        for chunk in keys.chunks(self.batch_size()) {
            let mut conditions = vec![
                WhereCondition::eq(identifier, source_value.clone()),
                WhereCondition::eq_or_in(foreign_identifier, chunk.to_vec()),
            ];
            conditions.extend(through_scope(association));
            self.executor.destroy(through, &conditions, &statement).await?;
        }
        Ok(())
    }

    async fn insert_one(&self, model: ModelId, values: Row, options: &QueryOptions) -> AssociationResult<Record> {
        let created = self
            .executor
            .bulk_create(model, vec![values], &options.for_statement())
            .await?;
        created
            .into_iter()
            .next()
            .map(|row| Record::new(model, row))
            .ok_or_else(|| {
                AssociationError::Executor(format!(
                    "insert into {} returned no row",
                    self.registry.name_of(model)
                ))
            })
    }
}

fn single_target(association: &Association, targets: Vec<Target>) -> AssociationResult<Option<Target>> {
    if targets.len() > 1 {
        return Err(AssociationError::InvalidTarget(format!(
            "{} is a {} association and takes at most one target",
            association.reference(),
            association.kind
        )));
    }
    Ok(targets.into_iter().next())
}

fn not_a_collection(operation: &str, association: &Association, kind: AssociationKind) -> AssociationError {
    AssociationError::InvalidTarget(format!(
        "{} is not defined for {} association {}",
        operation,
        kind,
        association.reference()
    ))
}

fn target_keys(targets: &[Target], identity: &str) -> AssociationResult<Vec<Value>> {
    let keys = targets
        .iter()
        .map(|target| target.identity(identity))
        .collect::<AssociationResult<Vec<Value>>>()?;
    Ok(unique_values(keys))
}

/// Target keys with the join row attributes to write for each: defaults
/// from the options, then the target's own
fn link_requests(
    association: &Association,
    targets: Vec<Target>,
    options: &QueryOptions,
) -> AssociationResult<Vec<(Value, Row)>> {
    let mut seen = HashSet::new();
    let mut requested = Vec::new();
    for target in targets {
        let key = target.identity(&association.target_key)?;
        if !seen.insert(Key::from(&key)) {
            continue;
        }
        let mut attributes = options.through.clone().unwrap_or_default();
        if let Some(through) = target.through {
            attributes.extend(through);
        }
        requested.push((key, attributes));
    }
    Ok(requested)
}

/// Values of `current` not requested, and requested values not current
fn diff(current: &[Value], requested: &[Value]) -> (Vec<Value>, Vec<Value>) {
    let current_keys: HashSet<Key> = current.iter().map(Key::from).collect();
    let requested_keys: HashSet<Key> = requested.iter().map(Key::from).collect();
    let obsolete = current
        .iter()
        .filter(|value| !requested_keys.contains(&Key::from(*value)))
        .cloned()
        .collect();
    let new = requested
        .iter()
        .filter(|value| !current_keys.contains(&Key::from(*value)))
        .cloned()
        .collect();
    (obsolete, new)
}
