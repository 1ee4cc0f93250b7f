//! Foreign-key injection - derive key columns and write them into the
//! owning model's schema

use tracing::debug;

use super::descriptor::Association;
use super::kind::AssociationKind;
use super::naming::underscore;
use crate::error::{AssociationError, AssociationResult};
use crate::schema::attribute::{AttributeDef, DataType, ReferentialAction, References};
use crate::schema::{ModelId, ModelRegistry};

/// Column definition of a key referencing `key` on `referenced`
pub(crate) struct KeySpec<'a> {
    pub name: &'a str,
    pub user_attribute: &'a AttributeDef,
    pub referenced: ModelId,
    pub referenced_key: &'a str,
    pub key_type: Option<DataType>,
}

/// Type of `key` on `model`, or INTEGER when the key declares none
pub(crate) fn referenced_type(
    registry: &ModelRegistry,
    model: ModelId,
    key: &str,
) -> AssociationResult<DataType> {
    let definition = registry.model(model)?;
    let attribute = definition
        .raw_attributes
        .get(key)
        .ok_or_else(|| AssociationError::UnknownKey {
            model: definition.name.clone(),
            key: key.to_string(),
        })?;
    Ok(attribute.data_type.unwrap_or(DataType::Integer))
}

/// User attribute over the referenced key's type
pub(crate) fn typed_key(
    registry: &ModelRegistry,
    spec: &KeySpec<'_>,
) -> AssociationResult<AttributeDef> {
    let data_type = match spec.key_type {
        Some(data_type) => data_type,
        None => referenced_type(registry, spec.referenced, spec.referenced_key)?,
    };

    let mut definition = spec.user_attribute.clone();
    if definition.data_type.is_none() {
        definition.data_type = Some(data_type);
    }
    Ok(definition)
}

/// Base definition for a key column, nullable unless declared otherwise
pub(crate) fn key_definition(
    registry: &ModelRegistry,
    spec: &KeySpec<'_>,
) -> AssociationResult<AttributeDef> {
    let mut definition = typed_key(registry, spec)?;
    if definition.allow_null.is_none() {
        definition.allow_null = Some(true);
    }
    Ok(definition)
}

/// REFERENCES clause pointing at the referenced model's key column
pub(crate) fn references(
    registry: &ModelRegistry,
    model: ModelId,
    key: &str,
) -> AssociationResult<References> {
    let definition = registry.model(model)?;
    Ok(References {
        table: definition.table_name.clone(),
        key: definition.field_name(key).to_string(),
    })
}

/// Inject the key of a HasOne, HasMany or BelongsTo association.
///
/// The derived definition only fills what the owning schema leaves unset,
/// so injecting the same association again changes nothing.
pub(crate) fn inject(registry: &mut ModelRegistry, association: &Association) -> AssociationResult<()> {
    let (owner, referenced, referenced_key) = match association.kind {
        AssociationKind::HasOne | AssociationKind::HasMany => (
            association.target,
            association.source,
            association.source_key.as_str(),
        ),
        AssociationKind::BelongsTo => (
            association.source,
            association.target,
            association.target_key.as_str(),
        ),
        AssociationKind::BelongsToMany => return Ok(()),
    };

    let spec = KeySpec {
        name: &association.foreign_key,
        user_attribute: &association.foreign_key_attribute,
        referenced,
        referenced_key,
        key_type: association.key_type,
    };
    let mut definition = key_definition(registry, &spec)?;

    let owner_model = registry.model(owner)?;
    if association.constraints {
        // Nullability as it will be after the merge
        let mut merged = owner_model
            .raw_attributes
            .get(spec.name)
            .cloned()
            .unwrap_or_default();
        merged.merge_defaults(&definition);
        let nullable = merged.is_nullable();

        let on_delete_default = match (association.kind, nullable) {
            (_, true) => ReferentialAction::SetNull,
            (AssociationKind::BelongsTo, false) => ReferentialAction::NoAction,
            (_, false) => ReferentialAction::Cascade,
        };
        definition.on_delete = definition
            .on_delete
            .or(association.on_delete)
            .or(Some(on_delete_default));
        definition.on_update = definition
            .on_update
            .or(association.on_update)
            .or(Some(ReferentialAction::Cascade));
        if definition.references.is_none() {
            definition.references = Some(references(registry, referenced, referenced_key)?);
        }
    }

    let owner_model = registry.model_mut(owner)?;
    if owner_model.underscored && definition.field.is_none() {
        definition.field = Some(underscore(spec.name));
    }
    debug!(
        "Injecting {} key {}.{} for association {}",
        association.kind, owner_model.name, spec.name, association.alias
    );
    owner_model
        .raw_attributes
        .entry(spec.name)
        .merge_defaults(&definition);
    Ok(())
}
