//! Through-model synthesis for many-to-many associations: join model
//! resolution, key injection, pairing and helper associations

use std::collections::HashSet;
use tracing::debug;

use super::descriptor::{Association, Through, ThroughHelpers};
use super::foreign_key::{references, typed_key, KeySpec};
use super::kind::AssociationKind;
use super::naming::underscore;
use super::options::{ThroughModel, ThroughOptions};
use crate::error::{AssociationError, AssociationResult};
use crate::schema::attribute::{AttributeDef, ReferentialAction, UniqueKey};
use crate::schema::{ModelId, ModelOptions, ModelRegistry};

/// Resolve the join model, defining a bare one for unknown names
pub(crate) fn resolve_through(
    registry: &mut ModelRegistry,
    source: ModelId,
    target: ModelId,
    options: Option<&ThroughOptions>,
) -> AssociationResult<Through> {
    let options = options.ok_or_else(|| AssociationError::MissingThrough {
        source_model: registry.name_of(source),
        target: registry.name_of(target),
    })?;

    let model = match &options.model {
        ThroughModel::Model(id) => registry.model(*id)?.id,
        ThroughModel::Name(name) => match registry.lookup(name) {
            Some(id) => id,
            None => {
                debug!("Defining join model {}", name);
                registry.define(
                    name,
                    Vec::<(&str, AttributeDef)>::new(),
                    ModelOptions::new().table_name(name.as_str()),
                )?
            }
        },
    };

    Ok(Through {
        model,
        name: registry.model(model)?.name.clone(),
        unique: options.unique,
        unique_key: options.unique_key.clone(),
        scope: options.scope.clone(),
        primary_key_deleted: false,
    })
}

/// Keys of every many-to-many association stored on `through`
fn keys_on_join_model(registry: &ModelRegistry, through: ModelId) -> HashSet<String> {
    registry
        .models()
        .flat_map(|model| model.associations.iter())
        .filter(|association| association.through_model() == Some(through))
        .flat_map(|association| {
            let mut keys = vec![association.foreign_key.clone()];
            keys.extend(association.other_key.clone());
            keys
        })
        .collect()
}

/// Write both keys of a many-to-many association into its join model.
///
/// Generated primary keys of the join model are dropped in favor of the
/// two keys, which then form the composite primary key. A generated key
/// that is one of the association keys is kept without the primary flag.
pub(crate) fn inject_through_keys(
    registry: &mut ModelRegistry,
    association: &mut Association,
) -> AssociationResult<()> {
    let Some(through) = association.through.clone() else {
        return Err(AssociationError::MissingThrough {
            source_model: registry.name_of(association.source),
            target: registry.name_of(association.target),
        });
    };
    let foreign_key = association.foreign_key.clone();
    let other_key = association
        .other_key
        .clone()
        .ok_or_else(|| AssociationError::UnknownKey {
            model: through.name.clone(),
            key: association.alias.clone(),
        })?;

    let mut source_attribute = typed_key(
        registry,
        &KeySpec {
            name: &foreign_key,
            user_attribute: &association.foreign_key_attribute,
            referenced: association.source,
            referenced_key: &association.source_key,
            key_type: association.key_type,
        },
    )?;
    let mut target_attribute = typed_key(
        registry,
        &KeySpec {
            name: &other_key,
            user_attribute: &association.other_key_attribute,
            referenced: association.target,
            referenced_key: &association.target_key,
            key_type: None,
        },
    )?;
    let source_references = references(registry, association.source, &association.source_key)?;
    let target_references = references(registry, association.target, &association.target_key)?;
    let protected = keys_on_join_model(registry, through.model);

    let join = registry.model_mut(through.model)?;
    let join_table = join.table_name.clone();

    let mut primary_key_deleted = through.primary_key_deleted;
    let generated: Vec<String> = join
        .raw_attributes
        .iter()
        .filter(|(_, def)| def.is_primary_key() && def.auto_generated)
        .map(|(name, _)| name.to_string())
        .collect();
    for name in generated {
        if name == foreign_key || name == other_key || protected.contains(&name) {
            if let Some(def) = join.raw_attributes.get_mut(&name) {
                def.primary_key = Some(false);
            }
        } else {
            debug!("Removing generated primary key {}.{}", join.name, name);
            join.raw_attributes.remove(&name);
        }
        primary_key_deleted = true;
    }

    let already_primary = [&foreign_key, &other_key].iter().all(|key| {
        join.raw_attributes
            .get(key.as_str())
            .map(AttributeDef::is_primary_key)
            .unwrap_or(false)
    });
    if primary_key_deleted {
        source_attribute.primary_key = Some(true);
        target_attribute.primary_key = Some(true);
    } else if through.unique && !already_primary {
        let unique_key = match &through.unique_key {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("{}_{}_{}_unique", join_table, foreign_key, other_key),
        };
        source_attribute.unique = Some(UniqueKey::Composite(unique_key.clone()));
        target_attribute.unique = Some(UniqueKey::Composite(unique_key));
    }

    for key in [&foreign_key, &other_key] {
        if !join.raw_attributes.contains(key) {
            join.raw_attributes.entry(key).auto_generated = true;
        }
    }

    if association.constraints {
        let existing_source = join.raw_attributes.get(&foreign_key).cloned().unwrap_or_default();
        source_attribute.references = Some(source_references);
        source_attribute.on_delete = source_attribute
            .on_delete
            .or(association.on_delete)
            .or(existing_source.on_delete)
            .or(Some(ReferentialAction::Cascade));
        source_attribute.on_update = source_attribute
            .on_update
            .or(association.on_update)
            .or(existing_source.on_update)
            .or(Some(ReferentialAction::Cascade));

        let existing_target = join.raw_attributes.get(&other_key).cloned().unwrap_or_default();
        target_attribute.references = Some(target_references);
        target_attribute.on_delete = target_attribute
            .on_delete
            .or(existing_target.on_delete)
            .or(association.on_delete)
            .or(Some(ReferentialAction::Cascade));
        target_attribute.on_update = target_attribute
            .on_update
            .or(existing_target.on_update)
            .or(association.on_update)
            .or(Some(ReferentialAction::Cascade));
    }

    if join.underscored {
        if source_attribute.field.is_none() {
            source_attribute.field = Some(underscore(&foreign_key));
        }
        if target_attribute.field.is_none() {
            target_attribute.field = Some(underscore(&other_key));
        }
    }

    debug!(
        "Injecting join keys {}.{} and {}.{} for association {}",
        join.name, foreign_key, join.name, other_key, association.alias
    );
    join.raw_attributes.entry(&foreign_key).assign(&source_attribute);
    join.raw_attributes.entry(&other_key).assign(&target_attribute);

    if let Some(through) = association.through.as_mut() {
        through.primary_key_deleted = primary_key_deleted;
    }
    Ok(())
}

/// Build the six plain associations expressing the join in two hops
pub(crate) fn build_helpers(
    registry: &ModelRegistry,
    association: &Association,
) -> AssociationResult<ThroughHelpers> {
    let through = association
        .through
        .as_ref()
        .ok_or_else(|| AssociationError::MissingThrough {
            source_model: registry.name_of(association.source),
            target: registry.name_of(association.target),
        })?;
    let join = registry.model(through.model)?;
    let join_key = join.primary_key_or_id();
    let identifier = association.identifier();
    let foreign_identifier = association.foreign_identifier().unwrap_or_default();

    let helper = |kind: AssociationKind,
                  source: ModelId,
                  target: ModelId,
                  alias: &str,
                  foreign_key: &str,
                  source_key: &str,
                  target_key: &str| {
        let mut helper =
            Association::helper(kind, source, target, alias, foreign_key, source_key, target_key);
        if kind.is_multi() || kind == AssociationKind::HasOne {
            helper.scope = through.scope.clone();
        }
        helper
    };

    Ok(ThroughHelpers {
        to_source: helper(
            AssociationKind::BelongsTo,
            through.model,
            association.source,
            &registry.model(association.source)?.names.singular,
            identifier,
            join_key,
            &association.source_key,
        ),
        many_from_source: helper(
            AssociationKind::HasMany,
            association.source,
            through.model,
            &join.names.plural,
            identifier,
            &association.source_key,
            join_key,
        ),
        one_from_source: helper(
            AssociationKind::HasOne,
            association.source,
            through.model,
            &through.name,
            identifier,
            &association.source_key,
            join_key,
        ),
        to_target: helper(
            AssociationKind::BelongsTo,
            through.model,
            association.target,
            &association.name.singular,
            foreign_identifier,
            join_key,
            &association.target_key,
        ),
        many_from_target: helper(
            AssociationKind::HasMany,
            association.target,
            through.model,
            &join.names.plural,
            foreign_identifier,
            &association.target_key,
            join_key,
        ),
        one_from_target: helper(
            AssociationKind::HasOne,
            association.target,
            through.model,
            &through.name,
            foreign_identifier,
            &association.target_key,
            join_key,
        ),
    })
}

/// Link `association` with the first unpaired many-to-many association of
/// the target that points back through the same join model, and converge
/// their defaulted keys.
pub(crate) fn pair(
    registry: &mut ModelRegistry,
    association: &mut Association,
) -> AssociationResult<()> {
    let Some(through_model) = association.through_model() else {
        return Ok(());
    };

    let partner = registry
        .model(association.target)?
        .associations
        .iter()
        .find(|candidate| {
            candidate.kind == AssociationKind::BelongsToMany
                && candidate.target == association.source
                && candidate.through_model() == Some(through_model)
                && candidate.paired.is_none()
        })
        .map(Association::reference);
    let Some(partner_ref) = partner else {
        return Ok(());
    };

    let this_ref = association.reference();
    let partner = registry.association_mut(&partner_ref)?;
    partner.paired = Some(this_ref);
    let partner_foreign_key = partner.foreign_key.clone();
    let stale_other_key = match (&partner.other_key, partner.other_key_default) {
        (Some(other_key), true) if *other_key != association.foreign_key => {
            let stale = other_key.clone();
            partner.other_key = Some(association.foreign_key.clone());
            Some(stale)
        }
        _ => None,
    };
    association.paired = Some(partner_ref.clone());

    if association.other_key_default {
        association.other_key = Some(partner_foreign_key);
    }

    if let Some(stale) = stale_other_key {
        debug!(
            "Re-keying paired association {}: {} -> {}",
            partner_ref, stale, association.foreign_key
        );
        registry.model_mut(through_model)?.raw_attributes.remove(&stale);

        let mut partner = registry.association(&partner_ref)?.clone();
        inject_through_keys(registry, &mut partner)?;
        partner.helpers = Some(Box::new(build_helpers(registry, &partner)?));
        *registry.association_mut(&partner_ref)? = partner;
    }
    Ok(())
}
