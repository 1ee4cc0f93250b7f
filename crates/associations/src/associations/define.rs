//! Association definition - `has_one`, `belongs_to`, `has_many` and
//! `belongs_to_many` on the model registry

use tracing::debug;

use super::descriptor::{Association, AssociationRef};
use super::foreign_key;
use super::kind::AssociationKind;
use super::naming::{foreign_key_name, singularize, Name};
use super::options::{Alias, AssociationOptions};
use super::through;
use crate::error::{AssociationError, AssociationResult, CollidesWith};
use crate::schema::attribute::AttributeDef;
use crate::schema::{ModelId, ModelRegistry};

impl ModelRegistry {
    /// One-to-one with the key on the target
    pub fn has_one(
        &mut self,
        source: ModelId,
        target: ModelId,
        options: AssociationOptions,
    ) -> AssociationResult<AssociationRef> {
        self.associate(AssociationKind::HasOne, source, target, options)
    }

    /// Many-to-one with the key on the source
    pub fn belongs_to(
        &mut self,
        source: ModelId,
        target: ModelId,
        options: AssociationOptions,
    ) -> AssociationResult<AssociationRef> {
        self.associate(AssociationKind::BelongsTo, source, target, options)
    }

    /// One-to-many with the key on the target
    pub fn has_many(
        &mut self,
        source: ModelId,
        target: ModelId,
        options: AssociationOptions,
    ) -> AssociationResult<AssociationRef> {
        self.associate(AssociationKind::HasMany, source, target, options)
    }

    /// Many-to-many through a join model
    pub fn belongs_to_many(
        &mut self,
        source: ModelId,
        target: ModelId,
        options: AssociationOptions,
    ) -> AssociationResult<AssociationRef> {
        self.associate(AssociationKind::BelongsToMany, source, target, options)
    }

    /// Define an association. All schema changes are staged on a copy of the
    /// registry and only become visible when every step succeeded.
    fn associate(
        &mut self,
        kind: AssociationKind,
        source: ModelId,
        target: ModelId,
        options: AssociationOptions,
    ) -> AssociationResult<AssociationRef> {
        let mut draft = self.clone();
        let reference = draft.stage_association(kind, source, target, options)?;
        *self = draft;
        Ok(reference)
    }

    fn stage_association(
        &mut self,
        kind: AssociationKind,
        source: ModelId,
        target: ModelId,
        options: AssociationOptions,
    ) -> AssociationResult<AssociationRef> {
        let mut association = self.build_descriptor(kind, source, target, &options)?;

        if kind == AssociationKind::BelongsToMany {
            association.through = Some(through::resolve_through(
                self,
                source,
                target,
                options.through.as_ref(),
            )?);
            through::pair(self, &mut association)?;
            self.require_key(source, &association.source_key)?;
            self.require_key(target, &association.target_key)?;
            through::inject_through_keys(self, &mut association)?;
            association.helpers = Some(Box::new(through::build_helpers(self, &association)?));
        } else {
            let (owner_side, key) = match kind {
                AssociationKind::BelongsTo => (target, &association.target_key),
                _ => (source, &association.source_key),
            };
            self.require_key(owner_side, key)?;
            foreign_key::inject(self, &association)?;
        }

        let reference = association.reference();
        debug!(
            "Defined {} association {}.{} -> {} (key {})",
            kind,
            self.name_of(source),
            association.alias,
            self.name_of(target),
            association.foreign_key
        );
        self.model_mut(source)?.associations.register(association)?;
        Ok(reference)
    }

    /// Resolve names and keys without touching any schema
    fn build_descriptor(
        &self,
        kind: AssociationKind,
        source: ModelId,
        target: ModelId,
        options: &AssociationOptions,
    ) -> AssociationResult<Association> {
        let source_model = self.model(source)?;
        let target_model = self.model(target)?;
        let is_self_association = source == target;

        if kind == AssociationKind::BelongsToMany && is_self_association && options.alias.is_none() {
            return Err(AssociationError::SelfAssociationAlias {
                model: source_model.name.clone(),
            });
        }

        let (name, is_aliased) = match &options.alias {
            None => (target_model.names.clone(), false),
            Some(Alias::Word(word)) if kind.is_multi() => (Name::from_plural(word), true),
            Some(Alias::Word(word)) => (Name::from_singular(word), true),
            Some(Alias::Named(name)) => (name.clone(), true),
        };
        let alias = if kind.is_multi() {
            name.plural.clone()
        } else {
            name.singular.clone()
        };

        let existing = if source_model.has_alias(&alias) {
            Some(CollidesWith::Association)
        } else if source_model.has_attribute(&alias) {
            Some(CollidesWith::Attribute)
        } else {
            None
        };
        if let Some(existing) = existing {
            return Err(AssociationError::AliasCollision {
                model: source_model.name.clone(),
                alias,
                existing,
            });
        }

        let source_key = match kind {
            AssociationKind::BelongsTo => source_model.primary_key_or_id().to_string(),
            _ => options
                .source_key
                .clone()
                .unwrap_or_else(|| source_model.primary_key_or_id().to_string()),
        };
        let target_key = match kind {
            AssociationKind::HasOne | AssociationKind::HasMany => {
                target_model.primary_key_or_id().to_string()
            }
            _ => options
                .target_key
                .clone()
                .unwrap_or_else(|| target_model.primary_key_or_id().to_string()),
        };

        let foreign_key = match options.foreign_key.as_ref().and_then(|key| key.name()) {
            Some(name) => name.to_string(),
            None => match kind {
                AssociationKind::BelongsTo => foreign_key_name(&name.singular, &target_key),
                _ => foreign_key_name(&source_model.names.singular, &source_key),
            },
        };
        let foreign_key_attribute = options
            .foreign_key
            .as_ref()
            .map(|key| key.attribute())
            .unwrap_or_default();

        let mut association = Association {
            kind,
            source,
            target,
            alias: alias.clone(),
            name,
            is_aliased,
            is_self_association,
            foreign_key,
            foreign_key_attribute,
            source_key,
            target_key,
            scope: options.scope.clone(),
            constraints: options.constraints.unwrap_or(self.config().constraints),
            on_delete: options.on_delete,
            on_update: options.on_update,
            key_type: options.key_type,
            through: None,
            other_key: None,
            other_key_attribute: AttributeDef::default(),
            other_key_default: false,
            paired: None,
            helpers: None,
        };

        if kind == AssociationKind::BelongsToMany {
            match options.other_key.as_ref().and_then(|key| key.name()) {
                Some(other_key) => association.other_key = Some(other_key.to_string()),
                None => {
                    let owner = if is_self_association {
                        singularize(&alias)
                    } else {
                        target_model.names.singular.clone()
                    };
                    association.other_key =
                        Some(foreign_key_name(&owner, &association.target_key));
                    association.other_key_default = true;
                }
            }
            association.other_key_attribute = options
                .other_key
                .as_ref()
                .map(|key| key.attribute())
                .unwrap_or_default();
        }

        Ok(association)
    }

    fn require_key(&self, model: ModelId, key: &str) -> AssociationResult<()> {
        let definition = self.model(model)?;
        if definition.has_attribute(key) {
            Ok(())
        } else {
            Err(AssociationError::UnknownKey {
                model: definition.name.clone(),
                key: key.to_string(),
            })
        }
    }
}
