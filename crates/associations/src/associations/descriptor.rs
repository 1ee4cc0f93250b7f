//! Association descriptors - resolved metadata for one directed association

use serde::{Deserialize, Serialize};
use std::fmt;

use super::kind::AssociationKind;
use super::naming::Name;
use crate::query::types::WhereCondition;
use crate::schema::attribute::{AttributeDef, DataType, ReferentialAction};
use crate::schema::ModelId;

/// Non-owning handle to an association: owning model plus alias
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssociationRef {
    pub model: ModelId,
    pub alias: String,
}

impl AssociationRef {
    pub fn new(model: ModelId, alias: impl Into<String>) -> Self {
        Self {
            model,
            alias: alias.into(),
        }
    }
}

impl fmt::Display for AssociationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.model, self.alias)
    }
}

/// Resolved join model of a many-to-many association
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Through {
    pub model: ModelId,
    /// Name of the join model, also the alias of its HasOne helpers
    pub name: String,
    pub unique: bool,
    pub unique_key: Option<String>,
    pub scope: Vec<WhereCondition>,
    /// The join model's generated primary key gave way to the two keys
    pub primary_key_deleted: bool,
}

/// Plain associations expressing a many-to-many join in two hops
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughHelpers {
    /// join -> source, keyed by the identifier
    pub to_source: Association,
    /// source -> join rows
    pub many_from_source: Association,
    /// source -> join row, aliased by the join model name
    pub one_from_source: Association,
    /// join -> target, keyed by the foreign identifier
    pub to_target: Association,
    /// target -> join rows
    pub many_from_target: Association,
    /// target -> join row, aliased by the join model name
    pub one_from_target: Association,
}

/// A directed association from `source` to `target`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Association {
    pub kind: AssociationKind,
    pub source: ModelId,
    pub target: ModelId,
    /// Key in the source's association registry
    pub alias: String,
    pub name: Name,
    pub is_aliased: bool,
    pub is_self_association: bool,
    /// Key attribute: on the target (HasOne, HasMany), on the source
    /// (BelongsTo), or the source-side key on the join model (BelongsToMany)
    pub foreign_key: String,
    /// User-supplied definition merged into the injected key
    pub foreign_key_attribute: AttributeDef,
    /// Attribute on the source matched against the key
    pub source_key: String,
    /// Attribute on the target matched against the key, and the target
    /// identity used when diffing
    pub target_key: String,
    pub scope: Vec<WhereCondition>,
    pub constraints: bool,
    pub on_delete: Option<ReferentialAction>,
    pub on_update: Option<ReferentialAction>,
    pub key_type: Option<DataType>,
    pub through: Option<Through>,
    /// Target-side key on the join model
    pub other_key: Option<String>,
    pub other_key_attribute: AttributeDef,
    /// `other_key` was derived rather than given
    pub other_key_default: bool,
    pub paired: Option<AssociationRef>,
    pub helpers: Option<Box<ThroughHelpers>>,
}

impl Association {
    /// Bare descriptor with explicit keys; constraints off, no scope
    pub(crate) fn helper(
        kind: AssociationKind,
        source: ModelId,
        target: ModelId,
        alias: &str,
        foreign_key: &str,
        source_key: &str,
        target_key: &str,
    ) -> Self {
        Self {
            kind,
            source,
            target,
            alias: alias.to_string(),
            name: Name::from_word(alias),
            is_aliased: true,
            is_self_association: source == target,
            foreign_key: foreign_key.to_string(),
            foreign_key_attribute: AttributeDef::default(),
            source_key: source_key.to_string(),
            target_key: target_key.to_string(),
            scope: Vec::new(),
            constraints: false,
            on_delete: None,
            on_update: None,
            key_type: None,
            through: None,
            other_key: None,
            other_key_attribute: AttributeDef::default(),
            other_key_default: false,
            paired: None,
            helpers: None,
        }
    }

    pub fn reference(&self) -> AssociationRef {
        AssociationRef::new(self.source, self.alias.clone())
    }

    pub fn is_multi(&self) -> bool {
        self.kind.is_multi()
    }

    pub fn through_model(&self) -> Option<ModelId> {
        self.through.as_ref().map(|through| through.model)
    }

    /// Join model column pointing at the source
    pub fn identifier(&self) -> &str {
        &self.foreign_key
    }

    /// Join model column pointing at the target
    pub fn foreign_identifier(&self) -> Option<&str> {
        self.other_key.as_deref()
    }

    /// Attribute read from a source row to find its targets
    pub fn source_attribute(&self) -> &str {
        match self.kind {
            AssociationKind::BelongsTo => &self.foreign_key,
            _ => &self.source_key,
        }
    }

    /// Attribute on target rows holding the value of `source_attribute`.
    /// For BelongsToMany the value lives on the join model instead.
    pub fn target_attribute(&self) -> &str {
        match self.kind {
            AssociationKind::HasOne | AssociationKind::HasMany => &self.foreign_key,
            AssociationKind::BelongsTo | AssociationKind::BelongsToMany => &self.target_key,
        }
    }

    /// Model whose schema carries the injected key(s)
    pub fn key_owner(&self) -> ModelId {
        match self.kind {
            AssociationKind::HasOne | AssociationKind::HasMany => self.target,
            AssociationKind::BelongsTo => self.source,
            AssociationKind::BelongsToMany => self.through_model().unwrap_or(self.target),
        }
    }

    /// Scope conditions as column/value pairs written on association writes
    pub fn scope_values(&self) -> Vec<(String, serde_json::Value)> {
        scope_values(&self.scope)
    }

    pub fn helpers(&self) -> Option<&ThroughHelpers> {
        self.helpers.as_deref()
    }
}

/// Equality conditions of a scope as assignments
pub(crate) fn scope_values(scope: &[WhereCondition]) -> Vec<(String, serde_json::Value)> {
    use crate::query::types::QueryOperator;

    scope
        .iter()
        .filter(|condition| condition.operator == QueryOperator::Equal)
        .filter_map(|condition| {
            condition
                .value
                .clone()
                .map(|value| (condition.column.clone(), value))
        })
        .collect()
}
