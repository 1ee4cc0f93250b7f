//! Association options - what callers pass to `has_one`, `belongs_to`,
//! `has_many` and `belongs_to_many`

use serde::{Deserialize, Serialize};

use super::naming::Name;
use crate::query::types::WhereCondition;
use crate::schema::attribute::{AttributeDef, DataType, ReferentialAction};
use crate::schema::ModelId;

/// Association alias: a plain word (inflected) or explicit name forms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Alias {
    Word(String),
    Named(Name),
}

impl From<&str> for Alias {
    fn from(word: &str) -> Self {
        Alias::Word(word.to_string())
    }
}

impl From<String> for Alias {
    fn from(word: String) -> Self {
        Alias::Word(word)
    }
}

impl From<Name> for Alias {
    fn from(name: Name) -> Self {
        Alias::Named(name)
    }
}

/// Foreign key given by name, or as a full attribute definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ForeignKey {
    Name(String),
    Definition {
        name: Option<String>,
        attribute: AttributeDef,
    },
}

impl ForeignKey {
    pub fn definition(name: impl Into<String>, attribute: AttributeDef) -> Self {
        ForeignKey::Definition {
            name: Some(name.into()),
            attribute,
        }
    }

    /// Attribute name: explicit name, else the definition's column name
    pub fn name(&self) -> Option<&str> {
        match self {
            ForeignKey::Name(name) => Some(name),
            ForeignKey::Definition { name, attribute } => {
                name.as_deref().or(attribute.field.as_deref())
            }
        }
    }

    /// User-supplied column definition (empty for a bare name)
    pub fn attribute(&self) -> AttributeDef {
        match self {
            ForeignKey::Name(_) => AttributeDef::default(),
            ForeignKey::Definition { attribute, .. } => attribute.clone(),
        }
    }
}

impl From<&str> for ForeignKey {
    fn from(name: &str) -> Self {
        ForeignKey::Name(name.to_string())
    }
}

impl From<String> for ForeignKey {
    fn from(name: String) -> Self {
        ForeignKey::Name(name)
    }
}

/// Join model reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ThroughModel {
    /// Model name, defined on first use
    Name(String),
    /// Already defined model
    Model(ModelId),
}

impl From<&str> for ThroughModel {
    fn from(name: &str) -> Self {
        ThroughModel::Name(name.to_string())
    }
}

impl From<ModelId> for ThroughModel {
    fn from(id: ModelId) -> Self {
        ThroughModel::Model(id)
    }
}

/// Join model options for many-to-many associations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughOptions {
    pub model: ThroughModel,
    /// Both keys form a composite unique constraint (when the join model keeps
    /// its own primary key)
    pub unique: bool,
    /// Name of that constraint
    pub unique_key: Option<String>,
    /// Written on inserted join rows and matched on deletes and reads
    pub scope: Vec<WhereCondition>,
}

impl ThroughOptions {
    pub fn new(model: impl Into<ThroughModel>) -> Self {
        Self {
            model: model.into(),
            unique: true,
            unique_key: None,
            scope: Vec::new(),
        }
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    pub fn unique_key(mut self, name: impl Into<String>) -> Self {
        self.unique_key = Some(name.into());
        self
    }

    pub fn scope(mut self, condition: WhereCondition) -> Self {
        self.scope.push(condition);
        self
    }
}

impl From<&str> for ThroughOptions {
    fn from(name: &str) -> Self {
        ThroughOptions::new(name)
    }
}

impl From<ModelId> for ThroughOptions {
    fn from(id: ModelId) -> Self {
        ThroughOptions::new(id)
    }
}

/// Options accepted by every association kind. Options a kind does not use
/// are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssociationOptions {
    pub alias: Option<Alias>,
    pub foreign_key: Option<ForeignKey>,
    /// Attribute on the source the key references (HasOne, HasMany,
    /// BelongsToMany)
    pub source_key: Option<String>,
    /// Attribute on the target the key references (BelongsTo, BelongsToMany)
    pub target_key: Option<String>,
    /// Key pointing at the target on the join model
    pub other_key: Option<ForeignKey>,
    pub through: Option<ThroughOptions>,
    /// Static predicate on the target, applied to reads and writes
    pub scope: Vec<WhereCondition>,
    /// Overrides the registry-wide constraints setting
    pub constraints: Option<bool>,
    pub on_delete: Option<ReferentialAction>,
    pub on_update: Option<ReferentialAction>,
    /// Column type of the key, inferred from the referenced key otherwise
    pub key_type: Option<DataType>,
}

impl AssociationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alias(mut self, alias: impl Into<Alias>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn foreign_key(mut self, foreign_key: impl Into<ForeignKey>) -> Self {
        self.foreign_key = Some(foreign_key.into());
        self
    }

    pub fn source_key(mut self, key: impl Into<String>) -> Self {
        self.source_key = Some(key.into());
        self
    }

    pub fn target_key(mut self, key: impl Into<String>) -> Self {
        self.target_key = Some(key.into());
        self
    }

    pub fn other_key(mut self, other_key: impl Into<ForeignKey>) -> Self {
        self.other_key = Some(other_key.into());
        self
    }

    pub fn through(mut self, through: impl Into<ThroughOptions>) -> Self {
        self.through = Some(through.into());
        self
    }

    pub fn scope(mut self, condition: WhereCondition) -> Self {
        self.scope.push(condition);
        self
    }

    pub fn constraints(mut self, enabled: bool) -> Self {
        self.constraints = Some(enabled);
        self
    }

    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = Some(action);
        self
    }

    pub fn on_update(mut self, action: ReferentialAction) -> Self {
        self.on_update = Some(action);
        self
    }

    pub fn key_type(mut self, data_type: DataType) -> Self {
        self.key_type = Some(data_type);
        self
    }
}
