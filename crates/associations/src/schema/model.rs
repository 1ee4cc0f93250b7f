//! Model definitions - per-type schema and association map

use serde::{Deserialize, Serialize};
use std::fmt;

use super::attribute::{AttributeDef, AttributeMap};
use crate::associations::naming::Name;
use crate::associations::registry::AssociationRegistry;

/// Immutable identity of a model type. Ids are only meaningful for the
/// registry that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelId(usize);

impl ModelId {
    pub fn from_index(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Options accepted when defining a model
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelOptions {
    /// Table name, defaults to the plural model name
    pub table_name: Option<String>,
    /// Singular/plural names, derived from the model name by default
    pub name: Option<Name>,
    /// snake_case column names for generated keys
    pub underscored: Option<bool>,
    /// Use the model name as table name verbatim
    pub freeze_table_name: bool,
}

impl ModelOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    pub fn name(mut self, name: Name) -> Self {
        self.name = Some(name);
        self
    }

    pub fn underscored(mut self, underscored: bool) -> Self {
        self.underscored = Some(underscored);
        self
    }

    pub fn freeze_table_name(mut self) -> Self {
        self.freeze_table_name = true;
        self
    }
}

/// A defined model: schema plus the associations it owns
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDefinition {
    pub id: ModelId,
    pub name: String,
    pub table_name: String,
    pub names: Name,
    pub underscored: bool,
    pub raw_attributes: AttributeMap,
    pub associations: AssociationRegistry,
}

impl ModelDefinition {
    pub(crate) fn new(
        id: ModelId,
        name: &str,
        mut raw_attributes: AttributeMap,
        options: ModelOptions,
        default_underscored: bool,
    ) -> Self {
        let names = options.name.unwrap_or_else(|| Name::from_word(name));
        let table_name = match options.table_name {
            Some(table_name) => table_name,
            None if options.freeze_table_name => name.to_string(),
            None => names.plural.clone(),
        };

        if raw_attributes.primary_keys().is_empty() {
            raw_attributes.insert_first("id", AttributeDef::auto_primary_key());
        }

        Self {
            id,
            name: name.to_string(),
            table_name,
            names,
            underscored: options.underscored.unwrap_or(default_underscored),
            raw_attributes,
            associations: AssociationRegistry::new(name),
        }
    }

    /// The first primary key attribute
    pub fn primary_key_attribute(&self) -> Option<&str> {
        self.raw_attributes
            .iter()
            .find(|(_, def)| def.is_primary_key())
            .map(|(name, _)| name)
    }

    /// Primary key attribute, falling back to `id` for models whose key was
    /// removed (join models keyed by their foreign keys)
    pub fn primary_key_or_id(&self) -> &str {
        self.primary_key_attribute().unwrap_or("id")
    }

    /// All primary key attributes (more than one for composite keys)
    pub fn primary_key_attributes(&self) -> Vec<String> {
        self.raw_attributes.primary_keys()
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.raw_attributes.contains(name)
    }

    /// Column name of an attribute
    pub fn field_name<'a>(&'a self, attribute: &'a str) -> &'a str {
        self.raw_attributes.field_name(attribute)
    }

    pub fn has_alias(&self, alias: &str) -> bool {
        self.associations.contains(alias)
    }
}
