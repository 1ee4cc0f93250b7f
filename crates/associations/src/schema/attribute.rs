//! Attribute definitions and the ordered attribute map owned by each model

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Column data types understood by the mapping layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Integer,
    BigInt,
    Uuid,
    String,
    Text,
    Boolean,
    Float,
    Date,
    Json,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Integer => "INTEGER",
            DataType::BigInt => "BIGINT",
            DataType::Uuid => "UUID",
            DataType::String => "VARCHAR(255)",
            DataType::Text => "TEXT",
            DataType::Boolean => "BOOLEAN",
            DataType::Float => "FLOAT",
            DataType::Date => "TIMESTAMP WITH TIME ZONE",
            DataType::Json => "JSON",
        };
        write!(f, "{}", name)
    }
}

/// ON DELETE / ON UPDATE behaviour of a foreign key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferentialAction {
    Cascade,
    SetNull,
    NoAction,
    Restrict,
    SetDefault,
}

impl ReferentialAction {
    /// Convert the action to its SQL representation
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::SetDefault => "SET DEFAULT",
        }
    }
}

/// Target of a REFERENCES clause
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct References {
    pub table: String,
    pub key: String,
}

/// Uniqueness of a column: alone, or as part of a named composite constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UniqueKey {
    Single,
    Composite(String),
}

/// A column definition. Every field is optional so that definitions can be
/// merged as defaults without losing what the user already declared.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeDef {
    pub data_type: Option<DataType>,
    pub allow_null: Option<bool>,
    pub primary_key: Option<bool>,
    pub auto_increment: Option<bool>,
    pub unique: Option<UniqueKey>,
    pub default_value: Option<Value>,
    /// Column name when it differs from the attribute name
    pub field: Option<String>,
    pub references: Option<References>,
    pub on_delete: Option<ReferentialAction>,
    pub on_update: Option<ReferentialAction>,
    /// Set for attributes the registry added on its own (the implicit `id`)
    #[serde(default)]
    pub auto_generated: bool,
}

impl AttributeDef {
    pub fn new(data_type: DataType) -> Self {
        Self {
            data_type: Some(data_type),
            ..Self::default()
        }
    }

    /// The implicit auto-increment primary key added to models without one
    pub fn auto_primary_key() -> Self {
        Self {
            data_type: Some(DataType::Integer),
            allow_null: Some(false),
            primary_key: Some(true),
            auto_increment: Some(true),
            auto_generated: true,
            ..Self::default()
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = Some(true);
        self.allow_null = Some(false);
        self
    }

    pub fn not_null(mut self) -> Self {
        self.allow_null = Some(false);
        self
    }

    pub fn nullable(mut self, allow_null: bool) -> Self {
        self.allow_null = Some(allow_null);
        self
    }

    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = Some(UniqueKey::Single);
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default_value = Some(value);
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

    pub fn is_primary_key(&self) -> bool {
        self.primary_key.unwrap_or(false)
    }

    /// Columns are nullable unless declared otherwise
    pub fn is_nullable(&self) -> bool {
        self.allow_null.unwrap_or(true)
    }

    /// Fill every unset field from `defaults`; fields already set win
    pub fn merge_defaults(&mut self, defaults: &AttributeDef) {
        fn fill<T: Clone>(slot: &mut Option<T>, default: &Option<T>) {
            if slot.is_none() {
                slot.clone_from(default);
            }
        }

        fill(&mut self.data_type, &defaults.data_type);
        fill(&mut self.allow_null, &defaults.allow_null);
        fill(&mut self.primary_key, &defaults.primary_key);
        fill(&mut self.auto_increment, &defaults.auto_increment);
        fill(&mut self.unique, &defaults.unique);
        fill(&mut self.default_value, &defaults.default_value);
        fill(&mut self.field, &defaults.field);
        fill(&mut self.references, &defaults.references);
        fill(&mut self.on_delete, &defaults.on_delete);
        fill(&mut self.on_update, &defaults.on_update);
    }

    /// Overwrite fields with every field `other` sets
    pub fn assign(&mut self, other: &AttributeDef) {
        fn put<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                slot.clone_from(value);
            }
        }

        put(&mut self.data_type, &other.data_type);
        put(&mut self.allow_null, &other.allow_null);
        put(&mut self.primary_key, &other.primary_key);
        put(&mut self.auto_increment, &other.auto_increment);
        put(&mut self.unique, &other.unique);
        put(&mut self.default_value, &other.default_value);
        put(&mut self.field, &other.field);
        put(&mut self.references, &other.references);
        put(&mut self.on_delete, &other.on_delete);
        put(&mut self.on_update, &other.on_update);
    }
}

/// Attribute definitions in declaration order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeMap {
    entries: Vec<(String, AttributeDef)>,
}

impl AttributeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|(existing, _)| existing == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&AttributeDef> {
        self.position(name).map(|idx| &self.entries[idx].1)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut AttributeDef> {
        let idx = self.position(name)?;
        Some(&mut self.entries[idx].1)
    }

    /// Insert or replace, keeping the original position on replace
    pub fn insert(&mut self, name: impl Into<String>, def: AttributeDef) {
        let name = name.into();
        match self.position(&name) {
            Some(idx) => self.entries[idx].1 = def,
            None => self.entries.push((name, def)),
        }
    }

    /// Insert at the front (used for the implicit primary key)
    pub fn insert_first(&mut self, name: impl Into<String>, def: AttributeDef) {
        let name = name.into();
        if let Some(idx) = self.position(&name) {
            self.entries.remove(idx);
        }
        self.entries.insert(0, (name, def));
    }

    /// Get the definition for `name`, creating an empty one if missing
    pub fn entry(&mut self, name: &str) -> &mut AttributeDef {
        let idx = match self.position(name) {
            Some(idx) => idx,
            None => {
                self.entries.push((name.to_string(), AttributeDef::default()));
                self.entries.len() - 1
            }
        };
        &mut self.entries[idx].1
    }

    pub fn remove(&mut self, name: &str) -> Option<AttributeDef> {
        let idx = self.position(name)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeDef)> {
        self.entries.iter().map(|(name, def)| (name.as_str(), def))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut AttributeDef)> {
        self.entries
            .iter_mut()
            .map(|(name, def)| (name.as_str(), def))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Names of all attributes flagged as primary key
    pub fn primary_keys(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, def)| def.is_primary_key())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Column name for an attribute, falling back to the attribute name
    pub fn field_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.get(name)
            .and_then(|def| def.field.as_deref())
            .unwrap_or(name)
    }
}

impl<S: Into<String>> FromIterator<(S, AttributeDef)> for AttributeMap {
    fn from_iter<I: IntoIterator<Item = (S, AttributeDef)>>(iter: I) -> Self {
        let mut map = AttributeMap::new();
        for (name, def) in iter {
            map.insert(name, def);
        }
        map
    }
}
