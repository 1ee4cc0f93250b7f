//! Records - typed attribute maps tagged with the id of the model they belong to

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::schema::ModelId;

/// Raw attribute map as exchanged with the executor
pub type Row = Map<String, Value>;

/// Hashable form of a key value, used to group rows by key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Key {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
}

impl Key {
    pub fn is_null(&self) -> bool {
        matches!(self, Key::Null)
    }

    pub fn to_value(&self) -> Value {
        match self {
            Key::Null => Value::Null,
            Key::Bool(b) => Value::Bool(*b),
            Key::Int(i) => Value::from(*i),
            Key::Text(s) => Value::String(s.clone()),
        }
    }
}

impl From<&Value> for Key {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Key::Null,
            Value::Bool(b) => Key::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Key::Int(i),
                None => match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Key::Int(f as i64),
                    _ => Key::Text(n.to_string()),
                },
            },
            Value::String(s) => Key::Text(s.clone()),
            other => Key::Text(other.to_string()),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Null => write!(f, "NULL"),
            Key::Bool(b) => write!(f, "{}", b),
            Key::Int(i) => write!(f, "{}", i),
            Key::Text(s) => write!(f, "{}", s),
        }
    }
}

/// A persisted or to-be-persisted row of a known model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    model: ModelId,
    values: Row,
}

impl Record {
    pub fn new(model: ModelId, values: Row) -> Self {
        Self { model, values }
    }

    /// Build a record from a JSON object; anything else yields an empty record
    pub fn from_json(model: ModelId, value: Value) -> Self {
        match value {
            Value::Object(values) => Self { model, values },
            _ => Self {
                model,
                values: Row::new(),
            },
        }
    }

    pub fn model(&self) -> ModelId {
        self.model
    }

    /// Tagged identity check, used instead of inspecting runtime types
    pub fn is_a(&self, model: ModelId) -> bool {
        self.model == model
    }

    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.values.get(attribute)
    }

    /// Attribute value, `Null` when absent
    pub fn value(&self, attribute: &str) -> Value {
        self.values.get(attribute).cloned().unwrap_or(Value::Null)
    }

    pub fn key(&self, attribute: &str) -> Key {
        self.values
            .get(attribute)
            .map(Key::from)
            .unwrap_or(Key::Null)
    }

    pub fn set(&mut self, attribute: impl Into<String>, value: Value) {
        self.values.insert(attribute.into(), value);
    }

    pub fn values(&self) -> &Row {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut Row {
        &mut self.values
    }

    pub fn into_values(self) -> Row {
        self.values
    }
}
