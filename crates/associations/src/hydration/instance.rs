//! Instances - records together with their loaded associations

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::plan::node::IncludeNode;
use crate::record::{Key, Record, Row};
use crate::schema::ModelId;

/// Loaded value of one association on an instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Loaded {
    One(Option<Box<Instance>>),
    Many(Vec<Instance>),
}

impl Loaded {
    /// Empty value for a collection or single association
    pub fn empty(multi: bool) -> Self {
        if multi {
            Loaded::Many(Vec::new())
        } else {
            Loaded::One(None)
        }
    }

    pub fn one(&self) -> Option<&Instance> {
        match self {
            Loaded::One(instance) => instance.as_deref(),
            Loaded::Many(_) => None,
        }
    }

    pub fn many(&self) -> &[Instance] {
        match self {
            Loaded::Many(instances) => instances,
            Loaded::One(_) => &[],
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Loaded::One(instance) => usize::from(instance.is_some()),
            Loaded::Many(instances) => instances.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Instances held, in order
    pub fn instances(&self) -> Vec<&Instance> {
        match self {
            Loaded::One(instance) => instance.as_deref().into_iter().collect(),
            Loaded::Many(instances) => instances.iter().collect(),
        }
    }

    pub(crate) fn instances_mut(&mut self) -> Vec<&mut Instance> {
        match self {
            Loaded::One(instance) => instance.as_deref_mut().into_iter().collect(),
            Loaded::Many(instances) => instances.iter_mut().collect(),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Loaded::One(instance) => instance
                .as_ref()
                .map(|instance| instance.to_json())
                .unwrap_or(Value::Null),
            Loaded::Many(instances) => {
                Value::Array(instances.iter().map(Instance::to_json).collect())
            }
        }
    }
}

/// A record with eager-loaded associations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub record: Record,
    pub associations: HashMap<String, Loaded>,
    /// Join row attributes when loaded through a many-to-many association
    pub through: Option<Row>,
}

impl Instance {
    pub fn new(record: Record) -> Self {
        Self {
            record,
            associations: HashMap::new(),
            through: None,
        }
    }

    /// Instance whose included associations start out empty
    pub(crate) fn with_includes(record: Record, includes: &[IncludeNode]) -> Self {
        let mut instance = Self::new(record);
        for node in includes {
            instance
                .associations
                .insert(node.alias.clone(), Loaded::empty(node.is_multi()));
        }
        instance
    }

    pub fn model(&self) -> ModelId {
        self.record.model()
    }

    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.record.get(attribute)
    }

    pub fn key(&self, attribute: &str) -> Key {
        self.record.key(attribute)
    }

    pub fn loaded(&self, alias: &str) -> Option<&Loaded> {
        self.associations.get(alias)
    }

    /// Loaded collection, empty when not loaded
    pub fn many(&self, alias: &str) -> &[Instance] {
        self.associations.get(alias).map(Loaded::many).unwrap_or(&[])
    }

    pub fn one(&self, alias: &str) -> Option<&Instance> {
        self.associations.get(alias).and_then(Loaded::one)
    }

    /// Nested JSON: attributes, then one key per loaded association
    pub fn to_json(&self) -> Value {
        let mut object = self.record.values().clone();
        let mut aliases: Vec<&String> = self.associations.keys().collect();
        aliases.sort();
        for alias in aliases {
            object.insert(alias.clone(), self.associations[alias].to_json());
        }
        if let Some(through) = &self.through {
            object.insert("through".to_string(), Value::Object(through.clone()));
        }
        Value::Object(object)
    }
}

/// Visit the instances reached by following `path` (a list of aliases)
/// from each of `roots`
pub(crate) fn visit_path_mut(roots: &mut [Instance], path: &[String], visit: &mut dyn FnMut(&mut Instance)) {
    for root in roots.iter_mut() {
        visit_one(root, path, visit);
    }
}

fn visit_one(instance: &mut Instance, path: &[String], visit: &mut dyn FnMut(&mut Instance)) {
    let Some((alias, rest)) = path.split_first() else {
        visit(instance);
        return;
    };
    if let Some(loaded) = instance.associations.get_mut(alias) {
        for child in loaded.instances_mut() {
            visit_one(child, rest, visit);
        }
    }
}
