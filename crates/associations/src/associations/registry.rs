//! Association Registry - per-model alias -> descriptor storage

use super::descriptor::Association;
use crate::error::{AssociationError, AssociationResult, CollidesWith};
use crate::schema::ModelId;

/// Associations owned by a single source model, in declaration order.
/// `register` is the only way to add one.
#[derive(Debug, Clone, PartialEq)]
pub struct AssociationRegistry {
    model_name: String,
    entries: Vec<Association>,
}

impl AssociationRegistry {
    /// Create an empty registry for the named model
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            entries: Vec::new(),
        }
    }

    /// Register an association under its alias
    pub fn register(&mut self, association: Association) -> AssociationResult<()> {
        if self.contains(&association.alias) {
            return Err(AssociationError::AliasCollision {
                model: self.model_name.clone(),
                alias: association.alias.clone(),
                existing: CollidesWith::Association,
            });
        }
        self.entries.push(association);
        Ok(())
    }

    /// Get an association by alias
    pub fn get(&self, alias: &str) -> Option<&Association> {
        self.entries.iter().find(|a| a.alias == alias)
    }

    pub(crate) fn get_mut(&mut self, alias: &str) -> Option<&mut Association> {
        self.entries.iter_mut().find(|a| a.alias == alias)
    }

    /// Check if an alias is taken
    pub fn contains(&self, alias: &str) -> bool {
        self.get(alias).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Association> {
        self.entries.iter()
    }

    pub fn aliases(&self) -> Vec<&str> {
        self.entries.iter().map(|a| a.alias.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All associations pointing at `target`
    pub fn to_target(&self, target: ModelId) -> Vec<&Association> {
        self.entries.iter().filter(|a| a.target == target).collect()
    }

    /// Associations to `target` matching an include's alias request.
    ///
    /// An explicit alias must match exactly. Without one, only non-aliased
    /// associations qualify.
    pub fn find(&self, target: ModelId, alias: Option<&str>) -> Vec<&Association> {
        self.entries
            .iter()
            .filter(|a| a.target == target)
            .filter(|a| match alias {
                Some(alias) => a.alias == alias,
                None => !a.is_aliased,
            })
            .collect()
    }
}
