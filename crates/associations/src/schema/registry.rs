//! Model Registry - owns every model definition and hands out `ModelId`s

use std::collections::HashMap;
use tracing::debug;

use super::attribute::{AttributeDef, AttributeMap};
use super::model::{ModelDefinition, ModelId, ModelOptions};
use crate::associations::descriptor::{Association, AssociationRef};
use crate::config::AssociationConfig;
use crate::error::{AssociationError, AssociationResult};

/// In-process registry of model types and their associations.
///
/// Definition takes `&mut self`; planning and execution only ever need
/// `&ModelRegistry`.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: Vec<ModelDefinition>,
    by_name: HashMap<String, ModelId>,
    config: AssociationConfig,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with custom defaults
    pub fn with_config(config: AssociationConfig) -> AssociationResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::default()
        })
    }

    pub fn config(&self) -> &AssociationConfig {
        &self.config
    }

    /// Define a model. Names are unique per registry.
    pub fn define<I, S>(
        &mut self,
        name: &str,
        attributes: I,
        options: ModelOptions,
    ) -> AssociationResult<ModelId>
    where
        I: IntoIterator<Item = (S, AttributeDef)>,
        S: Into<String>,
    {
        if self.by_name.contains_key(name) {
            return Err(AssociationError::Configuration(format!(
                "model '{}' is already defined",
                name
            )));
        }

        let id = ModelId::from_index(self.models.len());
        let attributes: AttributeMap = attributes.into_iter().collect();
        let model = ModelDefinition::new(id, name, attributes, options, self.config.underscored);
        debug!(
            "Defined model {} ({}) on table {}",
            model.name, id, model.table_name
        );

        self.models.push(model);
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn lookup(&self, name: &str) -> Option<ModelId> {
        self.by_name.get(name).copied()
    }

    /// Resolve a model by name, failing for undefined names
    pub fn resolve(&self, name: &str) -> AssociationResult<ModelId> {
        self.lookup(name)
            .ok_or_else(|| AssociationError::UnknownModel(name.to_string()))
    }

    pub fn get(&self, id: ModelId) -> Option<&ModelDefinition> {
        self.models.get(id.index())
    }

    pub fn model(&self, id: ModelId) -> AssociationResult<&ModelDefinition> {
        self.get(id)
            .ok_or_else(|| AssociationError::UnknownModel(id.to_string()))
    }

    pub(crate) fn model_mut(&mut self, id: ModelId) -> AssociationResult<&mut ModelDefinition> {
        self.models
            .get_mut(id.index())
            .ok_or_else(|| AssociationError::UnknownModel(id.to_string()))
    }

    /// Name of a model, or its id when unknown
    pub fn name_of(&self, id: ModelId) -> String {
        self.get(id)
            .map(|model| model.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    /// Association registered under `alias` on `model`
    pub fn association_of(&self, model: ModelId, alias: &str) -> AssociationResult<&Association> {
        let definition = self.model(model)?;
        definition
            .associations
            .get(alias)
            .ok_or_else(|| AssociationError::AmbiguousInclude {
                model: definition.name.clone(),
                reason: format!("no association aliased '{}'", alias),
            })
    }

    pub fn association(&self, reference: &AssociationRef) -> AssociationResult<&Association> {
        self.association_of(reference.model, &reference.alias)
    }

    pub(crate) fn association_mut(
        &mut self,
        reference: &AssociationRef,
    ) -> AssociationResult<&mut Association> {
        let definition = self.model_mut(reference.model)?;
        let name = definition.name.clone();
        definition
            .associations
            .get_mut(&reference.alias)
            .ok_or_else(|| AssociationError::AmbiguousInclude {
                model: name,
                reason: format!("no association aliased '{}'", reference.alias),
            })
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelDefinition> {
        self.models.iter()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
