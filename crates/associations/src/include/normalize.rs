//! Include normalization - resolve every include to exactly one association
//! and fill defaults before planning

use std::collections::HashSet;
use tracing::{debug, warn};

use super::spec::{Include, IncludeTarget, ThroughInclude};
use crate::associations::descriptor::Association;
use crate::associations::kind::AssociationKind;
use crate::error::{AssociationError, AssociationResult};
use crate::plan::node::{IncludeNode, JoinRole, ThroughNode};
use crate::query::types::JoinType;
use crate::schema::{ModelId, ModelRegistry};

/// Resolves caller includes against the model registry
pub struct IncludeNormalizer<'a> {
    registry: &'a ModelRegistry,
    max_depth: usize,
}

impl<'a> IncludeNormalizer<'a> {
    pub fn new(registry: &'a ModelRegistry) -> Self {
        Self {
            registry,
            max_depth: registry.config().max_include_depth,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Normalize the includes of a query on `model`
    pub fn normalize(&self, model: ModelId, includes: &[Include]) -> AssociationResult<Vec<IncludeNode>> {
        let mut visited = HashSet::new();
        visited.insert(model);
        self.normalize_level(model, includes, 1, &visited)
    }

    fn normalize_level(
        &self,
        parent: ModelId,
        includes: &[Include],
        depth: usize,
        visited: &HashSet<ModelId>,
    ) -> AssociationResult<Vec<IncludeNode>> {
        if includes.is_empty() {
            return Ok(Vec::new());
        }
        if depth > self.max_depth {
            return Err(AssociationError::InvalidInclude(format!(
                "include tree on {} is deeper than {} levels",
                self.registry.name_of(parent),
                self.max_depth
            )));
        }

        let expanded = self.expand_all(parent, includes, visited)?;
        let mut resolved: Vec<(Association, Include)> = Vec::new();
        for include in expanded {
            let association = self.resolve(parent, &include)?;
            match resolved
                .iter_mut()
                .find(|(existing, _)| existing.alias == association.alias)
            {
                Some((_, existing)) => merge(existing, include, &association.alias),
                None => resolved.push((association, include)),
            }
        }

        resolved
            .into_iter()
            .map(|(association, include)| self.build_node(association, include, depth, visited))
            .collect()
    }

    /// Replace `all` includes with one include per association
    fn expand_all(
        &self,
        parent: ModelId,
        includes: &[Include],
        visited: &HashSet<ModelId>,
    ) -> AssociationResult<Vec<Include>> {
        let model = self.registry.model(parent)?;
        let mut expanded = Vec::new();
        for include in includes {
            let IncludeTarget::All { kind, nested } = include.target else {
                expanded.push(include.clone());
                continue;
            };
            for association in model.associations.iter() {
                if kind.is_some_and(|kind| kind != association.kind) {
                    continue;
                }
                let mut child = include.clone();
                child.target = IncludeTarget::Association(association.reference());
                if nested && !visited.contains(&association.target) {
                    child.children.push(include.clone());
                }
                expanded.push(child);
            }
        }
        Ok(expanded)
    }

    fn resolve(&self, parent: ModelId, include: &Include) -> AssociationResult<Association> {
        let model = self.registry.model(parent)?;
        let ambiguous = |reason: String| AssociationError::AmbiguousInclude {
            model: model.name.clone(),
            reason,
        };

        let association = match &include.target {
            IncludeTarget::Association(reference) => {
                if reference.model != parent {
                    return Err(ambiguous(format!(
                        "association {} is not defined on {}",
                        reference.alias, model.name
                    )));
                }
                model.associations.get(&reference.alias)
            }
            IncludeTarget::Alias(alias) => model.associations.get(alias),
            IncludeTarget::ModelAs { model: target, alias } => {
                match model.associations.find(*target, Some(alias)).as_slice() {
                    [association] => Some(*association),
                    _ => {
                        return Err(ambiguous(format!(
                            "{} is not associated to {} as '{}'",
                            self.registry.name_of(*target),
                            model.name,
                            alias
                        )))
                    }
                }
            }
            IncludeTarget::Model(target) => {
                let plain = model.associations.find(*target, None);
                let candidates = if plain.is_empty() {
                    model.associations.to_target(*target)
                } else {
                    plain
                };
                match candidates.as_slice() {
                    [association] => Some(*association),
                    [] => {
                        return Err(ambiguous(format!(
                            "{} is not associated to {}",
                            self.registry.name_of(*target),
                            model.name
                        )))
                    }
                    several => {
                        let aliases: Vec<&str> =
                            several.iter().map(|a| a.alias.as_str()).collect();
                        return Err(ambiguous(format!(
                            "{} is associated to {} several times ({}); name an alias",
                            self.registry.name_of(*target),
                            model.name,
                            aliases.join(", ")
                        )));
                    }
                }
            }
            IncludeTarget::All { .. } => None,
        };

        association.cloned().ok_or_else(|| {
            ambiguous(match &include.target {
                IncludeTarget::Alias(alias) => format!("no association aliased '{}'", alias),
                _ => "include does not name an association".to_string(),
            })
        })
    }

    fn build_node(
        &self,
        association: Association,
        include: Include,
        depth: usize,
        visited: &HashSet<ModelId>,
    ) -> AssociationResult<IncludeNode> {
        let target = self.registry.model(association.target)?;

        let mut separate = include.separate;
        if include.limit.is_some() {
            if association.kind != AssociationKind::HasMany {
                return Err(AssociationError::InvalidInclude(format!(
                    "limit on include {} requires a HasMany association",
                    association.alias
                )));
            }
            separate.get_or_insert(true);
        }
        let separate = separate.unwrap_or(false);
        if separate && association.kind != AssociationKind::HasMany {
            return Err(AssociationError::InvalidInclude(format!(
                "only HasMany associations support separate, {} is {}",
                association.alias, association.kind
            )));
        }

        let through = match (&association.through, association.kind) {
            (Some(through), AssociationKind::BelongsToMany) => {
                let join = self.registry.model(through.model)?;
                let ThroughInclude {
                    mut conditions,
                    attributes,
                } = include.through.clone().unwrap_or_default();
                conditions.extend(through.scope.iter().cloned());
                Some(ThroughNode {
                    model: through.model,
                    table: join.table_name.clone(),
                    name: through.name.clone(),
                    conditions,
                    attributes,
                })
            }
            _ => None,
        };

        let through_has_where = include
            .through
            .as_ref()
            .is_some_and(|through| !through.conditions.is_empty());
        let required =
            include.required.unwrap_or(!include.conditions.is_empty()) || through_has_where;

        let mut conditions = include.conditions.clone();
        conditions.extend(association.scope.iter().cloned());

        let mut attributes = include.attributes.clone();
        let primary_key = target.primary_key_or_id().to_string();
        if let Some(attributes) = attributes.as_mut() {
            if !attributes.contains(&primary_key) {
                attributes.insert(0, primary_key.clone());
            }
        }
        if separate {
            // The separate fetch is keyed by these
            if let Some(attributes) = attributes.as_mut() {
                if !attributes.contains(&association.foreign_key) {
                    attributes.push(association.foreign_key.clone());
                }
            }
        }

        let mut child_visited = visited.clone();
        child_visited.insert(association.target);
        let children =
            self.normalize_level(association.target, &include.children, depth + 1, &child_visited)?;
        add_parent_keys(&mut attributes, &children);

        debug!(
            "Resolved include {} ({} -> {}), required: {}, separate: {}",
            association.alias,
            self.registry.name_of(association.source),
            target.name,
            required,
            separate
        );

        Ok(IncludeNode {
            alias: association.alias.clone(),
            model: association.target,
            table: target.table_name.clone(),
            primary_key,
            attributes,
            conditions,
            order: include.order.clone(),
            limit: include.limit,
            required,
            separate,
            through,
            children,
            explicit_duplicating: include.duplicating,
            explicit_sub_query: include.sub_query,
            duplicating: false,
            sub_query: false,
            sub_query_filter: false,
            has_required: false,
            has_duplicating: false,
            has_where: false,
            has_parent_where: false,
            has_parent_required: false,
            join: JoinType::Left,
            role: JoinRole::Select,
            association,
        })
    }
}

/// Make sure a restricted attribute list still carries the keys separate
/// children are fetched by
pub(crate) fn add_parent_keys(attributes: &mut Option<Vec<String>>, children: &[IncludeNode]) {
    let Some(attributes) = attributes.as_mut() else {
        return;
    };
    for child in children.iter().filter(|child| child.separate) {
        let key = child.association.source_key.clone();
        if !attributes.contains(&key) {
            attributes.push(key);
        }
    }
}

/// Fold a second include of the same association into the first
fn merge(existing: &mut Include, duplicate: Include, alias: &str) {
    warn!("Include {} given more than once; merging", alias);
    existing.required = match (existing.required, duplicate.required) {
        (Some(a), Some(b)) => Some(a || b),
        (a, b) => a.or(b),
    };
    existing.conditions.extend(duplicate.conditions);
    existing.children.extend(duplicate.children);
    if existing.attributes.is_none() {
        existing.attributes = duplicate.attributes;
    }
    if existing.limit.is_none() {
        existing.limit = duplicate.limit;
    }
    if existing.separate.is_none() {
        existing.separate = duplicate.separate;
    }
    if existing.duplicating.is_none() {
        existing.duplicating = duplicate.duplicating;
    }
    if existing.sub_query.is_none() {
        existing.sub_query = duplicate.sub_query;
    }
    if existing.order.is_empty() {
        existing.order = duplicate.order;
    }
    match (&mut existing.through, duplicate.through) {
        (Some(through), Some(other)) => {
            through.conditions.extend(other.conditions);
            if through.attributes.is_none() {
                through.attributes = other.attributes;
            }
        }
        (slot @ None, other) => *slot = other,
        _ => {}
    }
}
