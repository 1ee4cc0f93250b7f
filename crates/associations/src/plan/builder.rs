//! Query plan builder - turns find options into a `SelectPlan`, deciding
//! join types and where the sub-query boundary falls

use tracing::debug;

use super::grouped_limit::GroupedLimit;
use super::node::{IncludeNode, SelectPlan};
use crate::error::AssociationResult;
use crate::include::normalize::{add_parent_keys, IncludeNormalizer};
use crate::include::Include;
use crate::query::types::{JoinType, OrderBy, WhereCondition};
use crate::schema::{ModelId, ModelRegistry};

/// Options of a find over one model
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub conditions: Vec<WhereCondition>,
    pub attributes: Option<Vec<String>>,
    pub order: Vec<OrderBy>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub include: Vec<Include>,
    /// `Some(false)` keeps every include in one joined statement even when
    /// the statement is limited
    pub sub_query: Option<bool>,
    pub grouped_limit: Option<GroupedLimit>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, condition: WhereCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = Some(attributes.into_iter().map(Into::into).collect());
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order.push(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn include(mut self, include: impl Into<Include>) -> Self {
        self.include.push(include.into());
        self
    }

    pub fn sub_query(mut self, sub_query: bool) -> Self {
        self.sub_query = Some(sub_query);
        self
    }

    pub fn grouped_limit(mut self, grouped_limit: GroupedLimit) -> Self {
        self.grouped_limit = Some(grouped_limit);
        self
    }

    fn is_top_limited(&self) -> bool {
        self.grouped_limit.is_none() && (self.limit.is_some() || self.offset.is_some())
    }
}

/// Builds select plans against a registry
pub struct PlanBuilder<'a> {
    registry: &'a ModelRegistry,
}

impl<'a> PlanBuilder<'a> {
    pub fn new(registry: &'a ModelRegistry) -> Self {
        Self { registry }
    }

    pub fn build(&self, model: ModelId, options: &FindOptions) -> AssociationResult<SelectPlan> {
        let definition = self.registry.model(model)?;
        let mut includes = IncludeNormalizer::new(self.registry).normalize(model, &options.include)?;

        for node in &mut includes {
            analyze_subtree(node);
        }
        let top_limited = options.is_top_limited();
        analyze_children(&mut includes, false, false, top_limited);

        let sub_query = match options.sub_query {
            Some(false) => false,
            Some(true) => top_limited,
            None => {
                top_limited
                    && includes
                        .iter()
                        .any(|node| node.sub_query || node.has_duplicating)
            }
        };

        let primary_key = definition.primary_key_or_id().to_string();
        let mut attributes = options.attributes.clone();
        if !includes.is_empty() {
            if let Some(attributes) = attributes.as_mut() {
                if !attributes.contains(&primary_key) {
                    attributes.insert(0, primary_key.clone());
                }
            }
        }
        add_parent_keys(&mut attributes, &includes);

        debug!(
            "Planned find on {}: {} include(s), sub-query boundary: {}",
            definition.name,
            includes.len(),
            sub_query
        );

        let mut plan = SelectPlan::new(model, definition.table_name.clone(), primary_key);
        plan.attributes = attributes;
        plan.conditions = options.conditions.clone();
        plan.order = options.order.clone();
        plan.limit = options.limit;
        plan.offset = options.offset;
        plan.grouped_limit = options.grouped_limit.clone();
        plan.sub_query = sub_query;
        plan.includes = includes;
        Ok(plan)
    }
}

/// Bottom-up pass: own and descendant flags
fn analyze_subtree(node: &mut IncludeNode) {
    for child in &mut node.children {
        analyze_subtree(child);
    }

    node.duplicating = !node.separate && node.explicit_duplicating.unwrap_or_else(|| node.is_multi());
    let joined_children = node.children.iter().filter(|child| !child.separate);
    let (mut child_duplicating, mut child_required, mut child_where) = (false, false, false);
    for child in joined_children {
        child_duplicating |= child.has_duplicating;
        child_required |= child.has_required;
        child_where |= child.has_where;
    }

    node.has_duplicating = node.duplicating || child_duplicating;
    node.has_required = node.required || child_required;
    node.has_where = !node.conditions.is_empty() || child_where;
}

/// Top-down pass over the children of one parent: parent flags, sub-query
/// placement and join types
fn analyze_children(children: &mut [IncludeNode], parent_required: bool, parent_where: bool, top_limited: bool) {
    let siblings_duplicating = children
        .iter()
        .any(|child| !child.separate && child.has_duplicating);

    for node in children.iter_mut() {
        node.has_parent_required = parent_required;
        node.has_parent_where = parent_where;

        if node.separate {
            node.sub_query = false;
            node.sub_query_filter = false;
        } else if node.explicit_sub_query != Some(false) && siblings_duplicating && top_limited {
            if node.duplicating {
                node.sub_query = node.explicit_sub_query.unwrap_or(false);
                node.sub_query_filter = node.has_required;
            } else {
                node.sub_query = node.has_required;
                node.sub_query_filter = false;
            }
        } else {
            node.sub_query = node.explicit_sub_query.unwrap_or(false);
            if node.duplicating {
                node.sub_query_filter = node.sub_query;
            } else {
                node.sub_query_filter = false;
                node.sub_query =
                    node.sub_query || (node.has_parent_required && node.has_required);
            }
        }

        node.join = if node.required {
            JoinType::Inner
        } else {
            JoinType::Left
        };

        let (required, has_where) = (
            parent_required || node.required,
            parent_where || !node.conditions.is_empty(),
        );
        analyze_children(&mut node.children, required, has_where, top_limited);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::associations::options::AssociationOptions;
    use crate::plan::node::JoinRole;
    use crate::schema::attribute::{AttributeDef, DataType};
    use crate::schema::ModelOptions;
    use serde_json::json;

    struct Teams {
        registry: ModelRegistry,
        team: ModelId,
    }

    /// Team -> Members (HasMany) -> Clearance (HasOne); Team -> Coach (BelongsTo)
    fn teams() -> Teams {
        let mut registry = ModelRegistry::new();
        let team = registry
            .define(
                "Team",
                vec![("name", AttributeDef::new(DataType::String))],
                ModelOptions::default(),
            )
            .unwrap();
        let member = registry
            .define(
                "Member",
                vec![("name", AttributeDef::new(DataType::String))],
                ModelOptions::default(),
            )
            .unwrap();
        let clearance = registry
            .define(
                "Clearance",
                vec![("level", AttributeDef::new(DataType::Integer))],
                ModelOptions::default(),
            )
            .unwrap();
        let coach = registry
            .define("Coach", Vec::<(&str, AttributeDef)>::new(), ModelOptions::default())
            .unwrap();
        registry
            .has_many(team, member, AssociationOptions::new().alias("Members"))
            .unwrap();
        registry.has_one(member, clearance, AssociationOptions::new()).unwrap();
        registry.belongs_to(team, coach, AssociationOptions::new()).unwrap();
        Teams { registry, team }
    }

    fn members_with_required_clearance() -> Include {
        Include::alias("Members").include(Include::alias("Clearance").required(true))
    }

    #[test]
    fn test_required_does_not_ripple_past_optional_parent() {
        let t = teams();
        let plan = PlanBuilder::new(&t.registry)
            .build(t.team, &FindOptions::new().include(members_with_required_clearance()))
            .unwrap();

        let members = plan.include("Members").unwrap();
        let clearance = members.child("Clearance").unwrap();
        assert!(!members.required);
        assert_eq!(members.join, JoinType::Left);
        assert!(members.has_required);
        assert_eq!(clearance.join, JoinType::Inner);
        assert!(!clearance.has_parent_required);
        assert!(!clearance.sub_query);
        assert!(!plan.sub_query);
    }

    #[test]
    fn test_limited_find_with_duplicating_include_uses_sub_query() {
        let t = teams();
        let plan = PlanBuilder::new(&t.registry)
            .build(
                t.team,
                &FindOptions::new()
                    .include(members_with_required_clearance())
                    .include("Coach")
                    .limit(10),
            )
            .unwrap();

        assert!(plan.sub_query);
        let members = plan.include("Members").unwrap();
        assert!(members.duplicating);
        assert!(!members.sub_query);
        assert!(members.sub_query_filter);

        let coach = plan.include("Coach").unwrap();
        assert!(!coach.duplicating);
        assert!(!coach.sub_query);

        // Members is optional, so the outer statement selects the coach only
        let outer = plan.outer_statement();
        let aliases: Vec<&str> = outer.includes.iter().map(|n| n.alias.as_str()).collect();
        assert_eq!(aliases, vec!["Coach"]);

        let second = plan.second_pass(vec![json!(1), json!(2)]);
        assert_eq!(second.limit, None);
        assert_eq!(second.conditions, vec![WhereCondition::in_list("id", vec![json!(1), json!(2)])]);
        assert_eq!(second.includes.len(), 1);
        assert_eq!(second.includes[0].alias, "Members");
        assert_eq!(second.includes[0].children[0].alias, "Clearance");
    }

    #[test]
    fn test_required_duplicating_include_filters_outer_statement() {
        let t = teams();
        let plan = PlanBuilder::new(&t.registry)
            .build(
                t.team,
                &FindOptions::new()
                    .include(Include::alias("Members").filter(WhereCondition::eq("name", "ada")))
                    .limit(5),
            )
            .unwrap();

        let members = plan.include("Members").unwrap();
        assert!(members.required);
        assert!(members.sub_query_filter);
        let outer = plan.outer_statement();
        assert_eq!(outer.includes.len(), 1);
        assert_eq!(outer.includes[0].role, JoinRole::Filter);
    }

    #[test]
    fn test_required_parent_alone_does_not_make_a_filter() {
        let mut t = teams();
        let coach = t.registry.lookup("Coach").unwrap();
        let certificate = t
            .registry
            .define("Certificate", Vec::<(&str, AttributeDef)>::new(), ModelOptions::default())
            .unwrap();
        t.registry
            .has_many(coach, certificate, AssociationOptions::new())
            .unwrap();

        let plan = PlanBuilder::new(&t.registry)
            .build(
                t.team,
                &FindOptions::new()
                    .include(Include::alias("Coach").required(true).include("Certificates"))
                    .limit(5),
            )
            .unwrap();

        assert!(plan.sub_query);
        let coach = plan.include("Coach").unwrap();
        assert!(coach.sub_query);
        let certificates = coach.child("Certificates").unwrap();
        assert!(certificates.duplicating);
        assert!(certificates.has_parent_required);
        assert!(!certificates.has_required);
        assert!(!certificates.sub_query_filter);

        let outer = plan.outer_statement();
        assert_eq!(outer.includes.len(), 1);
        assert!(outer.includes[0].children.is_empty());
    }

    #[test]
    fn test_sub_query_flag_properties() {
        let t = teams();
        let builder = PlanBuilder::new(&t.registry);

        // No limit: never a sub-query
        let plain = builder
            .build(t.team, &FindOptions::new().include("Members"))
            .unwrap();
        assert!(!plain.sub_query);

        // Limit without duplicating includes
        let single = builder
            .build(t.team, &FindOptions::new().include("Coach").limit(3))
            .unwrap();
        assert!(!single.sub_query);

        // Offset counts as a limit
        let offset = builder
            .build(t.team, &FindOptions::new().include("Members").offset(3))
            .unwrap();
        assert!(offset.sub_query);

        // Duplicating below a single association
        let deep = builder
            .build(
                t.team,
                &FindOptions::new()
                    .include(Include::alias("Coach"))
                    .include(Include::alias("Members").duplicating(false))
                    .limit(3),
            )
            .unwrap();
        assert!(!deep.sub_query);
        assert!(!deep.include("Members").unwrap().duplicating);

        let disabled = builder
            .build(t.team, &FindOptions::new().include("Members").limit(3).sub_query(false))
            .unwrap();
        assert!(!disabled.sub_query);
    }

    #[test]
    fn test_separate_includes_bypass_analysis() {
        let t = teams();
        let plan = PlanBuilder::new(&t.registry)
            .build(
                t.team,
                &FindOptions::new()
                    .attributes(["name"])
                    .include(Include::alias("Members").limit(2))
                    .limit(3),
            )
            .unwrap();

        let members = plan.include("Members").unwrap();
        assert!(members.separate);
        assert!(!members.duplicating);
        assert!(!plan.sub_query);
        assert_eq!(plan.attributes, Some(vec!["id".to_string(), "name".to_string()]));
        assert!(plan.joined_statement().includes.is_empty());

        let separate = plan.separate_includes();
        assert_eq!(separate.len(), 1);
        assert!(separate[0].0.is_empty());
        assert_eq!(separate[0].1.alias, "Members");
    }

    #[test]
    fn test_parent_flags_accumulate() {
        let t = teams();
        let plan = PlanBuilder::new(&t.registry)
            .build(
                t.team,
                &FindOptions::new().include(
                    Include::alias("Members")
                        .filter(WhereCondition::eq("name", "ada"))
                        .include(Include::alias("Clearance").required(true)),
                ),
            )
            .unwrap();

        let members = plan.include("Members").unwrap();
        let clearance = members.child("Clearance").unwrap();
        assert!(members.has_where);
        assert!(clearance.has_parent_where);
        assert!(clearance.has_parent_required);
        // Required below a required parent is pulled into the sub-query
        assert!(clearance.sub_query);
    }
}
