//! Plan nodes - resolved include trees and the statements built from them

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::grouped_limit::GroupedLimit;
use crate::associations::descriptor::Association;
use crate::query::types::{JoinType, OrderBy, WhereCondition};
use crate::schema::ModelId;

/// Separator between aliases in flat row keys (`Members->Clearance.level`)
pub const PATH_SEPARATOR: &str = "->";

/// How a joined node takes part in its statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinRole {
    /// Joined and selected
    Select,
    /// Only restricts which parent rows qualify; selects nothing
    Filter,
}

/// Join model step of a many-to-many include
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughNode {
    pub model: ModelId,
    pub table: String,
    /// Join model name, used as the row key segment for its columns
    pub name: String,
    pub conditions: Vec<WhereCondition>,
    pub attributes: Option<Vec<String>>,
}

/// A resolved include with the flags computed by the plan builder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncludeNode {
    pub association: Association,
    pub alias: String,
    pub model: ModelId,
    pub table: String,
    pub primary_key: String,
    pub attributes: Option<Vec<String>>,
    /// Own conditions plus the association scope
    pub conditions: Vec<WhereCondition>,
    pub order: Vec<OrderBy>,
    pub limit: Option<usize>,
    pub required: bool,
    pub separate: bool,
    pub through: Option<ThroughNode>,
    pub children: Vec<IncludeNode>,

    pub explicit_duplicating: Option<bool>,
    pub explicit_sub_query: Option<bool>,
    pub duplicating: bool,
    pub sub_query: bool,
    pub sub_query_filter: bool,
    pub has_required: bool,
    pub has_duplicating: bool,
    pub has_where: bool,
    pub has_parent_where: bool,
    pub has_parent_required: bool,
    pub join: JoinType,
    pub role: JoinRole,
}

impl IncludeNode {
    pub fn is_multi(&self) -> bool {
        self.association.is_multi()
    }

    pub fn child(&self, alias: &str) -> Option<&IncludeNode> {
        self.children.iter().find(|child| child.alias == alias)
    }

    /// Row key prefix of this node below `parent_path`
    pub fn path(&self, parent_path: Option<&str>) -> String {
        match parent_path {
            Some(parent) => format!("{}{}{}", parent, PATH_SEPARATOR, self.alias),
            None => self.alias.clone(),
        }
    }

    /// Attribute on the parent row this node joins on
    pub fn parent_attribute(&self) -> &str {
        self.association.source_attribute()
    }

    /// Copy of the node restricted to the subtree selected by `keep`
    pub(crate) fn prune(&self, keep: &dyn Fn(&IncludeNode) -> bool) -> Option<IncludeNode> {
        if !keep(self) {
            return None;
        }
        let mut node = self.clone();
        node.children = self
            .children
            .iter()
            .filter_map(|child| child.prune(keep))
            .collect();
        Some(node)
    }
}

/// One statement handed to the executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectPlan {
    pub model: ModelId,
    pub table: String,
    pub primary_key: String,
    pub attributes: Option<Vec<String>>,
    pub conditions: Vec<WhereCondition>,
    pub order: Vec<OrderBy>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    /// Per-group top-N instead of a plain limit
    pub grouped_limit: Option<GroupedLimit>,
    /// Duplicating includes are fetched in a second pass keyed by the
    /// primary keys of the limited outer statement
    pub sub_query: bool,
    pub includes: Vec<IncludeNode>,
}

impl SelectPlan {
    pub fn new(model: ModelId, table: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            model,
            table: table.into(),
            primary_key: primary_key.into(),
            attributes: None,
            conditions: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
            grouped_limit: None,
            sub_query: false,
            includes: Vec::new(),
        }
    }

    pub fn include(&self, alias: &str) -> Option<&IncludeNode> {
        self.includes.iter().find(|node| node.alias == alias)
    }

    /// Statement joining every non-separate include
    pub fn joined_statement(&self) -> SelectPlan {
        let mut statement = self.clone();
        statement.includes = self
            .includes
            .iter()
            .filter_map(|node| node.prune(&|node| !node.separate))
            .collect();
        statement
    }

    /// Limited outer statement of a sub-query plan: non-duplicating includes
    /// are selected, required duplicating ones only filter
    pub fn outer_statement(&self) -> SelectPlan {
        fn outer(node: &IncludeNode) -> Option<IncludeNode> {
            if node.separate {
                return None;
            }
            if node.duplicating {
                if !(node.sub_query_filter && node.required) {
                    return None;
                }
                let mut filter = node.prune(&|node| !node.separate)?;
                set_role(&mut filter, JoinRole::Filter);
                return Some(filter);
            }
            let mut kept = node.clone();
            kept.children = node.children.iter().filter_map(outer).collect();
            Some(kept)
        }

        let mut statement = self.clone();
        statement.includes = self.includes.iter().filter_map(outer).collect();
        statement
    }

    /// Second pass of a sub-query plan: the branches leading to duplicating
    /// includes, for the outer rows with the given primary keys
    pub fn second_pass(&self, keys: Vec<Value>) -> SelectPlan {
        fn second(node: &IncludeNode) -> Option<IncludeNode> {
            if node.separate {
                return None;
            }
            if node.duplicating {
                return node.prune(&|node| !node.separate);
            }
            let children: Vec<IncludeNode> = node.children.iter().filter_map(second).collect();
            if children.is_empty() {
                return None;
            }
            let mut kept = node.clone();
            kept.children = children;
            Some(kept)
        }

        let mut statement = self.clone();
        statement.conditions = vec![WhereCondition::eq_or_in(self.primary_key.clone(), keys)];
        statement.limit = None;
        statement.offset = None;
        statement.grouped_limit = None;
        statement.sub_query = false;
        statement.includes = self.includes.iter().filter_map(second).collect();
        statement
    }

    /// Paths and nodes of `separate` includes, parents first
    pub fn separate_includes(&self) -> Vec<(Vec<String>, &IncludeNode)> {
        fn collect<'a>(
            node: &'a IncludeNode,
            path: &mut Vec<String>,
            found: &mut Vec<(Vec<String>, &'a IncludeNode)>,
        ) {
            if node.separate {
                found.push((path.clone(), node));
                return;
            }
            path.push(node.alias.clone());
            for child in &node.children {
                collect(child, path, found);
            }
            path.pop();
        }

        let mut found = Vec::new();
        for node in &self.includes {
            collect(node, &mut Vec::new(), &mut found);
        }
        found
    }
}

fn set_role(node: &mut IncludeNode, role: JoinRole) {
    node.role = role;
    for child in &mut node.children {
        set_role(child, role);
    }
}
