//! Accessor tables - the named operations an association exposes on
//! instances of its source model

use serde::{Deserialize, Serialize};
use std::fmt;

use super::descriptor::{Association, AssociationRef};
use super::naming::upper_first;
use crate::schema::ModelDefinition;

/// Operation behind an accessor name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessorOp {
    Get,
    Set,
    Create,
    Add,
    AddMultiple,
    Remove,
    RemoveMultiple,
    HasSingle,
    HasAll,
    Count,
}

impl AccessorOp {
    fn prefix(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Set => "set",
            Self::Create => "create",
            Self::Add | Self::AddMultiple => "add",
            Self::Remove | Self::RemoveMultiple => "remove",
            Self::HasSingle | Self::HasAll => "has",
            Self::Count => "count",
        }
    }

    /// Whether the method name uses the plural form
    fn plural(self) -> bool {
        matches!(
            self,
            Self::Get | Self::Set | Self::AddMultiple | Self::RemoveMultiple | Self::HasAll | Self::Count
        )
    }
}

impl fmt::Display for AccessorOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

const SINGLE_OPS: &[AccessorOp] = &[AccessorOp::Get, AccessorOp::Set, AccessorOp::Create];

const MULTI_OPS: &[AccessorOp] = &[
    AccessorOp::Get,
    AccessorOp::Set,
    AccessorOp::AddMultiple,
    AccessorOp::Add,
    AccessorOp::Create,
    AccessorOp::Remove,
    AccessorOp::RemoveMultiple,
    AccessorOp::HasSingle,
    AccessorOp::HasAll,
    AccessorOp::Count,
];

/// Method name -> operation table for one association
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessorTable {
    association: AssociationRef,
    methods: Vec<(AccessorOp, String)>,
}

impl AccessorTable {
    pub fn for_association(association: &Association) -> Self {
        let singular = upper_first(&association.name.singular);
        let plural = upper_first(&association.name.plural);

        let ops = if association.is_multi() { MULTI_OPS } else { SINGLE_OPS };
        let methods = ops
            .iter()
            .map(|&op| {
                // Single associations only ever use the singular form
                let name = if op.plural() && association.is_multi() {
                    &plural
                } else {
                    &singular
                };
                (op, format!("{}{}", op.prefix(), name))
            })
            .collect();

        Self {
            association: association.reference(),
            methods,
        }
    }

    /// Tables for every association of a model, in declaration order
    pub fn for_model(model: &ModelDefinition) -> Vec<Self> {
        model.associations.iter().map(Self::for_association).collect()
    }

    pub fn association(&self) -> &AssociationRef {
        &self.association
    }

    /// Method name bound to `op`
    pub fn method(&self, op: AccessorOp) -> Option<&str> {
        self.methods
            .iter()
            .find(|(candidate, _)| *candidate == op)
            .map(|(_, name)| name.as_str())
    }

    /// Operation bound to a method name
    pub fn operation(&self, method: &str) -> Option<AccessorOp> {
        self.methods
            .iter()
            .find(|(_, name)| name == method)
            .map(|(op, _)| *op)
    }

    pub fn iter(&self) -> impl Iterator<Item = (AccessorOp, &str)> {
        self.methods.iter().map(|(op, name)| (*op, name.as_str()))
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::associations::kind::AssociationKind;
    use crate::associations::naming::Name;
    use crate::schema::ModelId;

    fn association(kind: AssociationKind, name: Name) -> Association {
        let mut association = Association::helper(
            kind,
            ModelId::from_index(0),
            ModelId::from_index(1),
            "x",
            "ownerId",
            "id",
            "id",
        );
        association.name = name;
        association
    }

    #[test]
    fn test_multi_accessors() {
        let table = AccessorTable::for_association(&association(
            AssociationKind::HasMany,
            Name::new("task", "tasks"),
        ));

        assert_eq!(table.len(), 10);
        assert_eq!(table.method(AccessorOp::Get), Some("getTasks"));
        assert_eq!(table.method(AccessorOp::Set), Some("setTasks"));
        assert_eq!(table.method(AccessorOp::Add), Some("addTask"));
        assert_eq!(table.method(AccessorOp::AddMultiple), Some("addTasks"));
        assert_eq!(table.method(AccessorOp::Create), Some("createTask"));
        assert_eq!(table.method(AccessorOp::Remove), Some("removeTask"));
        assert_eq!(table.method(AccessorOp::RemoveMultiple), Some("removeTasks"));
        assert_eq!(table.method(AccessorOp::HasSingle), Some("hasTask"));
        assert_eq!(table.method(AccessorOp::HasAll), Some("hasTasks"));
        assert_eq!(table.method(AccessorOp::Count), Some("countTasks"));
        assert_eq!(table.operation("hasTasks"), Some(AccessorOp::HasAll));
    }

    #[test]
    fn test_single_accessors() {
        let table = AccessorTable::for_association(&association(
            AssociationKind::BelongsTo,
            Name::new("owner", "owners"),
        ));

        let methods: Vec<&str> = table.iter().map(|(_, name)| name).collect();
        assert_eq!(methods, vec!["getOwner", "setOwner", "createOwner"]);
        assert_eq!(table.method(AccessorOp::Count), None);
        assert_eq!(table.operation("getOwners"), None);
    }
}
