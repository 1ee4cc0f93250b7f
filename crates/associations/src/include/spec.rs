//! Include specifications - the caller-facing description of what to eager
//! load alongside a query

use serde::{Deserialize, Serialize};

use crate::associations::descriptor::AssociationRef;
use crate::associations::kind::AssociationKind;
use crate::query::types::{OrderBy, WhereCondition};
use crate::schema::ModelId;

/// How an include names its association
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IncludeTarget {
    /// The only (non-aliased) association to a model
    Model(ModelId),
    /// Association to a model under an explicit alias
    ModelAs { model: ModelId, alias: String },
    /// A specific association
    Association(AssociationRef),
    /// Alias on the parent model
    Alias(String),
    /// Every association of the parent, optionally of one kind
    All {
        kind: Option<AssociationKind>,
        nested: bool,
    },
}

/// Filters and columns for the join rows of a many-to-many include
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThroughInclude {
    pub conditions: Vec<WhereCondition>,
    pub attributes: Option<Vec<String>>,
}

/// One node of an include tree as given by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Include {
    pub target: IncludeTarget,
    pub required: Option<bool>,
    pub conditions: Vec<WhereCondition>,
    pub attributes: Option<Vec<String>>,
    pub order: Vec<OrderBy>,
    pub limit: Option<usize>,
    pub separate: Option<bool>,
    pub duplicating: Option<bool>,
    pub sub_query: Option<bool>,
    pub through: Option<ThroughInclude>,
    pub children: Vec<Include>,
}

impl Include {
    fn new(target: IncludeTarget) -> Self {
        Self {
            target,
            required: None,
            conditions: Vec::new(),
            attributes: None,
            order: Vec::new(),
            limit: None,
            separate: None,
            duplicating: None,
            sub_query: None,
            through: None,
            children: Vec::new(),
        }
    }

    pub fn model(model: ModelId) -> Self {
        Self::new(IncludeTarget::Model(model))
    }

    pub fn model_as(model: ModelId, alias: impl Into<String>) -> Self {
        Self::new(IncludeTarget::ModelAs {
            model,
            alias: alias.into(),
        })
    }

    pub fn association(reference: AssociationRef) -> Self {
        Self::new(IncludeTarget::Association(reference))
    }

    pub fn alias(alias: impl Into<String>) -> Self {
        Self::new(IncludeTarget::Alias(alias.into()))
    }

    /// Include every association of the parent
    pub fn all() -> Self {
        Self::new(IncludeTarget::All {
            kind: None,
            nested: false,
        })
    }

    /// Restrict an `all` include to one association kind
    pub fn of_kind(mut self, kind: AssociationKind) -> Self {
        if let IncludeTarget::All { nested, .. } = self.target {
            self.target = IncludeTarget::All {
                kind: Some(kind),
                nested,
            };
        }
        self
    }

    /// Expand an `all` include recursively
    pub fn nested(mut self) -> Self {
        if let IncludeTarget::All { kind, .. } = self.target {
            self.target = IncludeTarget::All { kind, nested: true };
        }
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = Some(required);
        self
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

    pub fn separate(mut self, separate: bool) -> Self {
        self.separate = Some(separate);
        self
    }

    pub fn duplicating(mut self, duplicating: bool) -> Self {
        self.duplicating = Some(duplicating);
        self
    }

    pub fn sub_query(mut self, sub_query: bool) -> Self {
        self.sub_query = Some(sub_query);
        self
    }

    pub fn through_filter(mut self, condition: WhereCondition) -> Self {
        self.through
            .get_or_insert_with(ThroughInclude::default)
            .conditions
            .push(condition);
        self
    }

    pub fn through_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.through.get_or_insert_with(ThroughInclude::default).attributes =
            Some(attributes.into_iter().map(Into::into).collect());
        self
    }

    pub fn include(mut self, child: impl Into<Include>) -> Self {
        self.children.push(child.into());
        self
    }
}

impl From<AssociationRef> for Include {
    fn from(reference: AssociationRef) -> Self {
        Include::association(reference)
    }
}

impl From<&str> for Include {
    fn from(alias: &str) -> Self {
        Include::alias(alias)
    }
}

impl From<ModelId> for Include {
    fn from(model: ModelId) -> Self {
        Include::model(model)
    }
}
