//! # elif-associations: Association Layer for elif.rs
//!
//! Declares relationships between models (HasOne, BelongsTo, HasMany,
//! BelongsToMany), injects the foreign keys and join models they need, and
//! plans eager-loading reads over nested include trees.
//!
//! SQL rendering, connections and transactions stay outside this crate:
//! every statement goes through the `Executor` trait.

pub mod associations;
pub mod config;
pub mod error;
pub mod executor;
pub mod hydration;
pub mod include;
pub mod operations;
pub mod plan;
pub mod query;
pub mod record;
pub mod schema;

// Re-export core types
pub use associations::{
    AccessorOp, AccessorTable, Alias, Association, AssociationKind, AssociationOptions,
    AssociationRef, AssociationRegistry, ForeignKey, Name, ThroughOptions,
};
pub use config::AssociationConfig;
pub use error::{AssociationError, AssociationResult, CollidesWith};
pub use executor::{Executor, QueryOptions, TransactionHandle};
pub use hydration::{Instance, Loaded, ResultAssembler};
pub use include::{Include, IncludeNormalizer};
pub use operations::{Associations, GetOptions, Target, TargetRef};
pub use plan::{FindOptions, GroupedLimit, IncludeNode, PlanBuilder, SelectPlan};
pub use query::{JoinType, OrderBy, OrderDirection, QueryOperator, WhereCondition};
pub use record::{Key, Record, Row};
pub use schema::{AttributeDef, DataType, ModelId, ModelOptions, ModelRegistry, ReferentialAction};
