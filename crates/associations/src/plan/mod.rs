//! Query plans - resolved include trees, sub-query analysis and grouped
//! limits

pub mod builder;
pub mod grouped_limit;
pub mod node;

pub use builder::{FindOptions, PlanBuilder};
pub use grouped_limit::GroupedLimit;
pub use node::{IncludeNode, JoinRole, SelectPlan, ThroughNode, PATH_SEPARATOR};
