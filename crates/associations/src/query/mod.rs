//! Query primitives shared by plans and the executor interface

pub mod types;

pub use types::{JoinType, OrderBy, OrderDirection, QueryOperator, WhereCondition};
