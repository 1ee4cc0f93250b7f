//! Includes - eager-loading requests and their resolution against the
//! registry

pub mod normalize;
pub mod spec;

pub use normalize::IncludeNormalizer;
pub use spec::{Include, IncludeTarget, ThroughInclude};
