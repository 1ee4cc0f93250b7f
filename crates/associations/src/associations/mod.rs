//! Associations - descriptors, key injection, join models and accessor
//! tables for HasOne, BelongsTo, HasMany and BelongsToMany

pub mod accessors;
mod define;
pub mod descriptor;
pub(crate) mod foreign_key;
pub mod kind;
pub mod naming;
pub mod options;
pub mod registry;
pub(crate) mod through;

pub use accessors::{AccessorOp, AccessorTable};
pub use descriptor::{Association, AssociationRef, Through, ThroughHelpers};
pub use kind::AssociationKind;
pub use naming::Name;
pub use options::{Alias, AssociationOptions, ForeignKey, ThroughModel, ThroughOptions};
pub use registry::AssociationRegistry;
