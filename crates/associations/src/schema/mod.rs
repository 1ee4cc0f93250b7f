//! Schema - model definitions, attributes and the registry that owns them

pub mod attribute;
pub mod model;
pub mod registry;

pub use attribute::{AttributeDef, AttributeMap, DataType, ReferentialAction, References, UniqueKey};
pub use model::{ModelDefinition, ModelId, ModelOptions};
pub use registry::ModelRegistry;
