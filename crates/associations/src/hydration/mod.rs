//! Result hydration - instances and the assembler that builds them from
//! flat joined rows

pub mod assembler;
pub mod instance;

pub use assembler::ResultAssembler;
pub use instance::{Instance, Loaded};
