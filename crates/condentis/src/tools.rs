//! Tools the model can call, and the registry that runs them.

pub mod base;
pub mod read_file;
pub mod registry;
pub mod schema;

pub use base::{Tool, ToolConfirmation, ToolInvocation, ToolKind, ToolResult};
pub use registry::{default_registry, ToolRegistry};
pub use schema::{JsonSchema, ParamsSchema, TypedSchema};
