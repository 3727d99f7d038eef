//! Tool Execution Boundary
//!
//! The only component permitted to touch the filesystem, shell, or network
//! on the model's behalf. Every operation is validated against the workspace
//! root and the command allowlist before any I/O happens, and every failure
//! is converted into an error payload -- nothing raises past this boundary.

pub mod executor;
pub mod guard;
pub mod schema;

pub use executor::{ToolExecutor, ToolKind};
pub use schema::tool_schemas;
