//! Hive SDK
//!
//! Shared library providing traits and types for Hive components.
//! This crate is used by the engine and by anything that implements tools.

/// Error types and handling
pub mod errors;

/// Shared memory contract
pub mod memory;

/// Tool trait and context types
pub mod tool;

/// Tool result types
pub mod types;

// Re-export commonly used types
pub use errors::{EngineError, HiveErrorExt};
pub use memory::SharedMemory;
pub use tool::{Tool, ToolContext, ToolMetadata};
pub use types::ToolResult;
