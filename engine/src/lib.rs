//! Hive Engine Library
//!
//! This library provides the core of the Hive bot engine: the HiveLang
//! compiler, the execution runtime, shared memory, the Queen Bee, the Pulse
//! Engine and the Workforce Queue. It is used by both the `hive` binary and
//! integration tests.

/// Configuration management module
pub mod config;

/// Database persistence module
pub mod db;

/// HiveLang compiler
pub mod hivelang;

/// Execution runtime
pub mod runtime;

/// Shared memory backends
pub mod memory;

/// Built-in tools and the tool registry
pub mod tools;

/// LLM provider abstraction layer
pub mod llm;

/// Queen Bee goal decomposition and worker assignment
pub mod queen;

/// Pulse Engine scheduler
pub mod pulse;

/// Workforce Queue workers and status
pub mod workforce;

/// Message bus for lifecycle events
pub mod message_bus;

/// Telemetry and Observability
pub mod telemetry;

/// Shared helpers
pub mod util;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
