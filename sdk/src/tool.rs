//! Tool trait and context types
//!
//! This module defines the `Tool` trait that every callable capability must
//! implement (`call` instructions, the Queen Bee planner and evaluator, the
//! LLM bridge), and the `ToolContext` handed to each invocation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::errors::EngineError;
use crate::memory::SharedMemory;
use crate::types::ToolResult;

/// Trait that all tools must implement
///
/// Tools are stateless with respect to a run: everything run-scoped arrives
/// through the `ToolContext`. They are registered when a runtime invocation
/// is assembled and are never persisted.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name used by `call <name> ...` instructions
    fn name(&self) -> &str;

    /// Capability tag (e.g. `planner`, `evaluator`, `llm.generate`)
    fn capability(&self) -> &str;

    /// Human readable description
    fn description(&self) -> &str;

    /// Invoke the tool with raw argument text.
    ///
    /// Argument interpretation belongs to the tool. Returning `Err` and
    /// returning `ToolResult { success: false, .. }` are both treated by the
    /// runtime as a failed observation.
    async fn run(&self, args: &str, ctx: &ToolContext) -> Result<ToolResult, EngineError>;
}

/// Identity of the run a tool is invoked for
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolMetadata {
    pub bot_id: String,
    pub run_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_system_prompt: Option<String>,
}

impl ToolMetadata {
    /// Create metadata for a run
    pub fn new(
        bot_id: impl Into<String>,
        run_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            bot_id: bot_id.into(),
            run_id: run_id.into(),
            user_id: user_id.into(),
            bot_system_prompt: None,
        }
    }

    /// Attach the bot's system prompt
    pub fn with_system_prompt(mut self, prompt: Option<String>) -> Self {
        self.bot_system_prompt = prompt;
        self
    }
}

/// Context provided to tools for one run or job.
///
/// Created fresh per execution. Cloning is cheap and shares the same memory
/// namespace.
#[derive(Clone)]
pub struct ToolContext {
    pub metadata: ToolMetadata,
    pub shared_memory: Arc<dyn SharedMemory>,
}

impl ToolContext {
    /// Create a new context
    pub fn new(metadata: ToolMetadata, shared_memory: Arc<dyn SharedMemory>) -> Self {
        Self {
            metadata,
            shared_memory,
        }
    }
}

impl fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolContext")
            .field("metadata", &self.metadata)
            .field("namespace", &self.shared_memory.namespace())
            .finish()
    }
}
