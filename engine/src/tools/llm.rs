//! Model-backed tool
//!
//! `LlmTool` sends the instruction's argument text as the user message. The
//! system message is the tool's own prompt, or the calling bot's system
//! prompt when the tool has none.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::llm::{LLMProvider, Message};
use sdk::errors::EngineError;
use sdk::tool::{Tool, ToolContext};
use sdk::types::ToolResult;

const PLANNER_PROMPT: &str = "You are the Queen Bee planner. Break the user's goal into small, \
independent subtasks that a single bot can complete.\n\
Output ONLY a JSON array. Each item must have:\n\
- \"description\": what the subtask must achieve\n\
- \"requiredCapability\": the capability a worker needs (e.g. \"web.search\", \"notify.slack\"), \
or \"general.respond\" when any bot can do it\n\n\
Example output:\n\
[{\"description\":\"Search Hacker News for posts about AI\",\"requiredCapability\":\"web.search\"},\
{\"description\":\"Send the findings to Slack\",\"requiredCapability\":\"notify.slack\"}]";

const EVALUATOR_PROMPT: &str = "You are the Queen Bee evaluator. Pick the single best worker \
for the task from the candidates listed by the user.\n\
Answer with exactly one line of the form `name: <worker name>` followed by a short reason.";

/// Tool that forwards its arguments to an LLM provider
pub struct LlmTool {
    provider: Arc<dyn LLMProvider>,
    name: String,
    capability: String,
    description: String,
    system_prompt: Option<String>,
}

impl LlmTool {
    /// General purpose `llm` tool with capability `llm.generate`
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            provider,
            name: "llm".to_string(),
            capability: "llm.generate".to_string(),
            description: "Generate text with the configured language model".to_string(),
            system_prompt: None,
        }
    }

    /// The Queen Bee planner: replies with a JSON array of subtasks
    pub fn planner(provider: Arc<dyn LLMProvider>) -> Self {
        Self::new(provider)
            .named("planner", "planner")
            .described("Decompose a goal into subtasks")
            .with_system_prompt(PLANNER_PROMPT)
    }

    /// The Queen Bee evaluator: replies with `name: <worker>`
    pub fn evaluator(provider: Arc<dyn LLMProvider>) -> Self {
        Self::new(provider)
            .named("evaluator", "evaluator")
            .described("Choose the best worker bot for a task")
            .with_system_prompt(EVALUATOR_PROMPT)
    }

    pub fn named(mut self, name: impl Into<String>, capability: impl Into<String>) -> Self {
        self.name = name.into();
        self.capability = capability.into();
        self
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    fn build_messages(&self, args: &str, ctx: &ToolContext) -> Vec<Message> {
        let system = self
            .system_prompt
            .as_deref()
            .or(ctx.metadata.bot_system_prompt.as_deref());

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(Message::system(system));
        }
        messages.push(Message::user(args));
        messages
    }
}

#[async_trait]
impl Tool for LlmTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn capability(&self) -> &str {
        &self.capability
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn run(&self, args: &str, ctx: &ToolContext) -> Result<ToolResult, EngineError> {
        debug!(
            "Tool '{}' calling {} for run {}",
            self.name,
            self.provider.name(),
            ctx.metadata.run_id
        );

        let messages = self.build_messages(args, ctx);
        let reply = self
            .provider
            .generate(&messages)
            .await
            .map_err(|e| EngineError::LLMProvider(e.to_string()))?;

        Ok(ToolResult::text(reply))
    }
}
