//! Execution Runtime
//!
//! Walks one event handler of a compiled HiveLang block and runs its
//! instructions in source order:
//!
//! - `say <text>` appends the text (one pair of surrounding quotes removed)
//!   to the run output.
//! - `call <tool> <args>` resolves the tool by name, runs it with the
//!   argument text and records a [`ReasoningStep`]. A failing tool becomes an
//!   `ERROR: ...` observation and the next instruction still runs.
//! - `raw` lines are skipped.
//!
//! Compile errors and unresolvable blocks abort before any instruction runs.
//! One execution is strictly sequential; callers get parallelism by running
//! independent executions concurrently.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::hivelang::{self, Block, Instruction, InstructionKind, Program};
use crate::message_bus::{Event, MessageBus};
use crate::tools::ToolRegistry;
use sdk::errors::EngineError;
use sdk::tool::ToolContext;

/// Event handler used when the caller does not name one
pub const DEFAULT_EVENT: &str = "input";

/// Shared memory key holding the run input
pub const INPUT_KEY: &str = "input";

/// Shared memory key collecting tool observations
pub const OBSERVATIONS_KEY: &str = "observations";

/// Program handed to the runtime: HiveLang text or an already compiled program
#[derive(Debug, Clone)]
pub enum ProgramSource {
    Source(String),
    Compiled(Program),
}

impl From<&str> for ProgramSource {
    fn from(source: &str) -> Self {
        ProgramSource::Source(source.to_string())
    }
}

impl From<String> for ProgramSource {
    fn from(source: String) -> Self {
        ProgramSource::Source(source)
    }
}

impl From<Program> for ProgramSource {
    fn from(program: Program) -> Self {
        ProgramSource::Compiled(program)
    }
}

/// Input of one run: the `input` text plus arbitrary extra fields
/// (`trigger`, `timestamp`, ...)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionInput {
    pub input: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ExecutionInput {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            extra: Map::new(),
        }
    }

    /// Attach an extra field
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Which block and event a run targets
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Block name; the first block when `None`
    pub block: Option<String>,
    /// Event handler; the runtime default when `None`
    pub event: Option<String>,
}

impl ExecuteOptions {
    pub fn event(event: impl Into<String>) -> Self {
        Self {
            block: None,
            event: Some(event.into()),
        }
    }
}

/// One tool invocation in the run transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasoningStep {
    pub thought: String,
    pub action: String,
    pub action_input: String,
    pub observation: String,
    /// Unix time in milliseconds
    pub timestamp: i64,
}

/// Outcome of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub output: String,
    pub steps: Vec<ReasoningStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            steps: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Split `call` arguments into the tool name and its argument text
pub fn split_call(args: &str) -> (&str, &str) {
    let args = args.trim();
    match args.split_once(char::is_whitespace) {
        Some((tool, rest)) => (tool, hivelang::unquote(rest)),
        None => (args, ""),
    }
}

/// The execution runtime
#[derive(Clone)]
pub struct Runtime {
    default_event: String,
    bus: Option<MessageBus>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            default_event: DEFAULT_EVENT.to_string(),
            bus: None,
        }
    }

    /// Use a different default event handler (configured `runtime.default_event`)
    pub fn with_default_event(mut self, event: impl Into<String>) -> Self {
        self.default_event = event.into();
        self
    }

    /// Publish a `ToolCalled` event per step
    pub fn with_message_bus(mut self, bus: MessageBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn default_event(&self) -> &str {
        &self.default_event
    }

    /// Execute a program against a tool registry.
    ///
    /// Never returns `Err`: compile and block-selection errors come back as
    /// `success = false` with no steps.
    pub async fn execute(
        &self,
        program: ProgramSource,
        input: &ExecutionInput,
        tools: &ToolRegistry,
        ctx: &ToolContext,
        options: &ExecuteOptions,
    ) -> ExecutionResult {
        let program = match program {
            ProgramSource::Compiled(program) => program,
            ProgramSource::Source(source) => match hivelang::parse(&source) {
                Ok(program) => program,
                Err(e) => {
                    warn!("Run {} aborted: {}", ctx.metadata.run_id, e);
                    return ExecutionResult::failure(e.to_string());
                }
            },
        };

        let block = match program.select_block(options.block.as_deref()) {
            Ok(block) => block,
            Err(e) => {
                warn!("Run {} aborted: {}", ctx.metadata.run_id, e);
                return ExecutionResult::failure(e.to_string());
            }
        };

        let requested = options.event.as_deref().unwrap_or(&self.default_event);
        let Some((event, instructions)) = self.resolve_handler(block, requested) else {
            warn!(
                "Block '{}' has no '{}' handler; nothing to run",
                block.name, requested
            );
            return ExecutionResult {
                success: true,
                output: String::new(),
                steps: Vec::new(),
                error: None,
            };
        };

        info!(
            "Run {} executing '{}' on {} '{}' ({} instructions)",
            ctx.metadata.run_id,
            event,
            block.kind.as_str(),
            block.name,
            instructions.len()
        );

        if let Err(e) = ctx
            .shared_memory
            .set(INPUT_KEY, Value::String(input.input.clone()))
            .await
        {
            warn!("Failed to store run input in shared memory: {}", e);
        }

        let mut output: Vec<String> = Vec::new();
        let mut steps = Vec::new();

        for instruction in instructions {
            match instruction.kind {
                InstructionKind::Say => {
                    let text = hivelang::unquote(instruction.args.as_deref().unwrap_or_default());
                    output.push(text.to_string());
                }
                InstructionKind::Call => {
                    let (step, tool_output) = self.run_call(instruction, tools, ctx).await;
                    if let Some(text) = tool_output.filter(|t| !t.is_empty()) {
                        output.push(text);
                    }
                    steps.push(step);
                }
                InstructionKind::Raw => {
                    debug!("Skipping raw instruction: {}", instruction.raw);
                }
            }
        }

        ExecutionResult {
            success: true,
            output: output.join("\n"),
            steps,
            error: None,
        }
    }

    /// Requested handler, else the default handler
    fn resolve_handler<'a>(
        &self,
        block: &'a Block,
        requested: &'a str,
    ) -> Option<(&'a str, &'a [Instruction])> {
        if let Some(handler) = block.handler(requested) {
            return Some((requested, handler));
        }
        if requested != self.default_event {
            debug!(
                "Block '{}' has no '{}' handler, falling back to '{}'",
                block.name, requested, self.default_event
            );
        }
        block
            .events
            .get_key_value(self.default_event.as_str())
            .map(|(name, handler)| (name.as_str(), handler.as_slice()))
    }

    /// Run one `call` instruction. Returns the step and, on success, the
    /// tool output.
    async fn run_call(
        &self,
        instruction: &Instruction,
        tools: &ToolRegistry,
        ctx: &ToolContext,
    ) -> (ReasoningStep, Option<String>) {
        let (name, args) = split_call(instruction.args.as_deref().unwrap_or_default());

        let outcome = if name.is_empty() {
            Err(EngineError::ToolNotFound("(missing tool name)".to_string()))
        } else {
            match tools.get(name) {
                Some(tool) => {
                    debug!("Calling tool '{}' with: {}", name, args);
                    tool.run(args, ctx).await
                }
                None => Err(EngineError::ToolNotFound(name.to_string())),
            }
        };

        let (success, observation, tool_output) = match outcome {
            Ok(result) if result.success => (true, result.output.clone(), Some(result.output)),
            Ok(result) => {
                warn!("Tool '{}' reported failure: {}", name, result.output);
                (false, format!("ERROR: {}", result.output), None)
            }
            Err(e) => {
                warn!("Tool '{}' failed: {}", name, e);
                (false, format!("ERROR: {}", e), None)
            }
        };

        if let Err(e) = ctx
            .shared_memory
            .append(OBSERVATIONS_KEY, Value::String(observation.clone()))
            .await
        {
            warn!("Failed to record observation in shared memory: {}", e);
        }

        if let Some(bus) = &self.bus {
            bus.publish(Event::ToolCalled {
                run_id: ctx.metadata.run_id.clone(),
                tool: name.to_string(),
                args: args.to_string(),
                success,
            })
            .await;
        }

        let step = ReasoningStep {
            thought: format!("Call {} to handle: {}", name, instruction.raw),
            action: name.to_string(),
            action_input: args.to_string(),
            observation,
            timestamp: chrono::Utc::now().timestamp_millis(),
        };

        (step, tool_output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryNamespace;
    use async_trait::async_trait;
    use sdk::tool::{Tool, ToolMetadata};
    use sdk::types::ToolResult;
    use std::sync::Arc;

    struct Upper;

    #[async_trait]
    impl Tool for Upper {
        fn name(&self) -> &str {
            "upper"
        }
        fn capability(&self) -> &str {
            "text.upper"
        }
        fn description(&self) -> &str {
            "Uppercase the arguments"
        }
        async fn run(&self, args: &str, _ctx: &ToolContext) -> Result<ToolResult, EngineError> {
            Ok(ToolResult::text(args.to_uppercase()))
        }
    }

    fn ctx() -> ToolContext {
        ToolContext::new(
            ToolMetadata::new("bot-1", "run-1", "user-1"),
            Arc::new(InMemoryNamespace::ephemeral("run-1")),
        )
    }

    fn tools() -> ToolRegistry {
        ToolRegistry::empty().with(Arc::new(Upper))
    }

    #[test]
    fn test_split_call() {
        assert_eq!(split_call("search hackernews AI"), ("search", "hackernews AI"));
        assert_eq!(split_call("llm \"write a poem\""), ("llm", "write a poem"));
        assert_eq!(split_call("  ping  "), ("ping", ""));
        assert_eq!(split_call(""), ("", ""));
    }

    #[tokio::test]
    async fn test_say_and_call() {
        let source = "bot \"A\"\n on input\n  say \"hi\"\n  call upper hello\n end\nend";
        let result = Runtime::new()
            .execute(
                source.into(),
                &ExecutionInput::new("go"),
                &tools(),
                &ctx(),
                &ExecuteOptions::default(),
            )
            .await;

        assert!(result.success);
        assert_eq!(result.output, "hi\nHELLO");
        assert_eq!(result.steps.len(), 1);
        assert_eq!(result.steps[0].action, "upper");
        assert_eq!(result.steps[0].action_input, "hello");
        assert_eq!(result.steps[0].observation, "HELLO");
    }

    #[tokio::test]
    async fn test_compile_error_aborts_before_instructions() {
        let ctx = ctx();
        let result = Runtime::new()
            .execute(
                "bot\n on input\n  call upper x\n end\nend".into(),
                &ExecutionInput::new("go"),
                &tools(),
                &ctx,
                &ExecuteOptions::default(),
            )
            .await;

        assert!(!result.success);
        assert!(result.error.unwrap().starts_with("Line 1:"));
        assert!(result.steps.is_empty());
        assert!(ctx.shared_memory.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_tool_is_an_observation() {
        let source = "bot \"A\"\n on input\n  call nope x\n  say \"after\"\n end\nend";
        let result = Runtime::new()
            .execute(
                source.into(),
                &ExecutionInput::new("go"),
                &tools(),
                &ctx(),
                &ExecuteOptions::default(),
            )
            .await;

        assert!(result.success);
        assert_eq!(result.output, "after");
        assert_eq!(result.steps[0].observation, "ERROR: Tool not found: nope");
    }

    #[tokio::test]
    async fn test_event_fallback_and_missing_handler() {
        let source = "bot \"A\"\n on input\n  say \"default\"\n end\nend";
        let runtime = Runtime::new();

        let fallback = runtime
            .execute(
                source.into(),
                &ExecutionInput::new("go"),
                &tools(),
                &ctx(),
                &ExecuteOptions::event("pulse"),
            )
            .await;
        assert_eq!(fallback.output, "default");

        let empty = runtime
            .execute(
                "bot \"B\"\nend".into(),
                &ExecutionInput::new("go"),
                &tools(),
                &ctx(),
                &ExecuteOptions::default(),
            )
            .await;
        assert!(empty.success);
        assert!(empty.output.is_empty());
    }

    #[tokio::test]
    async fn test_block_selection() {
        let source = "bot \"A\"\n on input\n  say \"a\"\n end\nend\n\
                      agent \"B\"\n on input\n  say \"b\"\n end\nend";
        let runtime = Runtime::new();
        let options = ExecuteOptions {
            block: Some("B".to_string()),
            event: None,
        };

        let result = runtime
            .execute(source.into(), &ExecutionInput::new("go"), &tools(), &ctx(), &options)
            .await;
        assert_eq!(result.output, "b");

        let missing = ExecuteOptions {
            block: Some("C".to_string()),
            event: None,
        };
        let result = runtime
            .execute(source.into(), &ExecutionInput::new("go"), &tools(), &ctx(), &missing)
            .await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Block not found: C"));

        let empty = runtime
            .execute("".into(), &ExecutionInput::new("go"), &tools(), &ctx(), &ExecuteOptions::default())
            .await;
        assert!(!empty.success);
    }

    #[tokio::test]
    async fn test_input_and_observations_in_shared_memory() {
        let ctx = ctx();
        let source = "bot \"A\"\n on input\n  call upper a\n  call upper b\n end\nend";
        Runtime::new()
            .execute(
                source.into(),
                &ExecutionInput::new("hello"),
                &tools(),
                &ctx,
                &ExecuteOptions::default(),
            )
            .await;

        assert_eq!(
            ctx.shared_memory.get(INPUT_KEY).await.unwrap(),
            Some(Value::String("hello".to_string()))
        );
        assert_eq!(
            ctx.shared_memory.get(OBSERVATIONS_KEY).await.unwrap(),
            Some(serde_json::json!(["A", "B"]))
        );
    }

    #[tokio::test]
    async fn test_tool_calls_are_published() {
        let bus = MessageBus::new();
        let mut rx = bus
            .subscribe(crate::message_bus::EventType::ToolCalled)
            .await;
        let runtime = Runtime::new().with_message_bus(bus);

        runtime
            .execute(
                "bot \"A\"\n on input\n  call upper x\n end\nend".into(),
                &ExecutionInput::new("go"),
                &tools(),
                &ctx(),
                &ExecuteOptions::default(),
            )
            .await;

        match rx.recv().await.unwrap() {
            Event::ToolCalled { tool, success, run_id, .. } => {
                assert_eq!(tool, "upper");
                assert_eq!(run_id, "run-1");
                assert!(success);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_input_serializes_flat() {
        let input = ExecutionInput::new("PULSE_TRIGGER")
            .with("trigger", "schedule")
            .with("timestamp", 42);
        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json["input"], "PULSE_TRIGGER");
        assert_eq!(json["trigger"], "schedule");
        assert_eq!(json["timestamp"], 42);
    }
}
