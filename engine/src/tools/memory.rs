//! `memory` tool: lets HiveLang programs read and write the run's shared
//! memory.
//!
//! ```text
//! call memory set topic "AI"
//! call memory get topic
//! call memory append seen "item"
//! ```
//!
//! Values are stored as JSON when they parse as JSON, otherwise as strings.

use async_trait::async_trait;
use serde_json::Value;

use crate::hivelang::unquote;
use sdk::errors::EngineError;
use sdk::tool::{Tool, ToolContext};
use sdk::types::ToolResult;

#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryTool;

impl MemoryTool {
    pub fn new() -> Self {
        Self
    }
}

fn parse_value(raw: &str) -> Value {
    let raw = raw.trim();
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(unquote(raw).to_string()))
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl Tool for MemoryTool {
    fn name(&self) -> &str {
        "memory"
    }

    fn capability(&self) -> &str {
        "memory.kv"
    }

    fn description(&self) -> &str {
        "Read and write the run's shared memory (get, set, append, delete, keys)"
    }

    async fn run(&self, args: &str, ctx: &ToolContext) -> Result<ToolResult, EngineError> {
        let mut parts = args.trim().splitn(3, char::is_whitespace);
        let op = parts.next().unwrap_or_default();
        let key = parts.next().map(|k| unquote(k.trim()));
        let rest = parts.next().unwrap_or_default();
        let mem = &ctx.shared_memory;

        match (op, key) {
            ("get", Some(key)) => Ok(match mem.get(key).await? {
                Some(value) => ToolResult::json(render(&value), value),
                None => ToolResult::failure(format!("No value for '{}'", key)),
            }),
            ("set", Some(key)) => {
                mem.set(key, parse_value(rest)).await?;
                Ok(ToolResult::text(format!("Stored '{}'", key)))
            }
            ("append", Some(key)) => {
                mem.append(key, parse_value(rest)).await?;
                Ok(ToolResult::text(format!("Appended to '{}'", key)))
            }
            ("delete", Some(key)) => {
                let existed = mem.delete(key).await?;
                Ok(ToolResult::text(if existed {
                    format!("Deleted '{}'", key)
                } else {
                    format!("No value for '{}'", key)
                }))
            }
            ("keys", _) => {
                let keys = mem.keys().await?;
                Ok(ToolResult::json(keys.join(", "), Value::from(keys)))
            }
            _ => Ok(ToolResult::failure(format!(
                "Unsupported memory command: '{}'",
                args.trim()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryNamespace;
    use sdk::tool::ToolMetadata;
    use serde_json::json;
    use std::sync::Arc;

    fn ctx() -> ToolContext {
        ToolContext::new(
            ToolMetadata::new("bot", "run-1", "user"),
            Arc::new(InMemoryNamespace::ephemeral("run-1")),
        )
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let ctx = ctx();
        let tool = MemoryTool::new();

        tool.run("set topic \"AI\"", &ctx).await.unwrap();
        let got = tool.run("get topic", &ctx).await.unwrap();
        assert!(got.success);
        assert_eq!(got.output, "AI");

        tool.run("set limit 5", &ctx).await.unwrap();
        assert_eq!(ctx.shared_memory.get("limit").await.unwrap(), Some(json!(5)));
    }

    #[tokio::test]
    async fn test_append_and_keys() {
        let ctx = ctx();
        let tool = MemoryTool::new();

        tool.run("append seen a", &ctx).await.unwrap();
        tool.run("append seen b", &ctx).await.unwrap();
        assert_eq!(
            ctx.shared_memory.get("seen").await.unwrap(),
            Some(json!(["a", "b"]))
        );

        let keys = tool.run("keys", &ctx).await.unwrap();
        assert_eq!(keys.output, "seen");
    }

    #[tokio::test]
    async fn test_missing_key_and_bad_command_fail_softly() {
        let ctx = ctx();
        let tool = MemoryTool::new();

        assert!(!tool.run("get nothing", &ctx).await.unwrap().success);
        assert!(!tool.run("explode", &ctx).await.unwrap().success);
        assert!(!tool.run("", &ctx).await.unwrap().success);
    }
}
