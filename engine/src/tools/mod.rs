//! Tool registry and built-in tools
//!
//! A [`ToolRegistry`] is assembled per runtime invocation. Lookup is by the
//! name used in `call <name> ...` instructions; Queen Bee additionally looks
//! tools up by capability (`planner`, `evaluator`).

pub mod llm;
pub mod memory;

pub use llm::LlmTool;
pub use memory::MemoryTool;

use sdk::tool::Tool;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Ordered set of tools, unique by name
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry with no tools enabled.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        debug!(
            "Registering tool '{}' (capability: {})",
            tool.name(),
            tool.capability()
        );
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
    }

    /// Builder form of [`ToolRegistry::register`]
    pub fn with(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    /// Tool registered under `name`
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    /// First tool (in registration order) offering `capability`
    pub fn find_by_capability(&self, capability: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .iter()
            .find(|t| t.capability() == capability)
            .cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sdk::errors::EngineError;
    use sdk::tool::ToolContext;
    use sdk::types::ToolResult;

    struct Named {
        name: &'static str,
        capability: &'static str,
    }

    #[async_trait]
    impl Tool for Named {
        fn name(&self) -> &str {
            self.name
        }
        fn capability(&self) -> &str {
            self.capability
        }
        fn description(&self) -> &str {
            "test tool"
        }
        async fn run(&self, _args: &str, _ctx: &ToolContext) -> Result<ToolResult, EngineError> {
            Ok(ToolResult::text(self.name))
        }
    }

    fn named(name: &'static str, capability: &'static str) -> Arc<dyn Tool> {
        Arc::new(Named { name, capability })
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = ToolRegistry::empty()
            .with(named("search", "web.search"))
            .with(named("planner", "planner"));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("search").unwrap().capability(), "web.search");
        assert!(registry.get("missing").is_none());
        assert_eq!(
            registry.find_by_capability("planner").unwrap().name(),
            "planner"
        );
        assert!(registry.find_by_capability("evaluator").is_none());
    }

    #[test]
    fn test_register_replaces_same_name() {
        let registry = ToolRegistry::empty()
            .with(named("search", "web.search"))
            .with(named("search", "web.fetch"));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("search").unwrap().capability(), "web.fetch");
    }

    #[test]
    fn test_capability_lookup_keeps_registration_order() {
        let registry = ToolRegistry::empty()
            .with(named("first", "planner"))
            .with(named("second", "planner"));

        assert_eq!(registry.find_by_capability("planner").unwrap().name(), "first");
        assert_eq!(registry.names(), vec!["first", "second"]);
    }
}
