//! Queen Bee
//!
//! Splits a free-text goal into [`SubTask`]s and picks a worker bot for
//! each. Both decisions are delegated to tools looked up by capability:
//!
//! - `planner` replies (in prose or not) with a JSON array of
//!   `{description, requiredCapability}` items;
//! - `evaluator` replies with a `name: <worker>` line when more than one
//!   worker could take a task.
//!
//! Neither step can fail. A missing tool, a tool error or an unparseable
//! reply degrades to a single `general.respond` subtask, or to the first
//! capable worker.

pub mod types;

pub use types::{SubTask, SubTaskStatus, WorkerBot, GENERAL_CAPABILITY};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::tools::ToolRegistry;
use crate::util::json::extract_json_array;
use sdk::tool::ToolContext;

/// Capability of the decomposition tool
pub const PLANNER_CAPABILITY: &str = "planner";

/// Capability of the worker selection tool
pub const EVALUATOR_CAPABILITY: &str = "evaluator";

/// A planner item: either a bare description or an object
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PlannedItem {
    Text(String),
    Detailed {
        #[serde(default, alias = "task", alias = "title")]
        description: Option<String>,
        #[serde(
            default,
            rename = "requiredCapability",
            alias = "required_capability",
            alias = "capability"
        )]
        required_capability: Option<String>,
    },
}

impl PlannedItem {
    fn into_parts(self) -> Option<(String, String)> {
        let (description, capability) = match self {
            PlannedItem::Text(text) => (text, None),
            PlannedItem::Detailed {
                description,
                required_capability,
            } => (description?, required_capability),
        };

        let description = description.trim().to_string();
        if description.is_empty() {
            return None;
        }

        let capability = capability
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| GENERAL_CAPABILITY.to_string());

        Some((description, capability))
    }
}

/// Parse a planner reply into `(description, capability)` pairs.
///
/// `None` when the reply holds no usable array.
pub fn parse_plan(reply: &str) -> Option<Vec<(String, String)>> {
    let items: Vec<PlannedItem> = extract_json_array(reply)?;
    let parts: Vec<_> = items.into_iter().filter_map(PlannedItem::into_parts).collect();
    (!parts.is_empty()).then_some(parts)
}

/// Worker named by an evaluator reply.
///
/// Tries, in order: the first `name:` line (case-insensitive), the text
/// before the first `:` on the first non-empty line, then the whole reply.
/// Each candidate text is matched against worker names (case-insensitive)
/// and ids; when it carries trailing commentary the longest worker name it
/// starts with wins.
pub fn parse_choice<'a>(reply: &str, candidates: &'a [WorkerBot]) -> Option<&'a WorkerBot> {
    let named_line = reply.lines().find_map(|line| {
        let line = strip_markup(line);
        line.to_ascii_lowercase()
            .starts_with("name:")
            .then(|| &line["name:".len()..])
    });
    if let Some(worker) = named_line.and_then(|text| match_worker(text, candidates)) {
        return Some(worker);
    }

    let first_line = reply
        .lines()
        .map(strip_markup)
        .find(|line| !line.is_empty())?;
    if let Some((head, _)) = first_line.split_once(':') {
        if let Some(worker) = match_worker(head, candidates) {
            return Some(worker);
        }
    }

    match_worker(reply, candidates)
}

fn strip_markup(line: &str) -> &str {
    line.trim().trim_start_matches(['*', '-', '`']).trim()
}

fn match_worker<'a>(text: &str, candidates: &'a [WorkerBot]) -> Option<&'a WorkerBot> {
    let chosen = text
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '*' || c == '`')
        .trim();
    if chosen.is_empty() {
        return None;
    }

    if let Some(exact) = candidates
        .iter()
        .find(|w| w.name.eq_ignore_ascii_case(chosen) || w.id == chosen)
    {
        return Some(exact);
    }

    let lower = chosen.to_lowercase();
    candidates
        .iter()
        .filter(|w| !w.name.is_empty() && lower.starts_with(&w.name.to_lowercase()))
        .max_by_key(|w| w.name.len())
}

/// Goal decomposition and worker assignment
#[derive(Debug, Clone)]
pub struct QueenBee {
    tools: ToolRegistry,
}

impl QueenBee {
    /// `tools` must provide the `planner` and `evaluator` capabilities for
    /// anything beyond the fallbacks
    pub fn new(tools: ToolRegistry) -> Self {
        Self { tools }
    }

    /// Decompose a goal into pending subtasks. Never fails and never returns
    /// an empty list.
    pub async fn decompose(&self, goal: &str, ctx: &ToolContext) -> Vec<SubTask> {
        let stamp = chrono::Utc::now().timestamp_millis();

        let Some(planner) = self.tools.find_by_capability(PLANNER_CAPABILITY) else {
            warn!("No planner tool registered; using single-task plan");
            return vec![Self::fallback(goal, stamp)];
        };

        let reply = match planner.run(goal, ctx).await {
            Ok(result) if result.success => result.output,
            Ok(result) => {
                warn!("Planner reported failure: {}", result.output);
                return vec![Self::fallback(goal, stamp)];
            }
            Err(e) => {
                warn!("Planner failed: {}", e);
                return vec![Self::fallback(goal, stamp)];
            }
        };

        match parse_plan(&reply) {
            Some(parts) => {
                info!("Decomposed goal into {} subtasks", parts.len());
                parts
                    .into_iter()
                    .enumerate()
                    .map(|(i, (description, capability))| {
                        SubTask::new(format!("task_{}_{}", stamp, i), description, capability)
                    })
                    .collect()
            }
            None => {
                warn!("Failed to parse planner output, using single-task plan");
                debug!("Planner reply: {}", reply);
                vec![Self::fallback(goal, stamp)]
            }
        }
    }

    /// Pick a worker for `task`.
    ///
    /// `None` exactly when no worker offers the required capability or
    /// `general.respond`.
    pub async fn assign_worker(
        &self,
        task: &SubTask,
        workers: &[WorkerBot],
        ctx: &ToolContext,
    ) -> Option<WorkerBot> {
        let capable: Vec<WorkerBot> = workers
            .iter()
            .filter(|w| w.can_handle(&task.required_capability))
            .cloned()
            .collect();

        match capable.len() {
            0 => {
                debug!(
                    "No worker offers '{}' for task {}",
                    task.required_capability, task.id
                );
                None
            }
            1 => capable.into_iter().next(),
            _ => {
                let chosen = self.evaluate(task, &capable, ctx).await;
                chosen.or_else(|| capable.into_iter().next())
            }
        }
    }

    async fn evaluate(
        &self,
        task: &SubTask,
        candidates: &[WorkerBot],
        ctx: &ToolContext,
    ) -> Option<WorkerBot> {
        let Some(evaluator) = self.tools.find_by_capability(EVALUATOR_CAPABILITY) else {
            warn!("No evaluator tool registered; using first capable worker");
            return None;
        };

        let prompt = Self::evaluation_prompt(task, candidates);
        let reply = match evaluator.run(&prompt, ctx).await {
            Ok(result) if result.success => result.output,
            Ok(result) => {
                warn!("Evaluator reported failure: {}", result.output);
                return None;
            }
            Err(e) => {
                warn!("Evaluator failed: {}", e);
                return None;
            }
        };

        let chosen = parse_choice(&reply, candidates).cloned();
        if chosen.is_none() {
            warn!("Evaluator choice matched no candidate; using first capable worker");
        }
        chosen
    }

    fn evaluation_prompt(task: &SubTask, candidates: &[WorkerBot]) -> String {
        let mut prompt = format!(
            "Task: {}\nRequired capability: {}\n\nCandidates:\n",
            task.description, task.required_capability
        );
        for worker in candidates {
            prompt.push_str(&format!(
                "- name: {} (id: {}) capabilities: [{}] {}\n",
                worker.name,
                worker.id,
                worker.capabilities.join(", "),
                worker.description
            ));
        }
        prompt.push_str("\nReply with `name: <worker name>`.");
        prompt
    }

    fn fallback(goal: &str, stamp: i64) -> SubTask {
        SubTask::new(format!("task_{}_0", stamp), goal, GENERAL_CAPABILITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker(id: &str, name: &str) -> WorkerBot {
        WorkerBot {
            id: id.to_string(),
            name: name.to_string(),
            capabilities: vec!["web.search".to_string()],
            description: String::new(),
        }
    }

    #[test]
    fn test_parse_plan_accepts_aliases_and_strings() {
        let reply = r#"Plan:
        [{"description": "search", "requiredCapability": "web.search"},
         {"description": "notify", "required_capability": "notify.slack"},
         {"task": "summarize", "capability": "llm.generate"},
         "just respond",
         {"description": "   "}]"#;

        let parts = parse_plan(reply).unwrap();
        assert_eq!(
            parts,
            vec![
                ("search".to_string(), "web.search".to_string()),
                ("notify".to_string(), "notify.slack".to_string()),
                ("summarize".to_string(), "llm.generate".to_string()),
                ("just respond".to_string(), GENERAL_CAPABILITY.to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_plan_rejects_prose_and_empty() {
        assert!(parse_plan("I can't help with that").is_none());
        assert!(parse_plan("[]").is_none());
        assert!(parse_plan("[{\"description\": \"\"}]").is_none());
    }

    #[test]
    fn test_parse_choice() {
        let workers = vec![worker("a1", "Scout"), worker("b2", "Scout Pro")];

        assert_eq!(parse_choice("name: scout", &workers).unwrap().id, "a1");
        assert_eq!(
            parse_choice("**Name:** Scout Pro because it is faster", &workers).unwrap().id,
            "b2"
        );
        assert_eq!(
            parse_choice("Name: Scout Pro - it is faster", &workers).unwrap().id,
            "b2"
        );
        assert_eq!(parse_choice("name: b2", &workers).unwrap().id, "b2");
        assert!(parse_choice("name: Nobody", &workers).is_none());
        assert!(parse_choice("I pick Scout", &workers).is_none());
    }

    #[test]
    fn test_parse_choice_leading_name_and_bare_reply() {
        let workers = vec![worker("a1", "Scout"), worker("b2", "Scout Pro")];

        assert_eq!(parse_choice("Scout Pro: best fit", &workers).unwrap().id, "b2");
        assert_eq!(
            parse_choice("\n  Scout: cheaper\nScout Pro: faster", &workers).unwrap().id,
            "a1"
        );
        assert_eq!(parse_choice("Scout Pro", &workers).unwrap().id, "b2");
        assert_eq!(parse_choice("  \"scout\"  ", &workers).unwrap().id, "a1");
        assert_eq!(parse_choice("b2", &workers).unwrap().id, "b2");
        assert_eq!(parse_choice("Scout Pro, since it is faster", &workers).unwrap().id, "b2");
        assert!(parse_choice("Reason: both are fine", &workers).is_none());
        assert!(parse_choice("", &workers).is_none());
    }
}
