//! Queen Bee data types

use serde::{Deserialize, Serialize};

use crate::db::Bot;

/// Capability every general-purpose bot offers
pub const GENERAL_CAPABILITY: &str = "general.respond";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubTaskStatus {
    Pending,
    Completed,
    Failed,
}

/// One decomposed unit of a larger goal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubTask {
    pub id: String,
    pub description: String,
    pub required_capability: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_worker_id: Option<String>,
    pub status: SubTaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl SubTask {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        required_capability: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            required_capability: required_capability.into(),
            assigned_worker_id: None,
            status: SubTaskStatus::Pending,
            result: None,
        }
    }

    /// Assign a worker. Once set, the assignment never changes: assigning a
    /// different worker afterwards is refused and returns `false`.
    pub fn assign(&mut self, worker_id: &str) -> bool {
        match &self.assigned_worker_id {
            Some(existing) => existing == worker_id,
            None => {
                self.assigned_worker_id = Some(worker_id.to_string());
                true
            }
        }
    }

    pub fn complete(&mut self, result: impl Into<String>) {
        self.status = SubTaskStatus::Completed;
        self.result = Some(result.into());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = SubTaskStatus::Failed;
        self.result = Some(error.into());
    }
}

/// Read-only view of a bot offered as a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerBot {
    pub id: String,
    pub name: String,
    pub capabilities: Vec<String>,
    pub description: String,
}

impl WorkerBot {
    /// Whether this worker can take a task needing `capability`
    pub fn can_handle(&self, capability: &str) -> bool {
        self.capabilities
            .iter()
            .any(|c| c == capability || c == GENERAL_CAPABILITY)
    }
}

impl From<&Bot> for WorkerBot {
    fn from(bot: &Bot) -> Self {
        Self {
            id: bot.id.clone(),
            name: bot.name.clone(),
            capabilities: bot.capabilities.clone(),
            description: bot.description.clone(),
        }
    }
}
