//! Workforce Queue
//!
//! Heavy multi-iteration runs are enqueued as `{user_id, request}` on a
//! durable SQLite queue and processed out-of-band by [`WorkforceWorker`]s.
//! Every processed job also gets a durable run record keyed by the job id,
//! which outlives queue retention.
//!
//! [`WorkforceService::get_status`] reconciles the two: the live queue row
//! wins while it exists, then the run record, then `unknown`.

mod orchestration;
mod progress;
mod worker;

pub use orchestration::{HiveOrchestration, Orchestration};
pub use progress::{percent_complete, ProgressReporter};
pub use worker::{WorkforcePool, WorkforceWorker, WORKFORCE_BOT_ID};

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::config::WorkforceConfig;
use crate::db::{
    now_secs, Database, QueuedJob, RunRecord, WorkforceQueueRepository, WorkforceRunRepository,
};

/// Status reported when neither the queue nor the run records know the job
pub const UNKNOWN_STATUS: &str = "unknown";

/// Where a status answer came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusSource {
    Queue,
    Record,
    None,
}

/// Reconciled job status
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkforceStatus {
    pub id: String,
    /// `waiting`, `active`, `completed`, `failed` or `unknown`
    pub status: String,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub progress: Option<u32>,
    pub iterations: Option<Value>,
    pub last_updated: Option<String>,
    pub source: StatusSource,
}

impl WorkforceStatus {
    fn from_queue(job: QueuedJob) -> Self {
        let progress = job.progress.unwrap_or(Value::Null);
        Self {
            id: job.id,
            status: job.state.as_str().to_string(),
            result: job.result,
            error: job.error,
            progress: progress
                .get("percent")
                .and_then(Value::as_u64)
                .map(|p| p as u32),
            iterations: progress.get("iterations").cloned(),
            last_updated: progress
                .get("lastUpdated")
                .and_then(Value::as_str)
                .map(str::to_string),
            source: StatusSource::Queue,
        }
    }

    fn from_record(record: RunRecord) -> Self {
        let error = record
            .result
            .as_ref()
            .and_then(|r| r.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let iterations = record
            .result
            .as_ref()
            .and_then(|r| r.get("subtasks"))
            .cloned();
        Self {
            id: record.id,
            status: record.status,
            result: record.result,
            error,
            progress: None,
            iterations,
            last_updated: chrono::DateTime::from_timestamp(record.updated_at, 0)
                .map(|t| t.to_rfc3339()),
            source: StatusSource::Record,
        }
    }

    fn unknown(id: &str) -> Self {
        Self {
            id: id.to_string(),
            status: UNKNOWN_STATUS.to_string(),
            result: None,
            error: None,
            progress: None,
            iterations: None,
            last_updated: None,
            source: StatusSource::None,
        }
    }
}

/// Producer and status side of the workforce queue
#[derive(Clone)]
pub struct WorkforceService {
    queue: WorkforceQueueRepository,
    runs: WorkforceRunRepository,
    config: WorkforceConfig,
}

impl WorkforceService {
    pub fn new(db: &Database, config: WorkforceConfig) -> Self {
        Self {
            queue: db.workforce_queue(),
            runs: db.workforce_runs(),
            config,
        }
    }

    /// Enqueue a request for a user
    pub async fn submit(&self, user_id: &str, request: &str) -> Result<QueuedJob> {
        let job = self
            .queue
            .enqueue(user_id, request, self.config.max_attempts)
            .await
            .context("Failed to submit workforce job")?;
        info!("Submitted workforce job {} for user {}", job.id, user_id);
        Ok(job)
    }

    /// Resolve a job's status: live queue row, then run record, then unknown
    pub async fn get_status(&self, job_id: &str) -> Result<WorkforceStatus> {
        if let Some(job) = self.queue.get(job_id).await? {
            return Ok(WorkforceStatus::from_queue(job));
        }
        if let Some(record) = self.runs.get(job_id).await? {
            return Ok(WorkforceStatus::from_record(record));
        }
        Ok(WorkforceStatus::unknown(job_id))
    }

    /// Most recent run records for a user
    pub async fn list_runs(&self, user_id: &str, limit: i64) -> Result<Vec<RunRecord>> {
        self.runs.list_for_user(user_id, limit).await
    }

    /// Drop finished queue rows older than the retention window. Run records
    /// are kept.
    pub async fn prune(&self) -> Result<u64> {
        self.queue
            .prune_finished(now_secs() - self.config.retention_secs)
            .await
    }
}
