//! Iteration progress relay

use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::db::WorkforceQueueRepository;
use crate::message_bus::{Event, MessageBus};

/// Percent complete after iteration `index` (0-based) of `total`
pub fn percent_complete(index: usize, total: usize) -> u32 {
    if total == 0 {
        return 100;
    }
    let percent = ((index + 1) as f64 / total as f64 * 100.0).round();
    percent.clamp(0.0, 100.0) as u32
}

/// Relays orchestration iterations into the job's queue progress
///
/// Each call writes `{percent, iterations, lastUpdated}` where `iterations`
/// holds every payload reported so far. Writes are best-effort and only land
/// while the reporting worker still holds the job's lease.
pub struct ProgressReporter {
    job_id: String,
    worker_id: String,
    queue: Option<WorkforceQueueRepository>,
    bus: Option<MessageBus>,
    iterations: Mutex<Vec<Value>>,
}

impl ProgressReporter {
    pub fn new(
        job_id: impl Into<String>,
        worker_id: impl Into<String>,
        queue: WorkforceQueueRepository,
        bus: Option<MessageBus>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            worker_id: worker_id.into(),
            queue: Some(queue),
            bus,
            iterations: Mutex::new(Vec::new()),
        }
    }

    /// A reporter that only collects iterations (CLI dry runs and tests)
    pub fn detached(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            worker_id: String::new(),
            queue: None,
            bus: None,
            iterations: Mutex::new(Vec::new()),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Record iteration `index` of `total` and return the progress snapshot
    pub async fn on_iteration(&self, payload: Value, index: usize, total: usize) -> Value {
        let percent = percent_complete(index, total);

        let progress = {
            let mut iterations = self.iterations.lock().await;
            iterations.push(payload);
            json!({
                "percent": percent,
                "iterations": *iterations,
                "lastUpdated": chrono::Utc::now().to_rfc3339(),
            })
        };

        if let Some(queue) = &self.queue {
            match queue
                .update_progress(&self.job_id, &self.worker_id, &progress)
                .await
            {
                Ok(true) => {}
                Ok(false) => warn!(
                    "Worker {} no longer holds job {}; progress not written",
                    self.worker_id, self.job_id
                ),
                Err(e) => warn!("Failed to write progress for job {}: {:#}", self.job_id, e),
            }
        }
        if let Some(bus) = &self.bus {
            bus.publish(Event::WorkforceProgress {
                job_id: self.job_id.clone(),
                percent,
            })
            .await;
        }

        debug!("Job {} progress: {}%", self.job_id, percent);
        progress
    }

    /// Payloads reported so far
    pub async fn iterations(&self) -> Vec<Value> {
        self.iterations.lock().await.clone()
    }
}
