//! Queue workers
//!
//! A worker loops claim → process → idle sleep until its shutdown flag is
//! set. Delivery is at-least-once: a worker that dies mid-job leaves an
//! `active` row whose lease eventually expires and is claimed again.

use anyhow::Result;
use serde_json::json;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{Orchestration, ProgressReporter};
use crate::config::WorkforceConfig;
use crate::db::{
    now_secs, Database, QueueState, QueuedJob, WorkforceQueueRepository, WorkforceRunRepository,
};
use crate::memory::SqliteMemory;
use crate::message_bus::{Event, MessageBus};
use sdk::tool::{ToolContext, ToolMetadata};

/// Bot id recorded in the tool context of a workforce job
pub const WORKFORCE_BOT_ID: &str = "workforce";

/// How often the pool prunes finished queue rows
const PRUNE_INTERVAL: Duration = Duration::from_secs(3600);

/// One queue consumer
pub struct WorkforceWorker {
    id: String,
    queue: WorkforceQueueRepository,
    runs: WorkforceRunRepository,
    pool: SqlitePool,
    orchestration: Arc<dyn Orchestration>,
    config: WorkforceConfig,
    bus: Option<MessageBus>,
}

impl WorkforceWorker {
    pub fn new(
        db: &Database,
        orchestration: Arc<dyn Orchestration>,
        config: WorkforceConfig,
    ) -> Self {
        Self {
            id: format!("worker-{}", uuid::Uuid::new_v4()),
            queue: db.workforce_queue(),
            runs: db.workforce_runs(),
            pool: db.pool().clone(),
            orchestration,
            config,
            bus: None,
        }
    }

    pub fn with_message_bus(mut self, bus: MessageBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Consume jobs until `shutdown` is set
    pub async fn run(&self, shutdown: Arc<AtomicBool>) {
        info!("Workforce worker {} started", self.id);
        let idle = Duration::from_millis(self.config.poll_interval_ms.max(10));

        while !shutdown.load(Ordering::Relaxed) {
            match self.run_once().await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => error!("Worker {} failed to process queue: {:#}", self.id, e),
            }
            tokio::time::sleep(idle).await;
        }

        info!("Workforce worker {} stopped", self.id);
    }

    /// Claim and process at most one job. Returns whether a job was claimed.
    pub async fn run_once(&self) -> Result<bool> {
        let Some(job) = self
            .queue
            .claim(&self.id, now_secs(), self.config.lease_secs)
            .await?
        else {
            return Ok(false);
        };

        self.process(job).await?;
        Ok(true)
    }

    async fn process(&self, job: QueuedJob) -> Result<()> {
        info!(
            "Worker {} processing job {} (attempt {}/{})",
            self.id, job.id, job.attempts, job.max_attempts
        );

        // A fresh namespace per job; redeliveries see the previous attempt's writes
        let ctx = ToolContext::new(
            ToolMetadata::new(WORKFORCE_BOT_ID, &job.id, &job.user_id),
            Arc::new(SqliteMemory::new(self.pool.clone(), job.id.clone())),
        );
        let reporter =
            ProgressReporter::new(&job.id, &self.id, self.queue.clone(), self.bus.clone());

        match self.orchestration.run(&job, &ctx, &reporter).await {
            Ok(result) => {
                if !self.queue.complete(&job.id, &self.id, &result).await? {
                    warn!(
                        "Worker {} lost the lease on job {}; dropping its result",
                        self.id, job.id
                    );
                    return Ok(());
                }
                self.runs
                    .upsert(&job.id, &job.user_id, &job.request, Some(&result), "completed")
                    .await?;
                info!("Job {} completed", job.id);
                self.publish_finished(&job.id, QueueState::Completed).await;
            }
            Err(e) => {
                let message = format!("{:#}", e);
                let Some(state) = self.queue.fail(&job.id, &self.id, &message).await? else {
                    warn!(
                        "Worker {} lost the lease on job {}; dropping its failure: {}",
                        self.id, job.id, message
                    );
                    return Ok(());
                };
                self.runs
                    .upsert(
                        &job.id,
                        &job.user_id,
                        &job.request,
                        Some(&json!({ "error": message })),
                        QueueState::Failed.as_str(),
                    )
                    .await?;

                if state == QueueState::Failed {
                    warn!("Job {} failed permanently: {}", job.id, message);
                    self.publish_finished(&job.id, state).await;
                } else {
                    debug!("Job {} failed, will retry: {}", job.id, message);
                }
            }
        }

        Ok(())
    }

    async fn publish_finished(&self, job_id: &str, state: QueueState) {
        if let Some(bus) = &self.bus {
            bus.publish(Event::WorkforceFinished {
                job_id: job_id.to_string(),
                status: state.as_str().to_string(),
            })
            .await;
        }
    }
}

/// A set of workers sharing one shutdown flag
pub struct WorkforcePool {
    shutdown: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkforcePool {
    /// Spawn `config.workers` workers plus a task pruning finished rows
    /// older than `config.retention_secs`
    pub fn start(
        db: &Database,
        orchestration: Arc<dyn Orchestration>,
        config: WorkforceConfig,
        bus: Option<MessageBus>,
    ) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::with_capacity(config.workers + 1);

        for _ in 0..config.workers.max(1) {
            let mut worker = WorkforceWorker::new(db, Arc::clone(&orchestration), config.clone());
            if let Some(bus) = &bus {
                worker = worker.with_message_bus(bus.clone());
            }
            let flag = Arc::clone(&shutdown);
            handles.push(tokio::spawn(async move { worker.run(flag).await }));
        }

        let queue = db.workforce_queue();
        let retention = config.retention_secs;
        let flag = Arc::clone(&shutdown);
        handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(PRUNE_INTERVAL);
            while !flag.load(Ordering::Relaxed) {
                interval.tick().await;
                match queue.prune_finished(now_secs() - retention).await {
                    Ok(0) => {}
                    Ok(n) => info!("Pruned {} finished workforce jobs", n),
                    Err(e) => warn!("Failed to prune workforce queue: {:#}", e),
                }
            }
        }));

        info!("Workforce pool started with {} workers", config.workers.max(1));
        Self { shutdown, handles }
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.load(Ordering::Relaxed)
    }

    /// Signal every worker and wait for them to finish their current job
    pub async fn shutdown(self) {
        self.shutdown.store(true, Ordering::Relaxed);
        let mut handles = self.handles;

        // The pruning task is always last
        if let Some(janitor) = handles.pop() {
            janitor.abort();
        }
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Workforce worker ended abnormally: {}", e);
            }
        }
        info!("Workforce pool stopped");
    }
}
