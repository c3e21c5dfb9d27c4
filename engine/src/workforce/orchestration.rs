//! Orchestrations a workforce worker drives

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::ProgressReporter;
use crate::db::{BotRepository, QueuedJob};
use crate::queen::{QueenBee, SubTask, SubTaskStatus, WorkerBot};
use crate::runtime::{ExecuteOptions, ExecutionInput, Runtime};
use crate::tools::ToolRegistry;
use sdk::tool::{ToolContext, ToolMetadata};

/// A multi-iteration routine run for one queued job
///
/// Implementations report each iteration through the reporter and return
/// the job result. Returning `Err` hands the job to the queue's failure
/// path (retry or final failure).
#[async_trait]
pub trait Orchestration: Send + Sync {
    async fn run(
        &self,
        job: &QueuedJob,
        ctx: &ToolContext,
        reporter: &ProgressReporter,
    ) -> Result<Value>;
}

/// Queen Bee driven orchestration.
///
/// The request is decomposed into subtasks, each subtask is assigned to one
/// of the requesting user's bots and that bot's HiveLang program runs with
/// the subtask description as input. Every subtask is one iteration.
pub struct HiveOrchestration {
    queen: QueenBee,
    bots: BotRepository,
    runtime: Runtime,
    tools: ToolRegistry,
}

impl HiveOrchestration {
    /// `tools` serves both the Queen Bee (planner, evaluator) and the
    /// worker programs' `call` instructions
    pub fn new(bots: BotRepository, runtime: Runtime, tools: ToolRegistry) -> Self {
        Self {
            queen: QueenBee::new(tools.clone()),
            bots,
            runtime,
            tools,
        }
    }

    async fn run_subtask(
        &self,
        job: &QueuedJob,
        task: &mut SubTask,
        workers: &[WorkerBot],
        ctx: &ToolContext,
    ) -> Result<()> {
        let Some(worker) = self.queen.assign_worker(task, workers, ctx).await else {
            task.fail(format!("No worker offers '{}'", task.required_capability));
            return Ok(());
        };
        task.assign(&worker.id);

        let Some(bot) = self.bots.get_bot(&worker.id).await? else {
            task.fail(format!("Bot not found: {}", worker.id));
            return Ok(());
        };

        let worker_ctx = ToolContext::new(
            ToolMetadata::new(&bot.id, &ctx.metadata.run_id, &job.user_id)
                .with_system_prompt(bot.system_prompt.clone()),
            Arc::clone(&ctx.shared_memory),
        );
        let input = ExecutionInput::new(&task.description)
            .with("goal", job.request.as_str())
            .with("task_id", task.id.as_str());

        debug!("Subtask {} runs on bot '{}'", task.id, bot.name);
        let result = self
            .runtime
            .execute(
                bot.hivelang_code.into(),
                &input,
                &self.tools,
                &worker_ctx,
                &ExecuteOptions::default(),
            )
            .await;

        if result.success {
            task.complete(result.output);
        } else {
            task.fail(result.error.unwrap_or_else(|| "Execution failed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Orchestration for HiveOrchestration {
    async fn run(
        &self,
        job: &QueuedJob,
        ctx: &ToolContext,
        reporter: &ProgressReporter,
    ) -> Result<Value> {
        let mut tasks = self.queen.decompose(&job.request, ctx).await;
        let workers: Vec<WorkerBot> = self
            .bots
            .list_for_user(&job.user_id)
            .await
            .context("Failed to load worker bots")?
            .iter()
            .map(WorkerBot::from)
            .collect();

        info!(
            "Job {}: {} subtasks across {} candidate workers",
            job.id,
            tasks.len(),
            workers.len()
        );

        let total = tasks.len();
        for (index, task) in tasks.iter_mut().enumerate() {
            self.run_subtask(job, task, &workers, ctx).await?;
            reporter
                .on_iteration(serde_json::to_value(&*task)?, index, total)
                .await;
        }

        let completed: Vec<&str> = tasks
            .iter()
            .filter(|t| t.status == SubTaskStatus::Completed)
            .filter_map(|t| t.result.as_deref())
            .collect();

        if completed.is_empty() {
            warn!("Job {}: no subtask completed", job.id);
            let reasons: Vec<&str> = tasks.iter().filter_map(|t| t.result.as_deref()).collect();
            anyhow::bail!("No subtask completed: {}", reasons.join("; "));
        }

        Ok(json!({
            "goal": job.request,
            "output": completed.join("\n"),
            "subtasks": tasks,
        }))
    }
}
