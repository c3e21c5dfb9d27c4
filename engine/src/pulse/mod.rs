//! Pulse Engine
//!
//! A heartbeat scheduler that wakes bots whose pulse jobs are due. The engine
//! is an explicit service object with two states:
//!
//! ```text
//! stopped --start()--> running --stop()--> stopped
//! ```
//!
//! `start()` runs one pulse immediately and then one per `pulse.tick_secs`.
//! Each pulse claims up to `pulse.batch_limit` due jobs with a lease, so two
//! engines sharing a database never wake the same job at the same time, and
//! wakes the claimed jobs concurrently.
//!
//! A successful wake advances the schedule and writes a `success` log row. A
//! failed wake only releases the lease: the job stays due and is retried on
//! the next tick. Failure rows are written only when `pulse.log_failures` is
//! enabled.

pub mod schedule;

pub use schedule::{compute_next_run, interval_secs};

use anyhow::{Context, Result};
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::PulseConfig;
use crate::db::{BotRepository, Database, PulseJob, PulseJobRepository, PulseLogStatus};
use crate::memory::InMemoryNamespace;
use crate::message_bus::{Event, MessageBus};
use crate::runtime::{ExecuteOptions, ExecutionInput, Runtime};
use crate::tools::ToolRegistry;
use sdk::tool::{ToolContext, ToolMetadata};

/// Input text every pulse wake receives
pub const PULSE_TRIGGER: &str = "PULSE_TRIGGER";

/// Event handler a pulse wake runs (falls back to the default handler)
pub const PULSE_EVENT: &str = "pulse";

/// Scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseState {
    Stopped,
    Running,
}

/// Summary of one pulse
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PulseReport {
    pub due: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Outcome of waking one job
#[derive(Debug, Clone)]
struct WakeOutcome {
    success: bool,
    output: String,
    elapsed_ms: i64,
}

/// Everything a pulse needs; shared with the timer task
#[derive(Clone)]
struct PulseCore {
    engine_id: String,
    jobs: PulseJobRepository,
    bots: BotRepository,
    runtime: Runtime,
    tools: ToolRegistry,
    config: PulseConfig,
    bus: Option<MessageBus>,
}

/// The heartbeat scheduler
pub struct PulseEngine {
    core: Arc<PulseCore>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PulseEngine {
    /// Create a stopped engine over the database's pulse jobs and bots.
    ///
    /// Wakes run with an empty tool registry unless [`PulseEngine::with_tools`]
    /// provides one.
    pub fn new(db: &Database, runtime: Runtime, config: PulseConfig) -> Self {
        Self {
            core: Arc::new(PulseCore {
                engine_id: format!("pulse-{}", uuid::Uuid::new_v4()),
                jobs: db.pulse_jobs(),
                bots: db.bots(),
                runtime,
                tools: ToolRegistry::empty(),
                config,
                bus: None,
            }),
            task: Mutex::new(None),
        }
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        Arc::make_mut(&mut self.core).tools = tools;
        self
    }

    pub fn with_message_bus(mut self, bus: MessageBus) -> Self {
        Arc::make_mut(&mut self.core).bus = Some(bus);
        self
    }

    /// Claimer id written to `pulse_jobs.claimed_by`
    pub fn engine_id(&self) -> &str {
        &self.core.engine_id
    }

    pub async fn state(&self) -> PulseState {
        match self.task.lock().await.as_ref() {
            Some(handle) if !handle.is_finished() => PulseState::Running,
            _ => PulseState::Stopped,
        }
    }

    /// Start ticking. Returns `false` if the engine was already running.
    pub async fn start(&self) -> bool {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|h| !h.is_finished()) {
            debug!("Pulse engine {} already running", self.core.engine_id);
            return false;
        }

        let core = Arc::clone(&self.core);
        let period = Duration::from_secs(core.config.tick_secs.max(1));
        info!(
            "Starting pulse engine {} (tick every {}s)",
            core.engine_id,
            period.as_secs()
        );

        *task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                // The first tick completes immediately
                interval.tick().await;
                if let Err(e) = core.pulse().await {
                    error!("Pulse failed: {:#}", e);
                }
            }
        }));

        true
    }

    /// Stop ticking. Returns `false` if the engine was not running.
    ///
    /// A pulse in flight is cancelled; jobs it had claimed become due again
    /// once their lease expires.
    pub async fn stop(&self) -> bool {
        let mut task = self.task.lock().await;
        match task.take() {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                info!("Stopped pulse engine {}", self.core.engine_id);
                true
            }
            _ => false,
        }
    }

    /// Run one pulse now, independently of the timer
    pub async fn pulse(&self) -> Result<PulseReport> {
        self.core.pulse().await
    }
}

impl Drop for PulseEngine {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.abort();
        }
    }
}

/// Keep at most `limit` characters
fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

impl PulseCore {
    async fn pulse(&self) -> Result<PulseReport> {
        let now = crate::db::now_secs();
        let jobs = self
            .jobs
            .claim_due_jobs(
                &self.engine_id,
                now,
                self.config.batch_limit,
                self.config.lease_secs,
            )
            .await
            .context("Failed to claim due pulse jobs")?;

        self.publish(Event::Pulse {
            timestamp: now,
            due: jobs.len(),
        })
        .await;

        if jobs.is_empty() {
            debug!("Pulse: no due jobs");
            return Ok(PulseReport::default());
        }

        info!("Pulse: waking {} due jobs", jobs.len());

        let outcomes = join_all(jobs.iter().map(|job| self.process(job, now))).await;

        let succeeded = outcomes.iter().filter(|ok| **ok).count();
        Ok(PulseReport {
            due: jobs.len(),
            succeeded,
            failed: jobs.len() - succeeded,
        })
    }

    /// Wake one job and persist the outcome. Returns whether the wake succeeded.
    async fn process(&self, job: &PulseJob, now: i64) -> bool {
        let outcome = self.wake(job, now).await;

        let persisted = if outcome.success {
            self.record_success(job, now, &outcome).await
        } else {
            warn!("Pulse job {} failed: {}", job.id, outcome.output);
            self.record_failure(job, &outcome).await
        };
        if let Err(e) = persisted {
            error!("Failed to persist pulse job {} outcome: {:#}", job.id, e);
        }

        self.publish(Event::Wake {
            job_id: job.id.clone(),
            bot_id: job.bot_id.clone(),
            success: outcome.success,
            execution_time_ms: outcome.elapsed_ms,
        })
        .await;

        outcome.success
    }

    async fn wake(&self, job: &PulseJob, now: i64) -> WakeOutcome {
        let started = Instant::now();
        let elapsed = |started: Instant| started.elapsed().as_millis() as i64;

        let bot = match self.bots.get_bot(&job.bot_id).await {
            Ok(Some(bot)) => bot,
            Ok(None) => {
                return WakeOutcome {
                    success: false,
                    output: format!("Bot not found: {}", job.bot_id),
                    elapsed_ms: elapsed(started),
                }
            }
            Err(e) => {
                return WakeOutcome {
                    success: false,
                    output: format!("Failed to load bot {}: {:#}", job.bot_id, e),
                    elapsed_ms: elapsed(started),
                }
            }
        };

        let run_id = format!("pulse_{}_{}", job.id, now);
        let ctx = ToolContext::new(
            ToolMetadata::new(&bot.id, &run_id, &bot.user_id)
                .with_system_prompt(bot.system_prompt.clone()),
            Arc::new(InMemoryNamespace::ephemeral(&run_id)),
        );
        let input = ExecutionInput::new(PULSE_TRIGGER)
            .with("trigger", job.trigger_type.as_str())
            .with("trigger_config", job.trigger_config.clone())
            .with("timestamp", now);

        debug!("Waking bot '{}' for pulse job {}", bot.name, job.id);
        let result = self
            .runtime
            .execute(
                bot.hivelang_code.into(),
                &input,
                &self.tools,
                &ctx,
                &ExecuteOptions::event(PULSE_EVENT),
            )
            .await;

        WakeOutcome {
            success: result.success,
            output: if result.success {
                result.output
            } else {
                result.error.unwrap_or_default()
            },
            elapsed_ms: elapsed(started),
        }
    }

    async fn record_success(&self, job: &PulseJob, now: i64, outcome: &WakeOutcome) -> Result<()> {
        let next_run = compute_next_run(job.trigger_type, &job.trigger_config, now);
        self.jobs
            .record_success(&job.id, &self.engine_id, now, next_run)
            .await?;
        self.jobs
            .insert_log(
                &job.id,
                &job.bot_id,
                PulseLogStatus::Success,
                &truncate_chars(&outcome.output, self.config.output_limit),
                outcome.elapsed_ms,
            )
            .await?;
        debug!("Pulse job {} next run: {:?}", job.id, next_run);
        Ok(())
    }

    async fn record_failure(&self, job: &PulseJob, outcome: &WakeOutcome) -> Result<()> {
        self.jobs.release_claim(&job.id, &self.engine_id).await?;
        if self.config.log_failures {
            self.jobs
                .insert_log(
                    &job.id,
                    &job.bot_id,
                    PulseLogStatus::Failure,
                    &truncate_chars(&outcome.output, self.config.output_limit),
                    outcome.elapsed_ms,
                )
                .await?;
        }
        Ok(())
    }

    async fn publish(&self, event: Event) {
        if let Some(bus) = &self.bus {
            bus.publish(event).await;
        }
    }
}
