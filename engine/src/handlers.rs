//! Command handlers for CLI operations
//!
//! Each handler opens what it needs from the configuration (database, tool
//! registry, runtime), performs one command and prints the result as text
//! or JSON. `handle_serve` is the long-running composition root that owns
//! the Pulse Engine and the workforce pool.

use anyhow::{Context, Result};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::db::{now_secs, Database, NewBot, NewPulseJob, TriggerType};
use crate::hivelang::{self, Program};
use crate::llm::{LLMProvider, OllamaProvider};
use crate::memory::InMemoryNamespace;
use crate::message_bus::{Event, MessageBus};
use crate::pulse::PulseEngine;
use crate::runtime::{ExecuteOptions, ExecutionInput, ExecutionResult, Runtime};
use crate::tools::{LlmTool, MemoryTool, ToolRegistry};
use crate::workforce::{HiveOrchestration, WorkforcePool, WorkforceService, WorkforceWorker};
use sdk::tool::{ToolContext, ToolMetadata};

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Open the configured database
pub async fn open_database(config: &Config) -> Result<Database> {
    Database::new(&config.database_path())
        .await
        .context("Failed to open database")
}

/// The default tool registry: `llm`, `planner` and `evaluator` backed by the
/// configured Ollama model, plus `memory`
pub fn build_tools(config: &Config) -> ToolRegistry {
    let provider: Arc<dyn LLMProvider> = Arc::new(ollama_provider(config));

    ToolRegistry::empty()
        .with(Arc::new(LlmTool::new(Arc::clone(&provider))))
        .with(Arc::new(LlmTool::planner(Arc::clone(&provider))))
        .with(Arc::new(LlmTool::evaluator(provider)))
        .with(Arc::new(MemoryTool::new()))
}

fn ollama_provider(config: &Config) -> OllamaProvider {
    OllamaProvider::with_timeout(
        config.llm.base_url.clone(),
        config.llm.model.clone(),
        Duration::from_secs(config.llm.timeout_secs),
    )
}

/// A runtime honouring `runtime.default_event`
pub fn build_runtime(config: &Config, bus: Option<&MessageBus>) -> Runtime {
    let runtime = Runtime::new().with_default_event(config.runtime.default_event.clone());
    match bus {
        Some(bus) => runtime.with_message_bus(bus.clone()),
        None => runtime,
    }
}

/// The Pulse Engine every entry point runs: default tools and runtime, plus
/// the bus when one is given
pub fn build_pulse_engine(db: &Database, config: &Config, bus: Option<&MessageBus>) -> PulseEngine {
    let engine = PulseEngine::new(db, build_runtime(config, bus), config.pulse.clone())
        .with_tools(build_tools(config));
    match bus {
        Some(bus) => engine.with_message_bus(bus.clone()),
        None => engine,
    }
}

async fn read_source(file: &Path) -> Result<String> {
    tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn format_time(secs: Option<i64>) -> String {
    secs.and_then(|s| chrono::DateTime::from_timestamp(s, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Compile a file and print its blocks
pub async fn handle_compile(file: &Path, format: OutputFormat) -> Result<()> {
    let source = read_source(file).await?;
    let output = hivelang::compile(&source);

    match format {
        OutputFormat::Json => print_json(&output)?,
        OutputFormat::Text => {
            if let Some(error) = &output.error {
                println!("Compile failed: {}", error);
            } else if output.blocks.is_empty() {
                println!("No blocks");
            } else {
                for block in &output.blocks {
                    println!("{} \"{}\"", block.kind.as_str(), block.name);
                    if let Some(description) = &block.description {
                        println!("  {}", description);
                    }
                    for (event, instructions) in &block.events {
                        println!("  on {} ({} instructions)", event, instructions.len());
                    }
                }
            }
        }
    }

    if output.success {
        Ok(())
    } else {
        anyhow::bail!("Compilation failed")
    }
}

fn print_execution(result: &ExecutionResult, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(result),
        OutputFormat::Text => {
            for step in &result.steps {
                println!("> {} {}", step.action, step.action_input);
                println!("  {}", step.observation);
            }
            if !result.output.is_empty() {
                println!("{}", result.output);
            }
            if let Some(error) = &result.error {
                println!("Error: {}", error);
            }
            Ok(())
        }
    }
}

/// Execute a file once with an ephemeral shared memory
pub async fn handle_run(
    file: &Path,
    input: String,
    block: Option<String>,
    event: Option<String>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let source = read_source(file).await?;
    let run_id = format!("cli_{}", uuid::Uuid::new_v4());
    let ctx = ToolContext::new(
        ToolMetadata::new("cli", &run_id, "local"),
        Arc::new(InMemoryNamespace::ephemeral(&run_id)),
    );

    let result = build_runtime(config, None)
        .execute(
            source.into(),
            &ExecutionInput::new(input),
            &build_tools(config),
            &ctx,
            &ExecuteOptions { block, event },
        )
        .await;

    print_execution(&result, format)?;
    if result.success {
        Ok(())
    } else {
        anyhow::bail!("Run failed")
    }
}

/// Store a bot; the source must compile
pub async fn handle_bots_add(
    file: &Path,
    user: String,
    name: Option<String>,
    capabilities: Vec<String>,
    system_prompt: Option<String>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let source = read_source(file).await?;
    let program: Program = hivelang::parse(&source)?;
    let block = program.select_block(name.as_deref())?;

    let db = open_database(config).await?;
    let bot = db
        .bots()
        .create_bot(NewBot {
            user_id: user,
            name: block.name.clone(),
            description: block.description.clone().unwrap_or_default(),
            capabilities,
            hivelang_code: source,
            system_prompt,
        })
        .await?;

    match format {
        OutputFormat::Json => print_json(&bot)?,
        OutputFormat::Text => println!("Stored bot '{}' ({})", bot.name, bot.id),
    }
    Ok(())
}

pub async fn handle_bots_list(
    user: Option<String>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let db = open_database(config).await?;
    let bots = match &user {
        Some(user) => db.bots().list_for_user(user).await?,
        None => db.bots().list_all().await?,
    };

    match format {
        OutputFormat::Json => print_json(&json!({ "bots": bots, "count": bots.len() }))?,
        OutputFormat::Text => {
            if bots.is_empty() {
                println!("No bots stored");
            }
            for bot in &bots {
                println!("{}  {}  [{}]", bot.id, bot.name, bot.capabilities.join(", "));
                if !bot.description.is_empty() {
                    println!("  {}", bot.description);
                }
            }
        }
    }
    Ok(())
}

pub async fn handle_bots_remove(bot_id: &str, config: &Config) -> Result<()> {
    let db = open_database(config).await?;
    if db.bots().delete_bot(bot_id).await? {
        println!("Removed bot {}", bot_id);
        Ok(())
    } else {
        anyhow::bail!("Bot not found: {}", bot_id)
    }
}

pub async fn handle_pulse_add(
    bot_id: String,
    trigger: &str,
    interval: Option<i64>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let trigger_type: TriggerType = trigger.parse()?;
    let db = open_database(config).await?;

    if db.bots().get_bot(&bot_id).await?.is_none() {
        anyhow::bail!("Bot not found: {}", bot_id);
    }

    let trigger_config = match interval {
        Some(secs) => json!({ "interval_seconds": secs }),
        None => json!({}),
    };
    let job = db
        .pulse_jobs()
        .create_job(NewPulseJob {
            bot_id,
            trigger_type,
            trigger_config,
            next_run: None,
        })
        .await?;

    match format {
        OutputFormat::Json => print_json(&job)?,
        OutputFormat::Text => println!("Created {} pulse job {}", job.trigger_type, job.id),
    }
    Ok(())
}

pub async fn handle_pulse_list(config: &Config, format: OutputFormat) -> Result<()> {
    let db = open_database(config).await?;
    let jobs = db.pulse_jobs().list_jobs().await?;

    match format {
        OutputFormat::Json => print_json(&json!({ "jobs": jobs, "count": jobs.len() }))?,
        OutputFormat::Text => {
            if jobs.is_empty() {
                println!("No pulse jobs");
            }
            for job in &jobs {
                println!(
                    "{}  bot={}  {}  {}  last={}  next={}",
                    job.id,
                    job.bot_id,
                    job.trigger_type,
                    if job.is_active { "active" } else { "paused" },
                    format_time(job.last_run),
                    format_time(job.next_run)
                );
            }
        }
    }
    Ok(())
}

pub async fn handle_pulse_logs(
    job: Option<String>,
    limit: i64,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let db = open_database(config).await?;
    let logs = db.pulse_jobs().recent_logs(job.as_deref(), limit).await?;

    match format {
        OutputFormat::Json => print_json(&json!({ "logs": logs, "count": logs.len() }))?,
        OutputFormat::Text => {
            if logs.is_empty() {
                println!("No pulse logs");
            }
            for log in &logs {
                println!(
                    "{}  job={}  {:?}  {}ms",
                    format_time(Some(log.created_at)),
                    log.job_id,
                    log.status,
                    log.execution_time_ms
                );
                if !log.output.is_empty() {
                    println!("  {}", log.output);
                }
            }
        }
    }
    Ok(())
}

/// Run one pulse in the foreground
pub async fn handle_pulse_tick(config: &Config, format: OutputFormat) -> Result<()> {
    let db = open_database(config).await?;
    let report = build_pulse_engine(&db, config, None).pulse().await?;

    match format {
        OutputFormat::Json => print_json(&json!({
            "due": report.due,
            "succeeded": report.succeeded,
            "failed": report.failed,
        }))?,
        OutputFormat::Text => println!(
            "Pulse: {} due, {} succeeded, {} failed",
            report.due, report.succeeded, report.failed
        ),
    }
    Ok(())
}

pub async fn handle_pulse_rearm(job_id: &str, config: &Config) -> Result<()> {
    let db = open_database(config).await?;
    if db.pulse_jobs().rearm(job_id, now_secs()).await? {
        println!("Pulse job {} is due", job_id);
        Ok(())
    } else {
        anyhow::bail!("Pulse job not found: {}", job_id)
    }
}

pub async fn handle_pulse_set_active(job_id: &str, active: bool, config: &Config) -> Result<()> {
    let db = open_database(config).await?;
    if db.pulse_jobs().set_active(job_id, active).await? {
        println!(
            "Pulse job {} {}",
            job_id,
            if active { "resumed" } else { "paused" }
        );
        Ok(())
    } else {
        anyhow::bail!("Pulse job not found: {}", job_id)
    }
}

pub async fn handle_workforce_submit(
    request: &str,
    user: &str,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let db = open_database(config).await?;
    let job = WorkforceService::new(&db, config.workforce.clone())
        .submit(user, request)
        .await?;

    match format {
        OutputFormat::Json => print_json(&job)?,
        OutputFormat::Text => println!("Queued workforce job {}", job.id),
    }
    Ok(())
}

pub async fn handle_workforce_status(
    job_id: &str,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let db = open_database(config).await?;
    let status = WorkforceService::new(&db, config.workforce.clone())
        .get_status(job_id)
        .await?;

    match format {
        OutputFormat::Json => print_json(&status)?,
        OutputFormat::Text => {
            println!("Job {}: {}", status.id, status.status);
            if let Some(percent) = status.progress {
                println!("  Progress: {}%", percent);
            }
            if let Some(error) = &status.error {
                println!("  Error: {}", error);
            }
            if let Some(output) = status.result.as_ref().and_then(|r| r.get("output")) {
                println!("  Output: {}", output.as_str().unwrap_or_default());
            }
        }
    }
    Ok(())
}

/// Process queued jobs in the foreground until none is claimable
pub async fn handle_workforce_drain(config: &Config) -> Result<()> {
    let db = open_database(config).await?;
    let tools = build_tools(config);
    let orchestration = Arc::new(HiveOrchestration::new(
        db.bots(),
        build_runtime(config, None),
        tools,
    ));
    let worker = WorkforceWorker::new(&db, orchestration, config.workforce.clone());

    let mut processed = 0;
    while worker.run_once().await? {
        processed += 1;
    }
    println!("Processed {} workforce jobs", processed);
    Ok(())
}

/// Run the Pulse Engine and the workforce pool until Ctrl-C
pub async fn handle_serve(config: &Config) -> Result<()> {
    let db = open_database(config).await?;
    let bus = MessageBus::new();

    // Model-backed calls fail per call, so an absent Ollama is not fatal
    if !ollama_provider(config).check_health().await {
        tracing::warn!(
            "Ollama is not reachable at {}; llm, planner and evaluator calls will fail",
            config.llm.base_url
        );
    }
    let pulse = build_pulse_engine(&db, config, Some(&bus));

    let orchestration = Arc::new(HiveOrchestration::new(
        db.bots(),
        build_runtime(config, Some(&bus)),
        build_tools(config),
    ));
    let pool = WorkforcePool::start(
        &db,
        orchestration,
        config.workforce.clone(),
        Some(bus.clone()),
    );

    pulse.start().await;
    bus.publish(Event::EngineStarted).await;
    tracing::info!("Hive engine running; press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    tracing::info!("Shutting down");
    bus.publish(Event::EngineStopping).await;
    pulse.stop().await;
    pool.shutdown().await;
    db.close().await?;

    Ok(())
}
