// Hive bot engine
// Main entry point for the hive binary

use clap::Parser;
use hive_engine::cli::{BotsAction, Cli, Command, PulseAction, WorkforceAction};
use hive_engine::config::Config;
use hive_engine::handlers::{self, OutputFormat};
use hive_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log beats the configured level; RUST_LOG beats both
    init_telemetry_with_level(cli.log.as_deref().unwrap_or(&config.core.log_level));
    tracing::debug!("Hive Engine v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Compile { file } => handlers::handle_compile(&file, format).await,

        Command::Run {
            file,
            input,
            block,
            event,
        } => handlers::handle_run(&file, input, block, event, &config, format).await,

        Command::Bots { action } => match action {
            BotsAction::Add {
                file,
                user,
                name,
                capabilities,
                system_prompt,
            } => {
                handlers::handle_bots_add(
                    &file,
                    user,
                    name,
                    capabilities,
                    system_prompt,
                    &config,
                    format,
                )
                .await
            }
            BotsAction::List { user } => handlers::handle_bots_list(user, &config, format).await,
            BotsAction::Remove { bot_id } => handlers::handle_bots_remove(&bot_id, &config).await,
        },

        Command::Pulse { action } => match action {
            PulseAction::Add {
                bot_id,
                trigger,
                interval,
            } => handlers::handle_pulse_add(bot_id, &trigger, interval, &config, format).await,
            PulseAction::List => handlers::handle_pulse_list(&config, format).await,
            PulseAction::Logs { job, limit } => {
                handlers::handle_pulse_logs(job, limit, &config, format).await
            }
            PulseAction::Tick => handlers::handle_pulse_tick(&config, format).await,
            PulseAction::Rearm { job_id } => handlers::handle_pulse_rearm(&job_id, &config).await,
            PulseAction::Pause { job_id } => {
                handlers::handle_pulse_set_active(&job_id, false, &config).await
            }
            PulseAction::Resume { job_id } => {
                handlers::handle_pulse_set_active(&job_id, true, &config).await
            }
        },

        Command::Workforce { action } => match action {
            WorkforceAction::Submit { request, user } => {
                handlers::handle_workforce_submit(&request, &user, &config, format).await
            }
            WorkforceAction::Status { job_id } => {
                handlers::handle_workforce_status(&job_id, &config, format).await
            }
            WorkforceAction::Drain => handlers::handle_workforce_drain(&config).await,
        },

        Command::Serve => handlers::handle_serve(&config).await,
    }
}
