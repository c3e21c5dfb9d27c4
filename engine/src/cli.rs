//! CLI interface for Hive
//!
//! This module defines the `hive` command line using clap's derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Hive bot engine
///
/// Compile and run HiveLang bots, schedule them with the Pulse Engine and
/// queue heavy requests on the workforce.
#[derive(Parser, Debug)]
#[command(name = "hive")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile a HiveLang file and print its blocks
    Compile {
        /// Path to the .hive source
        file: PathBuf,
    },

    /// Execute a HiveLang file once
    Run {
        /// Path to the .hive source
        file: PathBuf,

        /// Input text for the run
        #[arg(short, long, default_value = "")]
        input: String,

        /// Block to run (defaults to the first bot or agent)
        #[arg(short, long)]
        block: Option<String>,

        /// Event handler to run (defaults to `runtime.default_event`)
        #[arg(short, long)]
        event: Option<String>,
    },

    /// Manage stored bots
    Bots {
        #[command(subcommand)]
        action: BotsAction,
    },

    /// Manage pulse jobs
    Pulse {
        #[command(subcommand)]
        action: PulseAction,
    },

    /// Submit and inspect workforce jobs
    Workforce {
        #[command(subcommand)]
        action: WorkforceAction,
    },

    /// Run the Pulse Engine and workforce workers until Ctrl-C
    Serve,
}

/// Bot storage actions
#[derive(Subcommand, Debug)]
pub enum BotsAction {
    /// Store a bot from a HiveLang file
    Add {
        /// Path to the .hive source
        file: PathBuf,

        /// Owning user
        #[arg(short, long, default_value = "local")]
        user: String,

        /// Bot name (defaults to the first block's name)
        #[arg(short, long)]
        name: Option<String>,

        /// Capability tags, repeatable
        #[arg(short, long = "capability", value_name = "CAPABILITY")]
        capabilities: Vec<String>,

        /// System prompt passed to LLM tools
        #[arg(long)]
        system_prompt: Option<String>,
    },

    /// List stored bots
    List {
        /// Only bots of this user
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Delete a stored bot
    Remove {
        /// Bot ID
        bot_id: String,
    },
}

/// Pulse job actions
#[derive(Subcommand, Debug)]
pub enum PulseAction {
    /// Schedule a bot
    Add {
        /// Bot ID
        bot_id: String,

        /// Trigger type (schedule, event, webhook)
        #[arg(short, long, default_value = "schedule")]
        trigger: String,

        /// Interval in seconds for schedule triggers
        #[arg(short, long)]
        interval: Option<i64>,
    },

    /// List pulse jobs
    List,

    /// Show recent pulse logs
    Logs {
        /// Only logs of this job
        #[arg(long)]
        job: Option<String>,

        /// Number of rows to show
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Run one pulse now
    Tick,

    /// Make an event or webhook job due again
    Rearm {
        /// Job ID
        job_id: String,
    },

    /// Pause a job
    Pause {
        /// Job ID
        job_id: String,
    },

    /// Resume a paused job
    Resume {
        /// Job ID
        job_id: String,
    },
}

/// Workforce actions
#[derive(Subcommand, Debug)]
pub enum WorkforceAction {
    /// Enqueue a request
    Submit {
        /// The request text
        request: String,

        /// Requesting user
        #[arg(short, long, default_value = "local")]
        user: String,
    },

    /// Show a job's status
    Status {
        /// Job ID
        job_id: String,
    },

    /// Process queued jobs in the foreground until the queue is empty
    Drain,
}
