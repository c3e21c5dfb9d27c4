//! Configuration management
//!
//! This module handles loading, validation, and management of the Hive
//! configuration. Configuration is stored in TOML format at
//! ~/.hive/config.toml (or any path given with `--config`).
//!
//! # Configuration Sections
//!
//! - **core**: log level, data directory
//! - **runtime**: default event handler
//! - **pulse**: heartbeat scheduler tick, batch size, lease and logging
//! - **workforce**: queue workers, polling, lease, retries and retention
//! - **llm**: Ollama endpoint backing the `llm`, `planner` and `evaluator` tools
//!
//! Every section and field has a default, so a partial file is valid.
//!
//! # Examples
//!
//! ```no_run
//! use hive_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Database: {:?}", config.database_path());
//! println!("Pulse tick: {}s", config.pulse.tick_secs);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub core: CoreConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub pulse: PulseConfig,

    #[serde(default)]
    pub workforce: WorkforceConfig,

    #[serde(default)]
    pub llm: LLMConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Execution runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Event handler run when the caller names none
    #[serde(default = "default_event")]
    pub default_event: String,
}

/// Pulse Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PulseConfig {
    /// Seconds between ticks
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,

    /// Maximum due jobs claimed per tick
    #[serde(default = "default_batch_limit")]
    pub batch_limit: i64,

    /// How long a claimed job stays invisible to other engines
    #[serde(default = "default_pulse_lease_secs")]
    pub lease_secs: i64,

    /// Write a `failure` row to pulse_logs when a wake fails
    #[serde(default)]
    pub log_failures: bool,

    /// Maximum characters of run output kept in a log row
    #[serde(default = "default_output_limit")]
    pub output_limit: usize,
}

/// Workforce queue configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkforceConfig {
    /// Worker tasks started by `hive serve`
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Idle sleep between empty claims
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Seconds before an unfinished active job is redelivered
    #[serde(default = "default_workforce_lease_secs")]
    pub lease_secs: i64,

    /// Attempts before a job is marked failed
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i64,

    /// Finished queue rows older than this are pruned; run records are kept
    #[serde(default = "default_retention_secs")]
    pub retention_secs: i64,
}

/// Ollama settings for the model-backed tools
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LLMConfig {
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,

    #[serde(default = "default_ollama_model")]
    pub model: String,

    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.hive/data")
}

fn default_event() -> String {
    "input".to_string()
}

fn default_tick_secs() -> u64 {
    60
}

fn default_batch_limit() -> i64 {
    50
}

fn default_pulse_lease_secs() -> i64 {
    300
}

fn default_output_limit() -> usize {
    2000
}

fn default_workers() -> usize {
    1
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_workforce_lease_secs() -> i64 {
    900
}

fn default_max_attempts() -> i64 {
    3
}

fn default_retention_secs() -> i64 {
    86_400
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_llm_timeout_secs() -> u64 {
    300
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_event: default_event(),
        }
    }
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            batch_limit: default_batch_limit(),
            lease_secs: default_pulse_lease_secs(),
            log_failures: false,
            output_limit: default_output_limit(),
        }
    }
}

impl Default for WorkforceConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            poll_interval_ms: default_poll_interval_ms(),
            lease_secs: default_workforce_lease_secs(),
            max_attempts: default_max_attempts(),
            retention_secs: default_retention_secs(),
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            model: default_ollama_model(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.hive/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;
        Self::load_or_create_at(&config_path)
    }

    /// Load configuration from `path`, writing defaults there first if the
    /// file doesn't exist
    pub fn load_or_create_at(path: &Path) -> Result<Self, EngineError> {
        if path.exists() {
            Self::load_from_path(path)
        } else {
            Self::create_default(path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml(&contents)
    }

    /// Parse and validate configuration text
    pub fn from_toml(contents: &str) -> Result<Self, EngineError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        // Serialize before processing so the file keeps the portable `~` form
        let toml_string = toml::to_string_pretty(&Self::default())
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        let mut config = Self::default();
        config.validate_and_process()?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.hive/config.toml)
    pub fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".hive").join("config.toml"))
    }

    /// SQLite database file inside the data directory
    pub fn database_path(&self) -> PathBuf {
        self.core.data_dir.join("hive.db")
    }

    /// Validate and process configuration
    ///
    /// Expands `~` in the data directory and creates it when missing.
    fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        let event = self.runtime.default_event.trim();
        if event.is_empty() || event.contains(char::is_whitespace) {
            return Err(EngineError::Config(format!(
                "Invalid runtime.default_event '{}'",
                self.runtime.default_event
            )));
        }

        if self.pulse.tick_secs == 0 {
            return Err(EngineError::Config(
                "pulse.tick_secs must be greater than 0".to_string(),
            ));
        }
        if self.pulse.batch_limit <= 0 {
            return Err(EngineError::Config(
                "pulse.batch_limit must be greater than 0".to_string(),
            ));
        }
        if self.pulse.lease_secs <= 0 {
            return Err(EngineError::Config(
                "pulse.lease_secs must be greater than 0".to_string(),
            ));
        }
        if self.pulse.output_limit == 0 {
            return Err(EngineError::Config(
                "pulse.output_limit must be greater than 0".to_string(),
            ));
        }

        if self.workforce.workers == 0 {
            return Err(EngineError::Config(
                "workforce.workers must be at least 1".to_string(),
            ));
        }
        if self.workforce.poll_interval_ms == 0 {
            return Err(EngineError::Config(
                "workforce.poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.workforce.lease_secs <= 0 {
            return Err(EngineError::Config(
                "workforce.lease_secs must be greater than 0".to_string(),
            ));
        }
        if self.workforce.max_attempts < 1 {
            return Err(EngineError::Config(
                "workforce.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.workforce.retention_secs < 0 {
            return Err(EngineError::Config(
                "workforce.retention_secs must not be negative".to_string(),
            ));
        }

        if !(self.llm.base_url.starts_with("http://") || self.llm.base_url.starts_with("https://"))
        {
            return Err(EngineError::Config(format!(
                "llm.base_url must be an http(s) URL, got '{}'",
                self.llm.base_url
            )));
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;

        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                EngineError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn with_data_dir(dir: &TempDir, extra: &str) -> String {
        format!(
            "[core]\ndata_dir = \"{}\"\n{}",
            dir.path().join("data").display(),
            extra
        )
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.runtime.default_event, "input");
        assert_eq!(config.pulse.tick_secs, 60);
        assert_eq!(config.pulse.batch_limit, 50);
        assert_eq!(config.pulse.output_limit, 2000);
        assert!(!config.pulse.log_failures);
        assert_eq!(config.workforce.workers, 1);
        assert_eq!(config.workforce.max_attempts, 3);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config =
            Config::from_toml(&with_data_dir(&dir, "[pulse]\ntick_secs = 5\n")).unwrap();

        assert_eq!(config.pulse.tick_secs, 5);
        assert_eq!(config.pulse.batch_limit, 50);
        assert_eq!(config.llm.model, "llama3.1:8b");
        assert!(config.core.data_dir.exists());
        assert_eq!(config.database_path(), dir.path().join("data").join("hive.db"));
    }

    #[test]
    fn test_validation_errors() {
        let dir = TempDir::new().unwrap();

        for bad in [
            "[pulse]\ntick_secs = 0\n",
            "[pulse]\nbatch_limit = 0\n",
            "[workforce]\nworkers = 0\n",
            "[workforce]\nmax_attempts = 0\n",
            "[runtime]\ndefault_event = \"on input\"\n",
            "[llm]\nbase_url = \"localhost:11434\"\n",
        ] {
            let err = Config::from_toml(&with_data_dir(&dir, bad)).unwrap_err();
            assert!(matches!(err, EngineError::Config(_)), "{}", bad);
        }

        let err = Config::from_toml("[core]\nlog_level = \"loud\"\n").unwrap_err();
        assert!(err.to_string().contains("Invalid log level"));
    }

    #[test]
    fn test_load_or_create_at_reads_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, with_data_dir(&dir, "[workforce]\nworkers = 4\n")).unwrap();

        let config = Config::load_or_create_at(&path).unwrap();
        assert_eq!(config.workforce.workers, 4);
        assert_eq!(config, Config::load_from_path(&path).unwrap());
    }

    #[test]
    fn test_default_file_round_trips() {
        let text = toml::to_string_pretty(&Config::default()).unwrap();
        assert!(text.contains("~/.hive/data"));
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let expanded = expand_path(&PathBuf::from("~/test")).unwrap();
        assert_eq!(expanded, dirs::home_dir().unwrap().join("test"));
    }

    #[test]
    fn test_expand_path_without_tilde() {
        let path = PathBuf::from("/absolute/path");
        assert_eq!(expand_path(&path).unwrap(), path);
    }
}
