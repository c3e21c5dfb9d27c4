//! Error types and handling
//!
//! This module provides the error types used throughout the Hive engine.
//! All errors implement the `HiveErrorExt` trait which provides user-friendly
//! hints and indicates whether errors are recoverable.
//!
//! # Examples
//!
//! ```
//! use sdk::errors::{EngineError, HiveErrorExt};
//!
//! let error = EngineError::ToolNotFound("search".to_string());
//! println!("Hint: {}", error.user_hint());
//! assert!(error.is_recoverable());
//!
//! let fatal = EngineError::Compile { line: 3, message: "Unterminated block 'x'".to_string() };
//! assert!(!fatal.is_recoverable());
//! ```

use thiserror::Error;

/// Trait for Hive error extensions
///
/// Provides user-facing context for errors: a hint that is safe to show to
/// end users and whether retrying the operation can succeed.
pub trait HiveErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried or worked around. Non-recoverable
    /// errors need the input (source, configuration) to change first.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Configuration**: Invalid or missing configuration
/// - **Compiler**: HiveLang syntax errors
/// - **Runtime**: Missing blocks, tools or tool failures
/// - **Memory**: Shared memory backend failures
/// - **Database / Queue**: SQLite operation failures
/// - **LLM Provider**: API and network failures
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Compiler errors
    #[error("Line {line}: {message}")]
    Compile { line: usize, message: String },

    // Runtime errors
    #[error("Block not found: {0}")]
    BlockNotFound(String),

    #[error("Program has no bot or agent block")]
    EmptyProgram,

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool error: {0}")]
    ToolError(String),

    // Shared memory errors
    #[error("Memory error: {0}")]
    Memory(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(String),

    #[error("Bot not found: {0}")]
    BotNotFound(String),

    // Queue errors
    #[error("Queue error: {0}")]
    Queue(String),

    // LLM provider errors
    #[error("LLM provider error: {0}")]
    LLMProvider(String),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HiveErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",

            Self::Compile { .. } => "Fix the HiveLang source at the reported line",

            Self::BlockNotFound(_) => "Check the bot name passed to the runtime",
            Self::EmptyProgram => "Define at least one `bot` or `agent` block",
            Self::ToolNotFound(_) => "The requested tool is not available",
            Self::ToolError(_) => "Tool operation failed",

            Self::Memory(_) => "Shared memory operation failed",

            Self::Database(_) => "Database operation failed. Try restarting the engine",
            Self::BotNotFound(_) => "The bot was deleted or never stored",

            Self::Queue(_) => "Workforce queue operation failed. Try again",

            Self::LLMProvider(_) => "LLM provider unavailable. Check that it is running",
            Self::Network(_) => "Network operation failed. Check your connection",

            Self::Serialization(_) => "Data could not be encoded or decoded",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Non-recoverable errors
            Self::Config(_)
            | Self::Compile { .. }
            | Self::BlockNotFound(_)
            | Self::EmptyProgram
            | Self::BotNotFound(_) => false,

            // All other errors are potentially recoverable
            _ => true,
        }
    }
}
