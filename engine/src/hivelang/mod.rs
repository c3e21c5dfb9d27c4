//! HiveLang Compiler
//!
//! HiveLang is a line-oriented bot description language. A program is a list
//! of `bot`/`agent` blocks, each with an optional description and a set of
//! event handlers holding instructions in source order:
//!
//! ```text
//! bot "Scout"
//!   description "Watches a feed"
//!   on input
//!     say "Looking..."
//!     call search hackernews AI
//!   end
//! end
//! ```
//!
//! There is no expression grammar and no control flow. Lines the compiler
//! does not model (`if`, `remember`, ...) are kept as `raw` instructions.

mod parser;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use sdk::errors::EngineError;

pub use parser::{parse, unquote};

/// Kind of a top-level block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Bot,
    Agent,
}

impl BlockKind {
    pub fn as_str(&self) -> &str {
        match self {
            BlockKind::Bot => "bot",
            BlockKind::Agent => "agent",
        }
    }
}

/// Kind of an instruction inside an event handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstructionKind {
    Say,
    Call,
    Raw,
}

/// One parsed line inside an event handler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    #[serde(rename = "type")]
    pub kind: InstructionKind,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<String>,
    pub raw: String,
}

/// A compiled `bot` or `agent` definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    #[serde(rename = "type")]
    pub kind: BlockKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub events: BTreeMap<String, Vec<Instruction>>,
}

impl Block {
    /// Instructions for an event, if the block handles it
    pub fn handler(&self, event: &str) -> Option<&[Instruction]> {
        self.events.get(event).map(Vec::as_slice)
    }
}

/// A compiled HiveLang program. Immutable once produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub blocks: Vec<Block>,
}

impl Program {
    /// Find a block by name
    pub fn find_block(&self, name: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.name == name)
    }

    /// First bot/agent block in source order
    pub fn first_block(&self) -> Option<&Block> {
        self.blocks.first()
    }

    /// Resolve the block a run targets: by name when given, else the first one
    pub fn select_block(&self, name: Option<&str>) -> Result<&Block, EngineError> {
        match name {
            Some(name) => self
                .find_block(name)
                .ok_or_else(|| EngineError::BlockNotFound(name.to_string())),
            None => self.first_block().ok_or(EngineError::EmptyProgram),
        }
    }
}

/// Result of `compile`, shaped for callers that persist or render it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileOutput {
    pub success: bool,
    pub blocks: Vec<Block>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompileOutput {
    /// Convert back into a typed program, surfacing the compile error
    pub fn into_program(self) -> Result<Program, String> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(Program {
                blocks: self.blocks,
            }),
        }
    }
}

/// Compile HiveLang source.
///
/// Never fails: syntax errors are returned as `success = false` with a
/// `"Line <n>: <message>"` error and no partial blocks.
pub fn compile(source: &str) -> CompileOutput {
    match parse(source) {
        Ok(program) => CompileOutput {
            success: true,
            blocks: program.blocks,
            error: None,
        },
        Err(e) => {
            tracing::debug!("HiveLang compile failed: {}", e);
            CompileOutput {
                success: false,
                blocks: Vec::new(),
                error: Some(e.to_string()),
            }
        }
    }
}
