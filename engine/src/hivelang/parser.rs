//! Line-oriented HiveLang parser

use regex::Regex;
use std::sync::OnceLock;
use tracing::trace;

use sdk::errors::EngineError;

use super::{Block, BlockKind, Instruction, InstructionKind, Program};

fn header_regex() -> &'static Regex {
    static HEADER: OnceLock<Regex> = OnceLock::new();
    HEADER.get_or_init(|| {
        Regex::new(r#"^(bot|agent)\s+(?:"([^"]+)"|([^"]+?))\s*$"#)
            .expect("Invalid block header pattern")
    })
}

/// Split a line into its first token and the trimmed remainder
fn split_head(line: &str) -> (&str, &str) {
    match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    }
}

/// Strip one pair of surrounding double quotes
pub fn unquote(text: &str) -> &str {
    let text = text.trim();
    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        &text[1..text.len() - 1]
    } else {
        text
    }
}

/// Drop a trailing `//` comment that sits outside double quotes
fn strip_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    let mut quoted = false;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'"' => quoted = !quoted,
            b'/' if !quoted && bytes.get(i + 1) == Some(&b'/') => return line[..i].trim_end(),
            _ => {}
        }
    }
    line
}

fn is_block_keyword(line: &str) -> bool {
    matches!(split_head(line).0, "bot" | "agent")
}

fn syntax_error(index: usize, message: impl Into<String>) -> EngineError {
    EngineError::Compile {
        line: index + 1,
        message: message.into(),
    }
}

fn parse_header(line: &str, index: usize) -> Result<Block, EngineError> {
    let caps = header_regex()
        .captures(line)
        .ok_or_else(|| syntax_error(index, format!("Invalid block header: '{}'", line)))?;

    let kind = match &caps[1] {
        "agent" => BlockKind::Agent,
        _ => BlockKind::Bot,
    };
    let name = caps
        .get(2)
        .or_else(|| caps.get(3))
        .map(|m| m.as_str().trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| syntax_error(index, format!("Invalid block header: '{}'", line)))?;

    Ok(Block {
        kind,
        name,
        description: None,
        events: Default::default(),
    })
}

fn parse_instruction(line: &str) -> Instruction {
    let (head, rest) = split_head(line);
    let args = (!rest.is_empty()).then(|| rest.to_string());

    let kind = match head {
        "say" => InstructionKind::Say,
        "call" => InstructionKind::Call,
        _ => InstructionKind::Raw,
    };

    Instruction {
        kind,
        command: head.to_string(),
        args: match kind {
            InstructionKind::Raw => None,
            _ => args,
        },
        raw: line.to_string(),
    }
}

/// Parse HiveLang source into a program.
///
/// Blank lines and `//` comment lines are skipped everywhere. Trailing
/// comments are dropped from structural lines (headers, `on`, `description`,
/// `end`); instruction lines are kept as written so arguments such as URLs
/// survive. Errors carry the 1-based line number of the offending line.
pub fn parse(source: &str) -> Result<Program, EngineError> {
    let mut blocks = Vec::new();
    let mut current: Option<Block> = None;
    let mut opened_at = 0usize;
    let mut cursor: Option<String> = None;

    for (index, raw_line) in source.lines().enumerate() {
        let line = raw_line.trim();
        let code = strip_comment(line);
        if code.is_empty() {
            continue;
        }

        let mut close_block = false;

        match current.as_mut() {
            None => {
                if is_block_keyword(code) {
                    current = Some(parse_header(code, index)?);
                    opened_at = index;
                } else if code == "end" {
                    return Err(syntax_error(index, "Unexpected 'end' outside of a block"));
                } else {
                    trace!("Ignoring top-level line {}: {}", index + 1, line);
                }
            }
            Some(block) => {
                if let Some(event) = cursor.as_ref() {
                    if code == "end" {
                        cursor = None;
                    } else {
                        block
                            .events
                            .entry(event.clone())
                            .or_default()
                            .push(parse_instruction(line));
                    }
                    continue;
                }

                let (head, rest) = split_head(code);
                match head {
                    "end" if rest.is_empty() => close_block = true,
                    "description" => block.description = Some(unquote(rest).to_string()),
                    "on" => {
                        if rest.is_empty() {
                            return Err(syntax_error(index, "Missing event name after 'on'"));
                        }
                        block.events.entry(rest.to_string()).or_default();
                        cursor = Some(rest.to_string());
                    }
                    "bot" | "agent" => {
                        return Err(syntax_error(
                            index,
                            format!("Nested block inside '{}'", block.name),
                        ));
                    }
                    _ => trace!("Ignoring block-level line {}: {}", index + 1, code),
                }
            }
        }

        if close_block {
            if let Some(block) = current.take() {
                blocks.push(block);
            }
        }
    }

    if let Some(block) = current {
        return Err(syntax_error(
            opened_at,
            format!("Unterminated block '{}'", block.name),
        ));
    }

    Ok(Program { blocks })
}
