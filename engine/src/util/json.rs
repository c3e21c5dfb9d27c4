//! Extracting JSON from free-form model replies
//!
//! Planner and evaluator tools answer in prose that usually, but not always,
//! embeds a JSON value. These helpers locate the first *balanced* JSON
//! array or object in the text. Brackets inside string literals (including
//! escaped quotes) do not count towards nesting.
//!
//! The typed wrapper [`extract_json_array`] returns `None` on any failure;
//! callers decide the fallback value.

use serde::de::DeserializeOwned;

/// Byte offset of the bracket closing the one at `start`, if balanced
fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut stack: Vec<u8> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'[' => stack.push(b']'),
            b'{' => stack.push(b'}'),
            b']' | b'}' => {
                if stack.pop() != Some(b) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }

    None
}

fn first_balanced<'a>(text: &'a str, openers: &[u8]) -> impl Iterator<Item = &'a str> + 'a {
    let openers = openers.to_vec();
    text.char_indices()
        .filter(move |(_, c)| c.is_ascii() && openers.contains(&(*c as u8)))
        .filter_map(move |(start, _)| balanced_end(text, start).map(|end| &text[start..=end]))
}

/// First balanced `[...]` or `{...}` substring that is valid JSON
pub fn extract_first_json(text: &str) -> Option<&str> {
    first_balanced(text, b"[{")
        .find(|candidate| serde_json::from_str::<serde_json::Value>(candidate).is_ok())
}

/// First balanced `[...]` substring that is valid JSON
pub fn extract_first_array(text: &str) -> Option<&str> {
    first_balanced(text, b"[")
        .find(|candidate| serde_json::from_str::<serde_json::Value>(candidate).is_ok())
}

/// Parse the first JSON array in `text` as `Vec<T>`
pub fn extract_json_array<T: DeserializeOwned>(text: &str) -> Option<Vec<T>> {
    first_balanced(text, b"[").find_map(|candidate| serde_json::from_str(candidate).ok())
}
