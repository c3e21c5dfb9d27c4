//! Small helpers shared across engine modules

pub mod json;

pub use json::{extract_first_array, extract_first_json, extract_json_array};
