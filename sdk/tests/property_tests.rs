use proptest::prelude::*;
use sdk::errors::{EngineError, HiveErrorExt};
use sdk::memory::append_value;
use serde_json::Value;

proptest! {
    #[test]
    fn test_error_user_hint_completeness(error_str in "\\PC*", line in 1usize..10_000) {
        let errs = vec![
            EngineError::Config(error_str.clone()),
            EngineError::Compile { line, message: error_str.clone() },
            EngineError::Database(error_str.clone()),
            EngineError::LLMProvider(error_str.clone()),
            EngineError::ToolNotFound(error_str.clone()),
            EngineError::ToolError(error_str.clone()),
            EngineError::Queue(error_str.clone()),
        ];

        for err in errs {
            let hint = err.user_hint();
            prop_assert!(!hint.is_empty());
            // Hints are static text and never echo the raw error payload
            if error_str.len() > 40 {
                prop_assert!(!hint.contains(&error_str));
            }
        }
    }
}

proptest! {
    #[test]
    fn test_append_sequence_preserves_order(items in proptest::collection::vec("[a-z]{1,8}", 1..20)) {
        let mut acc: Option<Value> = None;
        for item in &items {
            acc = Some(append_value(acc, Value::String(item.clone())));
        }

        let expected: Vec<Value> = items.iter().cloned().map(Value::String).collect();
        prop_assert_eq!(acc, Some(Value::Array(expected)));
    }
}
