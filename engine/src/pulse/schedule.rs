//! Next-run computation for pulse jobs
//!
//! Scheduling is "last run + interval", not calendar aligned: a slow wake
//! pushes every later run back by the same amount.

use serde_json::Value;

use crate::db::TriggerType;

/// Interval used when a schedule job configures none
pub const DEFAULT_INTERVAL_SECS: i64 = 60;

/// Positive integer at `key`, accepting numbers and numeric strings
fn positive_int(config: &Value, key: &str) -> Option<i64> {
    let value = config.get(key)?;
    let n = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }?;
    (n > 0).then_some(n)
}

/// Interval in seconds configured for a schedule job.
///
/// `interval_seconds` wins over `interval_minutes`; anything missing,
/// non-numeric or non-positive falls back to [`DEFAULT_INTERVAL_SECS`].
pub fn interval_secs(config: &Value) -> i64 {
    positive_int(config, "interval_seconds")
        .or_else(|| positive_int(config, "interval_minutes").map(|m| m.saturating_mul(60)))
        .unwrap_or(DEFAULT_INTERVAL_SECS)
}

/// When a job should run next after a successful wake at `now` (unix secs).
///
/// Schedule jobs always get a new time; event and webhook jobs fire once
/// and get `None` until something re-arms them.
pub fn compute_next_run(trigger_type: TriggerType, config: &Value, now: i64) -> Option<i64> {
    match trigger_type {
        TriggerType::Schedule => Some(now.saturating_add(interval_secs(config))),
        TriggerType::Event | TriggerType::Webhook => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_interval_seconds() {
        let next = compute_next_run(TriggerType::Schedule, &json!({"interval_seconds": 120}), 1_000);
        assert_eq!(next, Some(1_120));
    }

    #[test]
    fn test_interval_minutes_fallback() {
        let next = compute_next_run(TriggerType::Schedule, &json!({"interval_minutes": 5}), 1_000);
        assert_eq!(next, Some(1_300));
    }

    #[test]
    fn test_seconds_win_over_minutes() {
        let config = json!({"interval_seconds": 30, "interval_minutes": 5});
        assert_eq!(compute_next_run(TriggerType::Schedule, &config, 0), Some(30));
    }

    #[test]
    fn test_default_interval() {
        for config in [json!({}), json!(null), json!({"interval_seconds": 0}), json!({"interval_seconds": "soon"})] {
            assert_eq!(
                compute_next_run(TriggerType::Schedule, &config, 1_000),
                Some(1_060),
                "{}",
                config
            );
        }
    }

    #[test]
    fn test_numeric_strings() {
        assert_eq!(interval_secs(&json!({"interval_seconds": "90"})), 90);
        assert_eq!(interval_secs(&json!({"interval_minutes": "2"})), 120);
    }

    #[test]
    fn test_fire_once_triggers() {
        let config = json!({"interval_seconds": 120});
        assert_eq!(compute_next_run(TriggerType::Event, &config, 1_000), None);
        assert_eq!(compute_next_run(TriggerType::Webhook, &config, 1_000), None);
    }

    proptest! {
        #[test]
        fn prop_schedule_always_advances(now in 0i64..4_000_000_000, secs in 1i64..1_000_000) {
            let next = compute_next_run(TriggerType::Schedule, &json!({"interval_seconds": secs}), now);
            prop_assert_eq!(next, Some(now + secs));
        }
    }
}
