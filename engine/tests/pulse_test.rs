//! Integration tests for the Pulse Engine
//!
//! Each test gets its own SQLite database and drives pulses directly with
//! `PulseEngine::pulse()`, except the lifecycle test which uses the timer.

use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;

use hive_engine::config::{Config, PulseConfig};
use hive_engine::db::{now_secs, Bot, Database, NewBot, NewPulseJob, PulseLogStatus, TriggerType};
use hive_engine::handlers::build_pulse_engine;
use hive_engine::message_bus::{Event, EventType, MessageBus};
use hive_engine::pulse::{compute_next_run, PulseEngine, PulseState};
use hive_engine::runtime::Runtime;

const HEARTBEAT: &str = r#"
bot "Heartbeat"
  on input
    say "input handler"
  end
  on pulse
    say "tick"
  end
end
"#;

async fn setup() -> (TempDir, Database) {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::new(&temp_dir.path().join("test.db")).await.unwrap();
    (temp_dir, db)
}

async fn add_bot(db: &Database, code: &str) -> Bot {
    db.bots()
        .create_bot(NewBot {
            user_id: "user-1".to_string(),
            name: "Heartbeat".to_string(),
            hivelang_code: code.to_string(),
            ..Default::default()
        })
        .await
        .unwrap()
}

async fn add_job(
    db: &Database,
    bot_id: &str,
    trigger_type: TriggerType,
    trigger_config: serde_json::Value,
) -> String {
    db.pulse_jobs()
        .create_job(NewPulseJob {
            bot_id: bot_id.to_string(),
            trigger_type,
            trigger_config,
            next_run: None,
        })
        .await
        .unwrap()
        .id
}

fn engine(db: &Database, config: PulseConfig) -> PulseEngine {
    PulseEngine::new(db, Runtime::new(), config)
}

#[tokio::test]
async fn test_schedule_job_advances_and_logs_success() {
    let (_dir, db) = setup().await;
    let bot = add_bot(&db, HEARTBEAT).await;
    let job_id = add_job(&db, &bot.id, TriggerType::Schedule, json!({"interval_seconds": 120})).await;

    let before = now_secs();
    let report = engine(&db, PulseConfig::default()).pulse().await.unwrap();
    let after = now_secs();

    assert_eq!(report.due, 1);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 0);

    let job = db.pulse_jobs().get_job(&job_id).await.unwrap().unwrap();
    let last_run = job.last_run.unwrap();
    assert!(last_run >= before && last_run <= after);
    assert_eq!(job.next_run, Some(last_run + 120));

    let logs = db.pulse_jobs().recent_logs(Some(&job_id), 10).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, PulseLogStatus::Success);
    assert_eq!(logs[0].bot_id, bot.id);
    // The `on pulse` handler wins over `on input`
    assert_eq!(logs[0].output, "tick");

    // Not due again until the interval passes
    let report = engine(&db, PulseConfig::default()).pulse().await.unwrap();
    assert_eq!(report.due, 0);
}

#[tokio::test]
async fn test_pulse_falls_back_to_input_handler() {
    let (_dir, db) = setup().await;
    let bot = add_bot(&db, "bot \"Plain\"\n on input\n  say \"plain\"\n end\nend").await;
    let job_id = add_job(&db, &bot.id, TriggerType::Schedule, json!({})).await;

    engine(&db, PulseConfig::default()).pulse().await.unwrap();

    let logs = db.pulse_jobs().recent_logs(Some(&job_id), 10).await.unwrap();
    assert_eq!(logs[0].output, "plain");
}

#[tokio::test]
async fn test_configured_engine_wakes_with_default_tools() {
    let (_dir, db) = setup().await;
    let bot = add_bot(
        &db,
        "bot \"Keeper\"\n  on pulse\n    call memory set last_pulse 1\n  end\nend\n",
    )
    .await;
    let job_id = add_job(&db, &bot.id, TriggerType::Schedule, json!({"interval_seconds": 60})).await;

    let report = build_pulse_engine(&db, &Config::default(), None)
        .pulse()
        .await
        .unwrap();
    assert_eq!(report.succeeded, 1);

    let logs = db.pulse_jobs().recent_logs(Some(&job_id), 10).await.unwrap();
    assert_eq!(logs[0].output, "Stored 'last_pulse'");

    // A bare engine has no tools, so the same call only yields an error observation
    let event_id = add_job(&db, &bot.id, TriggerType::Event, json!({})).await;
    let bare = engine(&db, PulseConfig::default()).pulse().await.unwrap();
    assert_eq!(bare.succeeded, 1);
    let logs = db.pulse_jobs().recent_logs(Some(&event_id), 10).await.unwrap();
    assert_eq!(logs[0].output, "");
}

#[tokio::test]
async fn test_event_job_fires_once_until_rearmed() {
    let (_dir, db) = setup().await;
    let bot = add_bot(&db, HEARTBEAT).await;
    let job_id = add_job(&db, &bot.id, TriggerType::Webhook, json!({"path": "/hook"})).await;
    let pulse = engine(&db, PulseConfig::default());

    assert_eq!(pulse.pulse().await.unwrap().succeeded, 1);
    let job = db.pulse_jobs().get_job(&job_id).await.unwrap().unwrap();
    assert!(job.last_run.is_some());
    assert_eq!(job.next_run, None);

    assert_eq!(pulse.pulse().await.unwrap().due, 0);

    assert!(db.pulse_jobs().rearm(&job_id, now_secs()).await.unwrap());
    assert_eq!(pulse.pulse().await.unwrap().succeeded, 1);
}

#[tokio::test]
async fn test_failed_wake_leaves_job_due_without_log() {
    let (_dir, db) = setup().await;
    let bot = add_bot(&db, "bot \"Broken\"\n on input\n  say \"x\"\n").await;
    let job_id = add_job(&db, &bot.id, TriggerType::Schedule, json!({})).await;
    let original = db.pulse_jobs().get_job(&job_id).await.unwrap().unwrap();

    let pulse = engine(&db, PulseConfig::default());
    let report = pulse.pulse().await.unwrap();
    assert_eq!(report.failed, 1);

    let job = db.pulse_jobs().get_job(&job_id).await.unwrap().unwrap();
    assert_eq!(job, original);
    assert!(db.pulse_jobs().recent_logs(Some(&job_id), 10).await.unwrap().is_empty());

    // Still due: retried on the next pulse
    assert_eq!(pulse.pulse().await.unwrap().due, 1);
}

#[tokio::test]
async fn test_failure_log_is_opt_in() {
    let (_dir, db) = setup().await;
    let bot = add_bot(&db, "bot \"Broken\"\n").await;
    let job_id = add_job(&db, &bot.id, TriggerType::Schedule, json!({})).await;

    let config = PulseConfig {
        log_failures: true,
        ..PulseConfig::default()
    };
    engine(&db, config).pulse().await.unwrap();

    let logs = db.pulse_jobs().recent_logs(Some(&job_id), 10).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, PulseLogStatus::Failure);
    assert!(logs[0].output.contains("Unterminated block"));

    let job = db.pulse_jobs().get_job(&job_id).await.unwrap().unwrap();
    assert!(job.last_run.is_none());
}

#[tokio::test]
async fn test_inactive_and_future_jobs_are_skipped() {
    let (_dir, db) = setup().await;
    let bot = add_bot(&db, HEARTBEAT).await;
    let paused = add_job(&db, &bot.id, TriggerType::Schedule, json!({})).await;
    db.pulse_jobs().set_active(&paused, false).await.unwrap();
    db.pulse_jobs()
        .create_job(NewPulseJob {
            bot_id: bot.id.clone(),
            trigger_type: TriggerType::Schedule,
            trigger_config: json!({}),
            next_run: Some(now_secs() + 3600),
        })
        .await
        .unwrap();

    let report = engine(&db, PulseConfig::default()).pulse().await.unwrap();
    assert_eq!(report.due, 0);
}

#[tokio::test]
async fn test_batch_limit_caps_claims() {
    let (_dir, db) = setup().await;
    let bot = add_bot(&db, HEARTBEAT).await;
    for _ in 0..5 {
        add_job(&db, &bot.id, TriggerType::Schedule, json!({})).await;
    }

    let config = PulseConfig {
        batch_limit: 3,
        ..PulseConfig::default()
    };
    let pulse = engine(&db, config);
    assert_eq!(pulse.pulse().await.unwrap().due, 3);
    assert_eq!(pulse.pulse().await.unwrap().due, 2);
}

#[tokio::test]
async fn test_claimed_jobs_are_not_woken_twice() {
    let (_dir, db) = setup().await;
    let bot = add_bot(&db, HEARTBEAT).await;
    add_job(&db, &bot.id, TriggerType::Schedule, json!({})).await;

    let claimed = db
        .pulse_jobs()
        .claim_due_jobs("other-engine", now_secs(), 50, 300)
        .await
        .unwrap();
    assert_eq!(claimed.len(), 1);

    let report = engine(&db, PulseConfig::default()).pulse().await.unwrap();
    assert_eq!(report.due, 0);
}

#[tokio::test]
async fn test_output_is_truncated() {
    let (_dir, db) = setup().await;
    let long = "x".repeat(50);
    let bot = add_bot(
        &db,
        &format!("bot \"Loud\"\n on pulse\n  say \"{}\"\n end\nend", long),
    )
    .await;
    let job_id = add_job(&db, &bot.id, TriggerType::Schedule, json!({})).await;

    let config = PulseConfig {
        output_limit: 10,
        ..PulseConfig::default()
    };
    engine(&db, config).pulse().await.unwrap();

    let logs = db.pulse_jobs().recent_logs(Some(&job_id), 1).await.unwrap();
    assert_eq!(logs[0].output, "x".repeat(10));
}

#[tokio::test]
async fn test_pulse_and_wake_events() {
    let (_dir, db) = setup().await;
    let bot = add_bot(&db, HEARTBEAT).await;
    let job_id = add_job(&db, &bot.id, TriggerType::Schedule, json!({})).await;

    let bus = MessageBus::new();
    let mut pulses = bus.subscribe(EventType::Pulse).await;
    let mut wakes = bus.subscribe(EventType::Wake).await;

    engine(&db, PulseConfig::default())
        .with_message_bus(bus.clone())
        .pulse()
        .await
        .unwrap();

    match pulses.recv().await.unwrap() {
        Event::Pulse { due, .. } => assert_eq!(due, 1),
        other => panic!("Expected pulse event, got {:?}", other),
    }
    match wakes.recv().await.unwrap() {
        Event::Wake {
            job_id: woken,
            bot_id,
            success,
            ..
        } => {
            assert_eq!(woken, job_id);
            assert_eq!(bot_id, bot.id);
            assert!(success);
        }
        other => panic!("Expected wake event, got {:?}", other),
    }
}

#[tokio::test]
async fn test_dropped_listener_does_not_abort_tick() {
    let (_dir, db) = setup().await;
    let bot = add_bot(&db, HEARTBEAT).await;
    add_job(&db, &bot.id, TriggerType::Schedule, json!({})).await;

    let bus = MessageBus::new();
    drop(bus.subscribe(EventType::All).await);

    let report = engine(&db, PulseConfig::default())
        .with_message_bus(bus)
        .pulse()
        .await
        .unwrap();
    assert_eq!(report.succeeded, 1);
}

#[tokio::test]
async fn test_start_is_idempotent_and_runs_immediately() {
    let (_dir, db) = setup().await;
    let bot = add_bot(&db, HEARTBEAT).await;
    let job_id = add_job(&db, &bot.id, TriggerType::Schedule, json!({})).await;

    let pulse = engine(&db, PulseConfig::default());
    assert_eq!(pulse.state().await, PulseState::Stopped);

    assert!(pulse.start().await);
    assert!(!pulse.start().await);
    assert_eq!(pulse.state().await, PulseState::Running);

    let mut woken = false;
    for _ in 0..50 {
        let logs = db.pulse_jobs().recent_logs(Some(&job_id), 1).await.unwrap();
        if !logs.is_empty() {
            woken = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(woken, "start() should run one pulse immediately");

    assert!(pulse.stop().await);
    assert!(!pulse.stop().await);
    assert_eq!(pulse.state().await, PulseState::Stopped);
}

#[test]
fn test_compute_next_run_contract() {
    let now = now_secs();
    let next = compute_next_run(TriggerType::Schedule, &json!({"interval_seconds": 120}), now);
    assert_eq!(next, Some(now + 120));

    for trigger in [TriggerType::Event, TriggerType::Webhook] {
        assert_eq!(compute_next_run(trigger, &json!({"interval_seconds": 120}), now), None);
    }
}
