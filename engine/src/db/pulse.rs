/// Pulse job persistence
///
/// Pulse jobs bind a bot to a recurring (`schedule`) or externally fired
/// (`event`, `webhook`) trigger. Due jobs are claimed with a lease before they
/// are woken so that two engines sharing one database never wake the same job
/// concurrently; an expired lease makes the job claimable again.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::fmt;
use std::str::FromStr;

use super::now_secs;

/// Trigger kind of a pulse job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerType {
    Schedule,
    Event,
    Webhook,
}

impl TriggerType {
    pub fn as_str(&self) -> &str {
        match self {
            TriggerType::Schedule => "schedule",
            TriggerType::Event => "event",
            TriggerType::Webhook => "webhook",
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "schedule" => Ok(TriggerType::Schedule),
            "event" => Ok(TriggerType::Event),
            "webhook" => Ok(TriggerType::Webhook),
            other => Err(anyhow::anyhow!("Unknown trigger type: {}", other)),
        }
    }
}

/// Pulse job record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PulseJob {
    pub id: String,
    pub bot_id: String,
    pub trigger_type: TriggerType,
    pub trigger_config: serde_json::Value,
    pub last_run: Option<i64>,
    pub next_run: Option<i64>,
    pub is_active: bool,
}

/// Fields needed to create a pulse job
#[derive(Debug, Clone)]
pub struct NewPulseJob {
    pub bot_id: String,
    pub trigger_type: TriggerType,
    pub trigger_config: serde_json::Value,
    /// First due time; `None` arms the job immediately
    pub next_run: Option<i64>,
}

/// Outcome recorded in `pulse_logs`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PulseLogStatus {
    Success,
    Failure,
}

impl PulseLogStatus {
    pub fn as_str(&self) -> &str {
        match self {
            PulseLogStatus::Success => "success",
            PulseLogStatus::Failure => "failure",
        }
    }
}

/// Pulse log row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PulseLog {
    pub id: Option<i64>,
    pub job_id: String,
    pub bot_id: String,
    pub status: PulseLogStatus,
    pub output: String,
    pub execution_time_ms: i64,
    pub created_at: i64,
}

const JOB_COLUMNS: &str = "id, bot_id, trigger_type, trigger_config, last_run, next_run, is_active";

fn row_to_job(r: &SqliteRow) -> PulseJob {
    let trigger_type: String = r.get("trigger_type");
    let trigger_config: String = r.get("trigger_config");
    PulseJob {
        id: r.get("id"),
        bot_id: r.get("bot_id"),
        trigger_type: trigger_type.parse().unwrap_or(TriggerType::Event),
        trigger_config: serde_json::from_str(&trigger_config)
            .unwrap_or(serde_json::Value::Null),
        last_run: r.get("last_run"),
        next_run: r.get("next_run"),
        is_active: r.get::<i64, _>("is_active") != 0,
    }
}

/// Pulse job repository for database operations
#[derive(Clone)]
pub struct PulseJobRepository {
    pool: SqlitePool,
}

impl PulseJobRepository {
    /// Create a new pulse job repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create an active pulse job
    pub async fn create_job(&self, job: NewPulseJob) -> Result<PulseJob> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = now_secs();
        let next_run = job.next_run.unwrap_or(now);

        sqlx::query(
            "INSERT INTO pulse_jobs (id, bot_id, trigger_type, trigger_config, next_run, is_active, created_at)
             VALUES (?, ?, ?, ?, ?, 1, ?)",
        )
        .bind(&id)
        .bind(&job.bot_id)
        .bind(job.trigger_type.as_str())
        .bind(job.trigger_config.to_string())
        .bind(next_run)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create pulse job")?;

        Ok(PulseJob {
            id,
            bot_id: job.bot_id,
            trigger_type: job.trigger_type,
            trigger_config: job.trigger_config,
            last_run: None,
            next_run: Some(next_run),
            is_active: true,
        })
    }

    /// Get a pulse job by ID
    pub async fn get_job(&self, job_id: &str) -> Result<Option<PulseJob>> {
        let row = sqlx::query(&format!("SELECT {} FROM pulse_jobs WHERE id = ?", JOB_COLUMNS))
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch pulse job")?;

        Ok(row.as_ref().map(row_to_job))
    }

    /// All pulse jobs, oldest first
    pub async fn list_jobs(&self) -> Result<Vec<PulseJob>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM pulse_jobs ORDER BY created_at ASC, rowid ASC",
            JOB_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list pulse jobs")?;

        Ok(rows.iter().map(row_to_job).collect())
    }

    /// Active jobs with `next_run <= now`, without claiming them
    pub async fn due_jobs(&self, now: i64, limit: i64) -> Result<Vec<PulseJob>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM pulse_jobs
             WHERE is_active = 1 AND next_run IS NOT NULL AND next_run <= ?
             ORDER BY next_run ASC LIMIT ?",
            JOB_COLUMNS
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch due pulse jobs")?;

        Ok(rows.iter().map(row_to_job).collect())
    }

    /// Atomically claim up to `limit` due jobs for `claimer`.
    ///
    /// Jobs already leased by another claimer are skipped until the lease
    /// expires. The single `UPDATE ... RETURNING` statement is atomic in
    /// SQLite, so concurrent claimers never receive the same job.
    pub async fn claim_due_jobs(
        &self,
        claimer: &str,
        now: i64,
        limit: i64,
        lease_secs: i64,
    ) -> Result<Vec<PulseJob>> {
        let rows = sqlx::query(&format!(
            "UPDATE pulse_jobs SET claimed_by = ?, claimed_until = ?
             WHERE id IN (
                 SELECT id FROM pulse_jobs
                 WHERE is_active = 1 AND next_run IS NOT NULL AND next_run <= ?
                   AND (claimed_until IS NULL OR claimed_until < ?)
                 ORDER BY next_run ASC LIMIT ?
             )
             RETURNING {}",
            JOB_COLUMNS
        ))
        .bind(claimer)
        .bind(now + lease_secs)
        .bind(now)
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to claim due pulse jobs")?;

        Ok(rows.iter().map(row_to_job).collect())
    }

    /// Record a successful wake: advance the schedule and release the lease
    pub async fn record_success(
        &self,
        job_id: &str,
        claimer: &str,
        last_run: i64,
        next_run: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE pulse_jobs
             SET last_run = ?, next_run = ?, claimed_by = NULL, claimed_until = NULL
             WHERE id = ? AND (claimed_by = ? OR claimed_by IS NULL)",
        )
        .bind(last_run)
        .bind(next_run)
        .bind(job_id)
        .bind(claimer)
        .execute(&self.pool)
        .await
        .context("Failed to record pulse job success")?;

        Ok(())
    }

    /// Release a lease without touching the schedule
    pub async fn release_claim(&self, job_id: &str, claimer: &str) -> Result<()> {
        sqlx::query(
            "UPDATE pulse_jobs SET claimed_by = NULL, claimed_until = NULL
             WHERE id = ? AND claimed_by = ?",
        )
        .bind(job_id)
        .bind(claimer)
        .execute(&self.pool)
        .await
        .context("Failed to release pulse job claim")?;

        Ok(())
    }

    /// Enable or disable a job
    pub async fn set_active(&self, job_id: &str, active: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE pulse_jobs SET is_active = ? WHERE id = ?")
            .bind(active as i64)
            .bind(job_id)
            .execute(&self.pool)
            .await
            .context("Failed to update pulse job")?;

        Ok(result.rows_affected() > 0)
    }

    /// Re-arm a fire-once (event/webhook) job for `next_run`
    pub async fn rearm(&self, job_id: &str, next_run: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE pulse_jobs SET next_run = ? WHERE id = ?")
            .bind(next_run)
            .bind(job_id)
            .execute(&self.pool)
            .await
            .context("Failed to re-arm pulse job")?;

        Ok(result.rows_affected() > 0)
    }

    /// Append a row to `pulse_logs`
    pub async fn insert_log(
        &self,
        job_id: &str,
        bot_id: &str,
        status: PulseLogStatus,
        output: &str,
        execution_time_ms: i64,
    ) -> Result<PulseLog> {
        let now = now_secs();

        let result = sqlx::query(
            "INSERT INTO pulse_logs (job_id, bot_id, status, output, execution_time_ms, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(job_id)
        .bind(bot_id)
        .bind(status.as_str())
        .bind(output)
        .bind(execution_time_ms)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to insert pulse log")?;

        Ok(PulseLog {
            id: Some(result.last_insert_rowid()),
            job_id: job_id.to_string(),
            bot_id: bot_id.to_string(),
            status,
            output: output.to_string(),
            execution_time_ms,
            created_at: now,
        })
    }

    /// Most recent logs, optionally for one job
    pub async fn recent_logs(&self, job_id: Option<&str>, limit: i64) -> Result<Vec<PulseLog>> {
        let rows = sqlx::query(
            "SELECT id, job_id, bot_id, status, output, execution_time_ms, created_at
             FROM pulse_logs
             WHERE (? IS NULL OR job_id = ?)
             ORDER BY id DESC LIMIT ?",
        )
        .bind(job_id)
        .bind(job_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch pulse logs")?;

        Ok(rows
            .into_iter()
            .map(|r| PulseLog {
                id: Some(r.get("id")),
                job_id: r.get("job_id"),
                bot_id: r.get("bot_id"),
                status: match r.get::<String, _>("status").as_str() {
                    "success" => PulseLogStatus::Success,
                    _ => PulseLogStatus::Failure,
                },
                output: r.get("output"),
                execution_time_ms: r.get("execution_time_ms"),
                created_at: r.get("created_at"),
            })
            .collect())
    }
}
