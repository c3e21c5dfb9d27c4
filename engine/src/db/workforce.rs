/// Workforce queue and run record persistence
///
/// The queue table holds live job state (`waiting`, `active`, `completed`,
/// `failed`) together with progress and lease bookkeeping. Delivery is
/// at-least-once: an `active` job whose lease has expired is handed to the
/// next worker that asks. The run record table is the durable mirror that
/// outlives queue pruning and is keyed by the job id, so a redelivered job
/// overwrites its own record instead of adding a second one.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::fmt;
use std::str::FromStr;

use super::now_secs;

/// Live state of a queued job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueState {
    Waiting,
    Active,
    Completed,
    Failed,
}

impl QueueState {
    pub fn as_str(&self) -> &str {
        match self {
            QueueState::Waiting => "waiting",
            QueueState::Active => "active",
            QueueState::Completed => "completed",
            QueueState::Failed => "failed",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, QueueState::Completed | QueueState::Failed)
    }
}

impl fmt::Display for QueueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "waiting" => Ok(QueueState::Waiting),
            "active" => Ok(QueueState::Active),
            "completed" => Ok(QueueState::Completed),
            "failed" => Ok(QueueState::Failed),
            other => Err(anyhow::anyhow!("Unknown queue state: {}", other)),
        }
    }
}

/// Queue row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedJob {
    pub id: String,
    pub user_id: String,
    pub request: String,
    pub state: QueueState,
    pub progress: Option<Value>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub attempts: i64,
    pub max_attempts: i64,
    pub worker_id: Option<String>,
    pub lease_until: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
    pub finished_at: Option<i64>,
}

/// Durable run record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub user_id: String,
    pub request: String,
    pub result: Option<Value>,
    pub status: String,
    pub created_at: i64,
    pub updated_at: i64,
}

const QUEUE_COLUMNS: &str = "id, user_id, request, state, progress, result, error, attempts, \
     max_attempts, worker_id, lease_until, created_at, updated_at, finished_at";

fn decode_json(raw: Option<String>) -> Option<Value> {
    raw.map(|s| serde_json::from_str(&s).unwrap_or(Value::String(s)))
}

fn row_to_job(r: &SqliteRow) -> QueuedJob {
    let state: String = r.get("state");
    QueuedJob {
        id: r.get("id"),
        user_id: r.get("user_id"),
        request: r.get("request"),
        state: state.parse().unwrap_or(QueueState::Waiting),
        progress: decode_json(r.get("progress")),
        result: decode_json(r.get("result")),
        error: r.get("error"),
        attempts: r.get("attempts"),
        max_attempts: r.get("max_attempts"),
        worker_id: r.get("worker_id"),
        lease_until: r.get("lease_until"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
        finished_at: r.get("finished_at"),
    }
}

/// Workforce queue repository
#[derive(Clone)]
pub struct WorkforceQueueRepository {
    pool: SqlitePool,
}

impl WorkforceQueueRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Add a job in the `waiting` state
    pub async fn enqueue(&self, user_id: &str, request: &str, max_attempts: i64) -> Result<QueuedJob> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = now_secs();

        sqlx::query(
            "INSERT INTO workforce_queue (id, user_id, request, state, attempts, max_attempts, created_at, updated_at)
             VALUES (?, ?, ?, 'waiting', 0, ?, ?, ?)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(request)
        .bind(max_attempts.max(1))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to enqueue workforce job")?;

        self.get(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Enqueued job {} disappeared", id))
    }

    /// Get a queued job by ID
    pub async fn get(&self, job_id: &str) -> Result<Option<QueuedJob>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM workforce_queue WHERE id = ?",
            QUEUE_COLUMNS
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch workforce job")?;

        Ok(row.as_ref().map(row_to_job))
    }

    /// Claim the oldest claimable job for `worker_id`.
    ///
    /// A job is claimable when it is `waiting`, or `active` with an expired
    /// lease (its worker died). Claiming bumps `attempts`.
    pub async fn claim(&self, worker_id: &str, now: i64, lease_secs: i64) -> Result<Option<QueuedJob>> {
        let row = sqlx::query(&format!(
            "UPDATE workforce_queue
             SET state = 'active', worker_id = ?, lease_until = ?, attempts = attempts + 1, updated_at = ?
             WHERE id = (
                 SELECT id FROM workforce_queue
                 WHERE state = 'waiting' OR (state = 'active' AND lease_until < ?)
                 ORDER BY created_at ASC, rowid ASC LIMIT 1
             )
             RETURNING {}",
            QUEUE_COLUMNS
        ))
        .bind(worker_id)
        .bind(now + lease_secs)
        .bind(now)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to claim workforce job")?;

        Ok(row.as_ref().map(row_to_job))
    }

    /// Store the latest progress payload.
    ///
    /// Every write below is guarded by the lease: it only lands while
    /// `worker_id` still holds the job in the `active` state. A worker whose
    /// lease expired and was claimed by another worker gets `false`/`None`.
    pub async fn update_progress(
        &self,
        job_id: &str,
        worker_id: &str,
        progress: &Value,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE workforce_queue SET progress = ?, updated_at = ?
             WHERE id = ? AND worker_id = ? AND state = 'active'",
        )
        .bind(progress.to_string())
        .bind(now_secs())
        .bind(job_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await
        .context("Failed to update workforce progress")?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark a job completed with its result. Returns whether the lease was
    /// still held.
    pub async fn complete(&self, job_id: &str, worker_id: &str, result: &Value) -> Result<bool> {
        let now = now_secs();
        let updated = sqlx::query(
            "UPDATE workforce_queue
             SET state = 'completed', result = ?, error = NULL, lease_until = NULL,
                 updated_at = ?, finished_at = ?
             WHERE id = ? AND worker_id = ? AND state = 'active'",
        )
        .bind(result.to_string())
        .bind(now)
        .bind(now)
        .bind(job_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await
        .context("Failed to complete workforce job")?;

        Ok(updated.rows_affected() > 0)
    }

    /// Record a failed attempt.
    ///
    /// Returns the resulting state: `Waiting` when attempts remain,
    /// otherwise `Failed`. `None` when `worker_id` no longer holds the job.
    pub async fn fail(
        &self,
        job_id: &str,
        worker_id: &str,
        error: &str,
    ) -> Result<Option<QueueState>> {
        let now = now_secs();
        let row = sqlx::query(
            "UPDATE workforce_queue
             SET state = CASE WHEN attempts < max_attempts THEN 'waiting' ELSE 'failed' END,
                 finished_at = CASE WHEN attempts < max_attempts THEN NULL ELSE ? END,
                 error = ?, worker_id = NULL, lease_until = NULL, updated_at = ?
             WHERE id = ? AND worker_id = ? AND state = 'active'
             RETURNING state",
        )
        .bind(now)
        .bind(error)
        .bind(now)
        .bind(job_id)
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to record workforce failure")?;

        row.map(|r| r.get::<String, _>("state").parse()).transpose()
    }

    /// Delete finished jobs last touched before `older_than`, together with
    /// their shared memory namespaces
    pub async fn prune_finished(&self, older_than: i64) -> Result<u64> {
        const PRUNABLE: &str =
            "state IN ('completed', 'failed') AND finished_at IS NOT NULL AND finished_at < ?";

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin workforce prune")?;

        sqlx::query(&format!(
            "DELETE FROM shared_memory WHERE namespace IN (SELECT id FROM workforce_queue WHERE {})",
            PRUNABLE
        ))
        .bind(older_than)
        .execute(&mut *tx)
        .await
        .context("Failed to prune workforce shared memory")?;

        let result = sqlx::query(&format!("DELETE FROM workforce_queue WHERE {}", PRUNABLE))
            .bind(older_than)
            .execute(&mut *tx)
            .await
            .context("Failed to prune workforce queue")?;

        tx.commit().await.context("Failed to commit workforce prune")?;

        Ok(result.rows_affected())
    }

    /// Count jobs per state
    pub async fn count_by_state(&self, state: QueueState) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM workforce_queue WHERE state = ?")
                .bind(state.as_str())
                .fetch_one(&self.pool)
                .await
                .context("Failed to count workforce jobs")?;

        Ok(count)
    }
}

/// Durable run record repository
#[derive(Clone)]
pub struct WorkforceRunRepository {
    pool: SqlitePool,
}

impl WorkforceRunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or overwrite the record for `id`; `created_at` is kept from
    /// the first write
    pub async fn upsert(
        &self,
        id: &str,
        user_id: &str,
        request: &str,
        result: Option<&Value>,
        status: &str,
    ) -> Result<()> {
        let now = now_secs();
        sqlx::query(
            "INSERT INTO workforce_runs (id, user_id, request, result, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 result = excluded.result,
                 status = excluded.status,
                 updated_at = excluded.updated_at",
        )
        .bind(id)
        .bind(user_id)
        .bind(request)
        .bind(result.map(|v| v.to_string()))
        .bind(status)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to write workforce run record")?;

        Ok(())
    }

    /// Get a run record by job ID
    pub async fn get(&self, id: &str) -> Result<Option<RunRecord>> {
        let row = sqlx::query(
            "SELECT id, user_id, request, result, status, created_at, updated_at
             FROM workforce_runs WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch workforce run record")?;

        Ok(row.map(|r| RunRecord {
            id: r.get("id"),
            user_id: r.get("user_id"),
            request: r.get("request"),
            result: decode_json(r.get("result")),
            status: r.get("status"),
            created_at: r.get("created_at"),
            updated_at: r.get("updated_at"),
        }))
    }

    /// All run records for a user, newest first
    pub async fn list_for_user(&self, user_id: &str, limit: i64) -> Result<Vec<RunRecord>> {
        let rows = sqlx::query(
            "SELECT id, user_id, request, result, status, created_at, updated_at
             FROM workforce_runs WHERE user_id = ?
             ORDER BY created_at DESC, rowid DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list workforce run records")?;

        Ok(rows
            .into_iter()
            .map(|r| RunRecord {
                id: r.get("id"),
                user_id: r.get("user_id"),
                request: r.get("request"),
                result: decode_json(r.get("result")),
                status: r.get("status"),
                created_at: r.get("created_at"),
                updated_at: r.get("updated_at"),
            })
            .collect())
    }
}
