//! Persisted shared memory over the `shared_memory` table
//!
//! When the table does not exist (a store that predates the migration, or a
//! deployment that dropped it) every operation logs a warning and behaves as
//! if the namespace were empty: reads return `None`, writes are dropped.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use tracing::warn;

use crate::db::now_secs;
use sdk::errors::EngineError;
use sdk::memory::SharedMemory;

/// `SharedMemory` handle backed by SQLite
#[derive(Debug, Clone)]
pub struct SqliteMemory {
    pool: SqlitePool,
    namespace: String,
}

fn is_missing_table(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.message().contains("no such table"),
        _ => false,
    }
}

impl SqliteMemory {
    pub fn new(pool: SqlitePool, namespace: impl Into<String>) -> Self {
        Self {
            pool,
            namespace: namespace.into(),
        }
    }

    /// Map a query error, turning "table missing" into `fallback`
    fn tolerate<T>(&self, op: &str, err: sqlx::Error, fallback: T) -> Result<T, EngineError> {
        if is_missing_table(&err) {
            warn!(
                "shared_memory table missing during {} (namespace {}): {}",
                op, self.namespace, err
            );
            Ok(fallback)
        } else {
            Err(EngineError::Memory(format!("{} failed: {}", op, err)))
        }
    }

    fn decode(raw: &str) -> Value {
        serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
    }
}

#[async_trait]
impl SharedMemory for SqliteMemory {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, EngineError> {
        let row = sqlx::query("SELECT value FROM shared_memory WHERE namespace = ? AND key = ?")
            .bind(&self.namespace)
            .bind(key)
            .fetch_optional(&self.pool)
            .await;

        match row {
            Ok(row) => Ok(row.map(|r| Self::decode(&r.get::<String, _>("value")))),
            Err(e) => self.tolerate("get", e, None),
        }
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), EngineError> {
        let encoded = serde_json::to_string(&value)?;
        let result = sqlx::query(
            "INSERT INTO shared_memory (namespace, key, value, updated_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(namespace, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(&self.namespace)
        .bind(key)
        .bind(encoded)
        .bind(now_secs())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => self.tolerate("set", e, ()),
        }
    }

    async fn has(&self, key: &str) -> Result<bool, EngineError> {
        let result = sqlx::query("SELECT 1 FROM shared_memory WHERE namespace = ? AND key = ?")
            .bind(&self.namespace)
            .bind(key)
            .fetch_optional(&self.pool)
            .await;

        match result {
            Ok(row) => Ok(row.is_some()),
            Err(e) => self.tolerate("has", e, false),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, EngineError> {
        let result = sqlx::query("DELETE FROM shared_memory WHERE namespace = ? AND key = ?")
            .bind(&self.namespace)
            .bind(key)
            .execute(&self.pool)
            .await;

        match result {
            Ok(done) => Ok(done.rows_affected() > 0),
            Err(e) => self.tolerate("delete", e, false),
        }
    }

    async fn clear(&self) -> Result<(), EngineError> {
        let result = sqlx::query("DELETE FROM shared_memory WHERE namespace = ?")
            .bind(&self.namespace)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => self.tolerate("clear", e, ()),
        }
    }

    async fn keys(&self) -> Result<Vec<String>, EngineError> {
        let rows = sqlx::query("SELECT key FROM shared_memory WHERE namespace = ? ORDER BY key")
            .bind(&self.namespace)
            .fetch_all(&self.pool)
            .await;

        match rows {
            Ok(rows) => Ok(rows.iter().map(|r| r.get("key")).collect()),
            Err(e) => self.tolerate("keys", e, Vec::new()),
        }
    }

    async fn entries(&self) -> Result<Vec<(String, Value)>, EngineError> {
        let rows = sqlx::query(
            "SELECT key, value FROM shared_memory WHERE namespace = ? ORDER BY key",
        )
        .bind(&self.namespace)
        .fetch_all(&self.pool)
        .await;

        match rows {
            Ok(rows) => Ok(rows
                .iter()
                .map(|r| (r.get("key"), Self::decode(&r.get::<String, _>("value"))))
                .collect()),
            Err(e) => self.tolerate("entries", e, Vec::new()),
        }
    }
}
