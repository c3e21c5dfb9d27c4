//! Shared memory contract
//!
//! A namespaced async key/value store shared by the runtime and by tools
//! within one run or job. Each handle is bound to exactly one namespace
//! (a run id or job id); isolation between runs comes from the namespace,
//! not from locking. Writes are last-writer-wins with no versioning.

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::EngineError;

/// Async key/value store scoped to one namespace
#[async_trait]
pub trait SharedMemory: Send + Sync {
    /// Namespace this handle reads and writes
    fn namespace(&self) -> &str;

    /// Get a value, `None` when the key is absent
    async fn get(&self, key: &str) -> Result<Option<Value>, EngineError>;

    /// Set a value, replacing any previous one
    async fn set(&self, key: &str, value: Value) -> Result<(), EngineError>;

    /// Check whether a key exists
    async fn has(&self, key: &str) -> Result<bool, EngineError>;

    /// Delete a key, returning whether it existed
    async fn delete(&self, key: &str) -> Result<bool, EngineError>;

    /// Remove every key in the namespace
    async fn clear(&self) -> Result<(), EngineError>;

    /// All keys in the namespace
    async fn keys(&self) -> Result<Vec<String>, EngineError>;

    /// All values in the namespace
    async fn values(&self) -> Result<Vec<Value>, EngineError> {
        Ok(self.entries().await?.into_iter().map(|(_, v)| v).collect())
    }

    /// All `(key, value)` pairs in the namespace
    async fn entries(&self) -> Result<Vec<(String, Value)>, EngineError>;

    /// Append a value under `key`.
    ///
    /// An existing array is pushed to; any other existing value `x` becomes
    /// `[x, value]`; a missing key becomes `[value]`.
    ///
    /// This is a read-modify-write over `get` and `set` and is NOT atomic:
    /// concurrent appenders on the same key can lose writes.
    async fn append(&self, key: &str, value: Value) -> Result<(), EngineError> {
        let next = append_value(self.get(key).await?, value);
        self.set(key, next).await
    }
}

/// Combine an existing value with an appended one
pub fn append_value(existing: Option<Value>, value: Value) -> Value {
    match existing {
        Some(Value::Array(mut items)) => {
            items.push(value);
            Value::Array(items)
        }
        Some(other) => Value::Array(vec![other, value]),
        None => Value::Array(vec![value]),
    }
}
