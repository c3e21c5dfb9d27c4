//! Shared Memory backends
//!
//! Two implementations of `sdk::SharedMemory`:
//!
//! - [`InMemoryStore`]: process-local map for ephemeral and test runs
//! - [`SqliteMemory`]: persisted `(namespace, key)` table for durable runs
//!
//! Both scope every handle to a single namespace (run id or job id).

mod in_memory;
mod sqlite;

pub use in_memory::{InMemoryNamespace, InMemoryStore};
pub use sqlite::SqliteMemory;

pub use sdk::memory::{append_value, SharedMemory};
