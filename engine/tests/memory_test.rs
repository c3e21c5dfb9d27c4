//! Integration tests for the shared memory backends
//!
//! Both backends must honour the same contract, so every check runs against
//! the in-memory store and the SQLite table.

use serde_json::json;
use tempfile::TempDir;

use hive_engine::db::Database;
use hive_engine::memory::{InMemoryStore, SharedMemory, SqliteMemory};

async fn check_contract(memory: &dyn SharedMemory) {
    assert_eq!(memory.get("k").await.unwrap(), None);
    assert!(!memory.has("k").await.unwrap());

    memory.append("k", json!("a")).await.unwrap();
    memory.append("k", json!("b")).await.unwrap();
    assert_eq!(memory.get("k").await.unwrap(), Some(json!(["a", "b"])));

    memory.set("scalar", json!(1)).await.unwrap();
    memory.append("scalar", json!(2)).await.unwrap();
    assert_eq!(memory.get("scalar").await.unwrap(), Some(json!([1, 2])));

    memory.set("obj", json!({"x": true})).await.unwrap();
    assert!(memory.has("obj").await.unwrap());

    let mut keys = memory.keys().await.unwrap();
    keys.sort();
    assert_eq!(keys, vec!["k", "obj", "scalar"]);
    assert_eq!(memory.values().await.unwrap().len(), 3);
    assert_eq!(memory.entries().await.unwrap().len(), 3);

    assert!(memory.delete("obj").await.unwrap());
    assert!(!memory.delete("obj").await.unwrap());

    memory.clear().await.unwrap();
    assert!(memory.keys().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_in_memory_contract() {
    let store = InMemoryStore::new();
    check_contract(&store.namespace("run-1")).await;
}

#[tokio::test]
async fn test_sqlite_contract() {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::new(&temp_dir.path().join("test.db")).await.unwrap();
    check_contract(&SqliteMemory::new(db.pool().clone(), "job-1")).await;
}

#[tokio::test]
async fn test_namespaces_are_isolated() {
    let store = InMemoryStore::new();
    let a = store.namespace("a");
    let b = store.namespace("b");

    a.set("key", json!("from a")).await.unwrap();
    assert_eq!(b.get("key").await.unwrap(), None);

    // A second handle onto the same namespace sees the write
    let a_again = store.namespace("a");
    assert_eq!(a_again.get("key").await.unwrap(), Some(json!("from a")));
}

#[tokio::test]
async fn test_sqlite_memory_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");

    let db = Database::new(&db_path).await.unwrap();
    SqliteMemory::new(db.pool().clone(), "job-9")
        .set("progress", json!({"step": 3}))
        .await
        .unwrap();
    db.close().await.unwrap();

    let reopened = Database::new(&db_path).await.unwrap();
    let memory = SqliteMemory::new(reopened.pool().clone(), "job-9");
    assert_eq!(
        memory.get("progress").await.unwrap(),
        Some(json!({"step": 3}))
    );
}
