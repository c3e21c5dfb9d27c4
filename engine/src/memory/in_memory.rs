use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use sdk::errors::EngineError;
use sdk::memory::SharedMemory;

type Namespaces = HashMap<String, BTreeMap<String, Value>>;

/// Process-local backing store shared by all in-memory namespaces.
///
/// Handles for the same namespace observe each other's writes.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    data: Arc<RwLock<Namespaces>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a handle bound to `namespace`
    pub fn namespace(&self, namespace: impl Into<String>) -> InMemoryNamespace {
        InMemoryNamespace {
            namespace: namespace.into(),
            data: Arc::clone(&self.data),
        }
    }

    /// Names of namespaces that currently hold at least one key
    pub async fn namespaces(&self) -> Vec<String> {
        let data = self.data.read().await;
        data.iter()
            .filter(|(_, entries)| !entries.is_empty())
            .map(|(ns, _)| ns.clone())
            .collect()
    }
}

/// In-memory `SharedMemory` handle for one namespace
#[derive(Debug, Clone)]
pub struct InMemoryNamespace {
    namespace: String,
    data: Arc<RwLock<Namespaces>>,
}

impl InMemoryNamespace {
    /// A standalone namespace with its own private store
    pub fn ephemeral(namespace: impl Into<String>) -> Self {
        InMemoryStore::new().namespace(namespace)
    }
}

#[async_trait]
impl SharedMemory for InMemoryNamespace {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, EngineError> {
        let data = self.data.read().await;
        Ok(data.get(&self.namespace).and_then(|ns| ns.get(key)).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), EngineError> {
        let mut data = self.data.write().await;
        data.entry(self.namespace.clone())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn has(&self, key: &str) -> Result<bool, EngineError> {
        let data = self.data.read().await;
        Ok(data
            .get(&self.namespace)
            .is_some_and(|ns| ns.contains_key(key)))
    }

    async fn delete(&self, key: &str) -> Result<bool, EngineError> {
        let mut data = self.data.write().await;
        Ok(data
            .get_mut(&self.namespace)
            .and_then(|ns| ns.remove(key))
            .is_some())
    }

    async fn clear(&self) -> Result<(), EngineError> {
        let mut data = self.data.write().await;
        data.remove(&self.namespace);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, EngineError> {
        let data = self.data.read().await;
        Ok(data
            .get(&self.namespace)
            .map(|ns| ns.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn entries(&self) -> Result<Vec<(String, Value)>, EngineError> {
        let data = self.data.read().await;
        Ok(data
            .get(&self.namespace)
            .map(|ns| ns.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }
}
