use crate::db::Row;
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Namespaced key/value store that receives the session projection.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn set(&self, namespace: &str, key: &str, value: Value) -> Result<()>;

    async fn clear(&self, namespace: &str) -> Result<()>;
}

/// Process-local session store. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    inner: Arc<Mutex<HashMap<String, Row>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of one namespace, `None` once cleared or never set.
    pub async fn get(&self, namespace: &str) -> Option<Row> {
        self.inner.lock().await.get(namespace).cloned()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn set(&self, namespace: &str, key: &str, value: Value) -> Result<()> {
        self.inner
            .lock()
            .await
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn clear(&self, namespace: &str) -> Result<()> {
        self.inner.lock().await.remove(namespace);
        Ok(())
    }
}
