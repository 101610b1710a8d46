//! The configuration store: the consumed collaborator that persists
//! user-defined benchmarks and checks, keyed by dotted configuration id.

use async_trait::async_trait;
use serde_json::Value as Json;

use crate::error::Result;

/// Consumed contract for user-defined configuration storage. Config ids are
/// dotted (`benchmarks.aws.my-custom-benchmark`); the trailing segment is
/// the entity's own id.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get_config(&self, id: &str) -> Result<Option<Json>>;
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
    async fn update(&self, id: &str, value: Json) -> Result<()>;
    async fn delete(&self, id: &str) -> Result<()>;
}

/// An in-memory [`ConfigStore`], used by the bundled CLI demo and by tests
/// that need a store without standing up anything external.
#[derive(Debug, Default)]
pub struct InMemoryConfigStore {
    entries: tokio::sync::RwLock<std::collections::BTreeMap<String, Json>>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn get_config(&self, id: &str) -> Result<Option<Json>> {
        Ok(self.entries.read().await.get(id).cloned())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .entries
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn update(&self, id: &str, value: Json) -> Result<()> {
        self.entries.write().await.insert(id.to_string(), value);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.entries.write().await.remove(id);
        Ok(())
    }
}
