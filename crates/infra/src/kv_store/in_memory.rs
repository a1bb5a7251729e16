use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use serde_json::Value as JsonValue;

use super::r#trait::{KvStore, StoreError};

/// In-memory key-value store.
///
/// Intended for tests/dev. Not durable across restarts.
#[derive(Debug, Default)]
pub struct InMemoryKvStore {
    partitions: RwLock<HashMap<String, BTreeMap<String, JsonValue>>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend("lock poisoned".to_string())
}

#[async_trait::async_trait]
impl KvStore for InMemoryKvStore {
    async fn put(&self, partition: &str, key: &str, value: JsonValue) -> Result<(), StoreError> {
        let mut partitions = self.partitions.write().map_err(|_| poisoned())?;
        partitions
            .entry(partition.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, partition: &str, key: &str) -> Result<Option<JsonValue>, StoreError> {
        let partitions = self.partitions.read().map_err(|_| poisoned())?;
        Ok(partitions.get(partition).and_then(|p| p.get(key)).cloned())
    }

    async fn delete(&self, partition: &str, key: &str) -> Result<(), StoreError> {
        let mut partitions = self.partitions.write().map_err(|_| poisoned())?;
        if let Some(p) = partitions.get_mut(partition) {
            p.remove(key);
        }
        Ok(())
    }

    async fn all_entries(&self, partition: &str) -> Result<BTreeMap<String, JsonValue>, StoreError> {
        let partitions = self.partitions.read().map_err(|_| poisoned())?;
        Ok(partitions.get(partition).cloned().unwrap_or_default())
    }

    async fn clear(&self, partition: &str) -> Result<(), StoreError> {
        let mut partitions = self.partitions.write().map_err(|_| poisoned())?;
        partitions.remove(partition);
        Ok(())
    }
}
