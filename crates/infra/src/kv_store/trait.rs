use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use thiserror::Error;

/// Key-value store operation error.
///
/// A failed operation never leaves a half-written value behind; callers can
/// treat any error as "nothing changed".
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The backend could not be opened (path resolution, connection).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The backend rejected or failed an I/O operation.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A stored value could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Durable, partitioned key-value storage of JSON values.
///
/// ## Contract
///
/// - `put` replaces the value atomically (old value intact on failure)
/// - `get` returns `None` for absent keys
/// - `delete` on an absent key succeeds
/// - `all_entries` returns a snapshot of one partition, ordered by key
/// - `clear` removes every key of one partition
///
/// Implementations must surface I/O failures as `StoreError`, never drop a
/// write silently.
#[async_trait::async_trait]
pub trait KvStore: Send + Sync {
    async fn put(&self, partition: &str, key: &str, value: JsonValue) -> Result<(), StoreError>;

    async fn get(&self, partition: &str, key: &str) -> Result<Option<JsonValue>, StoreError>;

    async fn delete(&self, partition: &str, key: &str) -> Result<(), StoreError>;

    async fn all_entries(&self, partition: &str) -> Result<BTreeMap<String, JsonValue>, StoreError>;

    async fn clear(&self, partition: &str) -> Result<(), StoreError>;
}

#[async_trait::async_trait]
impl<S> KvStore for Arc<S>
where
    S: KvStore + ?Sized,
{
    async fn put(&self, partition: &str, key: &str, value: JsonValue) -> Result<(), StoreError> {
        (**self).put(partition, key, value).await
    }

    async fn get(&self, partition: &str, key: &str) -> Result<Option<JsonValue>, StoreError> {
        (**self).get(partition, key).await
    }

    async fn delete(&self, partition: &str, key: &str) -> Result<(), StoreError> {
        (**self).delete(partition, key).await
    }

    async fn all_entries(&self, partition: &str) -> Result<BTreeMap<String, JsonValue>, StoreError> {
        (**self).all_entries(partition).await
    }

    async fn clear(&self, partition: &str) -> Result<(), StoreError> {
        (**self).clear(partition).await
    }
}
