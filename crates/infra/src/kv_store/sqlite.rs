//! SQLite-backed key-value store (durable across restarts).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;

use super::r#trait::{KvStore, StoreError};

#[derive(Debug, Clone)]
enum Location {
    /// `{app_data_dir}/marketsync/store.db`
    DefaultPath,
    File(PathBuf),
    Memory,
}

/// SQLite-backed partitioned key-value store.
///
/// The connection pool is opened lazily on first use. This struct is cheap to
/// clone and safe to share across tasks.
#[derive(Debug, Clone)]
pub struct SqliteKvStore {
    location: Location,
    pool: Arc<Mutex<Option<SqlitePool>>>,
}

impl SqliteKvStore {
    /// Store in the OS application data directory.
    pub fn new() -> Self {
        Self::with_location(Location::DefaultPath)
    }

    /// Store in an explicit database file (created if missing).
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::with_location(Location::File(path.into()))
    }

    /// Private in-memory database, lost when the store is dropped.
    pub fn in_memory() -> Self {
        Self::with_location(Location::Memory)
    }

    fn with_location(location: Location) -> Self {
        Self {
            location,
            pool: Arc::new(Mutex::new(None)),
        }
    }

    /// Get the pool, connecting and creating the schema on first use.
    async fn pool(&self) -> Result<SqlitePool, StoreError> {
        let mut guard = self.pool.lock().await;
        if let Some(pool) = guard.as_ref() {
            return Ok(pool.clone());
        }

        let pool = self
            .connect()
            .await
            .map_err(|err| StoreError::Unavailable(format!("{err:#}")))?;
        *guard = Some(pool.clone());
        Ok(pool)
    }

    async fn connect(&self) -> anyhow::Result<SqlitePool> {
        let pool = match &self.location {
            Location::Memory => {
                let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
                // A single long-lived connection keeps the in-memory database alive.
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .min_connections(1)
                    .idle_timeout(None::<std::time::Duration>)
                    .max_lifetime(None::<std::time::Duration>)
                    .connect_with(options)
                    .await
                    .context("failed to open in-memory SQLite store")?
            }
            Location::File(path) => open_file(path).await?,
            Location::DefaultPath => {
                let path = default_db_path()
                    .context("failed to determine store DB path - ensure app data directory is accessible")?;
                open_file(&path).await?
            }
        };

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_entries (
                partition   TEXT NOT NULL,
                key         TEXT NOT NULL,
                value       TEXT NOT NULL,
                updated_at  TEXT NOT NULL,
                PRIMARY KEY (partition, key)
            )
            "#,
        )
        .execute(&pool)
        .await
        .context("failed to create kv_entries table")?;

        Ok(pool)
    }
}

impl Default for SqliteKvStore {
    fn default() -> Self {
        Self::new()
    }
}

fn backend(context: &str) -> impl FnOnce(sqlx::Error) -> StoreError + '_ {
    move |err| StoreError::Backend(format!("{context}: {err}"))
}

#[async_trait::async_trait]
impl KvStore for SqliteKvStore {
    async fn put(&self, partition: &str, key: &str, value: JsonValue) -> Result<(), StoreError> {
        let pool = self.pool().await?;
        let payload = serde_json::to_string(&value)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        // Single-statement upsert: the previous value survives a failed write.
        sqlx::query(
            r#"
            INSERT INTO kv_entries (partition, key, value, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(partition, key)
            DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(partition)
        .bind(key)
        .bind(&payload)
        .bind(Utc::now().to_rfc3339())
        .execute(&pool)
        .await
        .map_err(backend("failed to upsert entry"))?;

        Ok(())
    }

    async fn get(&self, partition: &str, key: &str) -> Result<Option<JsonValue>, StoreError> {
        let pool = self.pool().await?;

        let row = sqlx::query(
            r#"
            SELECT value
            FROM kv_entries
            WHERE partition = ?1
              AND key = ?2
            "#,
        )
        .bind(partition)
        .bind(key)
        .fetch_optional(&pool)
        .await
        .map_err(backend("failed to fetch entry"))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let data: String = row
            .try_get("value")
            .map_err(backend("failed to read value column"))?;
        let value = serde_json::from_str(&data)
            .map_err(|e| StoreError::Serialization(format!("{partition}/{key}: {e}")))?;
        Ok(Some(value))
    }

    async fn delete(&self, partition: &str, key: &str) -> Result<(), StoreError> {
        let pool = self.pool().await?;

        sqlx::query(
            r#"
            DELETE FROM kv_entries
            WHERE partition = ?1
              AND key = ?2
            "#,
        )
        .bind(partition)
        .bind(key)
        .execute(&pool)
        .await
        .map_err(backend("failed to delete entry"))?;

        Ok(())
    }

    async fn all_entries(&self, partition: &str) -> Result<BTreeMap<String, JsonValue>, StoreError> {
        let pool = self.pool().await?;

        let rows = sqlx::query(
            r#"
            SELECT key, value
            FROM kv_entries
            WHERE partition = ?1
            ORDER BY key ASC
            "#,
        )
        .bind(partition)
        .fetch_all(&pool)
        .await
        .map_err(backend("failed to list entries"))?;

        let mut entries = BTreeMap::new();
        for row in rows {
            let key: String = row.try_get("key").map_err(backend("failed to read key column"))?;
            let data: String = row
                .try_get("value")
                .map_err(backend("failed to read value column"))?;
            let value = serde_json::from_str(&data)
                .map_err(|e| StoreError::Serialization(format!("{partition}/{key}: {e}")))?;
            entries.insert(key, value);
        }

        Ok(entries)
    }

    async fn clear(&self, partition: &str) -> Result<(), StoreError> {
        let pool = self.pool().await?;

        sqlx::query(
            r#"
            DELETE FROM kv_entries
            WHERE partition = ?1
            "#,
        )
        .bind(partition)
        .execute(&pool)
        .await
        .map_err(backend("failed to clear partition"))?;

        tracing::debug!(partition, "cleared store partition");
        Ok(())
    }
}

async fn open_file(path: &Path) -> anyhow::Result<SqlitePool> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create store directory at {:?}", parent))?;
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    SqlitePool::connect_with(options)
        .await
        .with_context(|| format!("failed to create SQLite pool for store at {:?}", path))
}

/// Resolve the default database path: `{app_data_dir}/marketsync/store.db`.
fn default_db_path() -> anyhow::Result<PathBuf> {
    let base = dirs::data_dir()
        .or_else(|| dirs::home_dir().map(|mut h| {
            h.push(".local");
            h.push("share");
            h
        }))
        .context("failed to resolve OS app data directory - tried data_dir() and home_dir()/.local/share")?;

    let mut path = base;
    path.push("marketsync");
    path.push("store.db");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scratch_db() -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "marketsync-kv-{}-{}.db",
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        path
    }

    #[tokio::test]
    async fn put_get_delete_roundtrip() {
        let store = SqliteKvStore::in_memory();
        store.put("cache.profile", "current", json!({"username": "amina"})).await.unwrap();

        let value = store.get("cache.profile", "current").await.unwrap();
        assert_eq!(value, Some(json!({"username": "amina"})));

        store.delete("cache.profile", "current").await.unwrap();
        store.delete("cache.profile", "current").await.unwrap();
        assert_eq!(store.get("cache.profile", "current").await.unwrap(), None);
    }

    #[tokio::test]
    async fn upsert_replaces_whole_value() {
        let store = SqliteKvStore::in_memory();
        store.put("p", "k", json!({"a": 1, "b": 2})).await.unwrap();
        store.put("p", "k", json!({"a": 3})).await.unwrap();

        assert_eq!(store.get("p", "k").await.unwrap(), Some(json!({"a": 3})));
        assert_eq!(store.all_entries("p").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn clear_only_touches_one_partition() {
        let store = SqliteKvStore::in_memory();
        store.put("offline.bids", "bid_1", json!(1)).await.unwrap();
        store.put("offline.bookings", "booking_1", json!(2)).await.unwrap();

        store.clear("offline.bids").await.unwrap();

        assert!(store.all_entries("offline.bids").await.unwrap().is_empty());
        assert_eq!(store.all_entries("offline.bookings").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn values_survive_reopen() {
        let path = scratch_db();
        {
            let store = SqliteKvStore::open(&path);
            store.put("offline.meta", "next_sequence", json!(4)).await.unwrap();
        }

        let reopened = SqliteKvStore::open(&path);
        assert_eq!(
            reopened.get("offline.meta", "next_sequence").await.unwrap(),
            Some(json!(4))
        );

        let _ = std::fs::remove_file(&path);
    }
}
