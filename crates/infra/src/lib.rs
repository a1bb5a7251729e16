//! Infrastructure layer: durable storage backing the cache and offline queue.

pub mod kv_store;

pub use kv_store::{InMemoryKvStore, KvStore, SqliteKvStore, StoreError};
