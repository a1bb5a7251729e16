//! Partitioned key-value store.
//!
//! Every cache snapshot and every queued offline mutation lives in this store
//! as a JSON value under `(partition, key)`. The store is a passive ledger:
//! it knows nothing about expiry, ordering or upload state.

pub mod in_memory;
pub mod sqlite;
pub mod r#trait;

pub use in_memory::InMemoryKvStore;
pub use r#trait::{KvStore, StoreError};
pub use sqlite::SqliteKvStore;
