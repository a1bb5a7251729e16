//! `marketsync-client`
//!
//! **Responsibility:** Offline synchronization for the marketplace client.
//!
//! This crate provides:
//! - Local snapshot caching with expiry metadata
//! - A durable queue of bids, bookings and messages recorded offline
//! - Batched uploads with per-item success/failure reporting
//! - Full, quick and reconnect-triggered syncs
//!
//! The server stays the authority for reads; the device is the authority for
//! its queued writes until the server confirms them.

pub mod cache;
pub mod config;
pub mod error;
pub mod offline;
pub mod offline_queue;
pub mod session;
pub mod sync_engine;
pub mod sync_worker;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod transport;
pub mod types;

pub use cache::{CacheLayer, CachedProfile, CachedServiceSet};
pub use config::SyncConfig;
pub use error::SyncError;
pub use offline::{ConnectivityMonitor, ConnectivityState};
pub use offline_queue::OfflineQueue;
pub use session::{SyncSession, init_tracing};
pub use sync_engine::{FullSyncOptions, SyncEngine};
pub use sync_worker::{SyncEvent, SyncWorker};
pub use transport::{HttpTransport, Method, Transport, TransportRequest, TransportResponse};
pub use types::{
    FailedItem, KindOutcome, LastSyncAttempt, PendingCounts, PendingMutation, ProcessedItem,
    RestoreReport, SyncOperation, SyncReport, SyncStatus, UploadBatch, UploadReport, UploadScope,
};
