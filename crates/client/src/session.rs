//! Wiring of one device session: store, transport, cache, queue and engine.

use std::sync::Arc;

use marketsync_infra::{KvStore, SqliteKvStore};

use crate::cache::CacheLayer;
use crate::config::SyncConfig;
use crate::offline::{ConnectivityMonitor, ConnectivityState};
use crate::offline_queue::OfflineQueue;
use crate::sync_engine::SyncEngine;
use crate::sync_worker::SyncWorker;
use crate::transport::{HttpTransport, Transport};

/// Everything a client shell needs for offline sync.
///
/// Database connections are initialized lazily on first use.
#[derive(Clone)]
pub struct SyncSession {
    pub engine: Arc<SyncEngine>,
    pub connectivity: ConnectivityMonitor,
}

impl SyncSession {
    /// SQLite store and HTTP transport, both from `config`.
    pub fn from_config(config: SyncConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn KvStore> = match &config.database_path {
            Some(path) => Arc::new(SqliteKvStore::open(path.clone())),
            None => Arc::new(SqliteKvStore::new()),
        };
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::from_config(&config)?);
        Ok(Self::with_parts(transport, store, config))
    }

    /// Assemble a session from injected collaborators.
    pub fn with_parts(
        transport: Arc<dyn Transport>,
        store: Arc<dyn KvStore>,
        config: SyncConfig,
    ) -> Self {
        let cache = CacheLayer::new(store.clone());
        let queue = OfflineQueue::new(store);
        let engine = Arc::new(SyncEngine::new(transport, cache, queue, config));
        Self {
            engine,
            connectivity: ConnectivityMonitor::new(ConnectivityState::Online),
        }
    }

    /// Worker bound to this session's engine and connectivity monitor.
    pub fn worker(&self) -> SyncWorker {
        SyncWorker::new(self.engine.clone(), self.connectivity.clone())
    }

    pub fn cache(&self) -> &CacheLayer {
        self.engine.cache()
    }

    pub fn queue(&self) -> &OfflineQueue {
        self.engine.queue()
    }
}

/// Install the process-wide subscriber in the configured format.
pub fn init_tracing(config: &SyncConfig) {
    marketsync_observability::init_with(config.log_format);
}
