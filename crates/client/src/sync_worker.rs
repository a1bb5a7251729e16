//! Background worker that syncs whenever connectivity comes back.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Notify, broadcast};

use crate::error::SyncError;
use crate::offline::{ConnectivityMonitor, ConnectivityState};
use crate::sync_engine::SyncEngine;
use crate::types::RestoreReport;

const EVENT_CAPACITY: usize = 32;

/// Outcome of one worker-triggered sync, published to UI subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    Completed {
        uploaded: usize,
        rejected: usize,
        refreshed: usize,
        /// `false` when at least one step failed.
        clean: bool,
    },
    Failed {
        error: String,
    },
    /// Another sync was already running.
    Skipped,
}

impl SyncEvent {
    fn from_restore(report: &RestoreReport) -> Self {
        let (uploaded, rejected) = report
            .upload
            .as_ref()
            .map(|upload| (upload.processed_count(), upload.failed_count()))
            .unwrap_or_default();
        let refreshed = report.services.iter().filter(|s| s.is_ok()).count()
            + usize::from(matches!(report.profile, Some(Ok(_))));
        SyncEvent::Completed {
            uploaded,
            rejected,
            refreshed,
            clean: report.is_success(),
        }
    }
}

/// Runs `on_connectivity_restored` on every `Offline -> Online` transition.
pub struct SyncWorker {
    engine: Arc<SyncEngine>,
    connectivity: ConnectivityMonitor,
    events: broadcast::Sender<SyncEvent>,
    shutdown: Arc<Notify>,
}

impl SyncWorker {
    pub fn new(engine: Arc<SyncEngine>, connectivity: ConnectivityMonitor) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            engine,
            connectivity,
            events,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Receive events of syncs started after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Start the background task.
    ///
    /// The task stops after `shutdown` or when every monitor handle is gone.
    pub fn start(&self) -> tokio::task::JoinHandle<()> {
        let engine = self.engine.clone();
        let connectivity = self.connectivity.clone();
        let events = self.events.clone();
        let shutdown = self.shutdown.clone();
        let mut rx = self.connectivity.subscribe();
        let mut previous = *rx.borrow_and_update();

        tokio::spawn(async move {
            tracing::info!("sync worker started");

            loop {
                tokio::select! {
                    _ = shutdown.notified() => {
                        tracing::info!("sync worker received shutdown signal");
                        break;
                    }
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let current = *rx.borrow_and_update();
                        let restored = previous == ConnectivityState::Offline
                            && current == ConnectivityState::Online;
                        previous = current;

                        if restored {
                            let event = Self::sync_once(&engine, &connectivity).await;
                            // No subscribers is fine.
                            let _ = events.send(event);
                        }
                    }
                }
            }

            tracing::info!("sync worker stopped");
        })
    }

    async fn sync_once(engine: &SyncEngine, connectivity: &ConnectivityMonitor) -> SyncEvent {
        match engine.on_connectivity_restored().await {
            Ok(report) => {
                if let Err(SyncError::Transport { status_code: 0, message }) = &report.upload {
                    tracing::warn!("upload could not reach the server: {message}");
                    connectivity.set_offline();
                }
                SyncEvent::from_restore(&report)
            }
            Err(SyncError::AlreadyInProgress) => {
                tracing::debug!("sync already running; skipping worker trigger");
                SyncEvent::Skipped
            }
            Err(e) => {
                tracing::error!("sync after reconnect failed: {e}");
                SyncEvent::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Request graceful shutdown of the worker.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}
