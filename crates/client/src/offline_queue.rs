//! Durable queue of mutations recorded while offline.
//!
//! Each mutation kind lives in its own store partition, keyed by its client
//! temp id. Creation order is kept by a persistent sequence counter, so
//! ordering and id uniqueness survive restarts.

use std::sync::Arc;

use chrono::Utc;
use marketsync_core::{ClientTempId, MutationKind, OfflineMutation};
use marketsync_infra::{KvStore, StoreError};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::SyncError;
use crate::types::{PendingCounts, PendingMutation};

const META_PARTITION: &str = "offline.meta";
const NEXT_SEQUENCE_KEY: &str = "next_sequence";

fn partition(kind: MutationKind) -> &'static str {
    match kind {
        MutationKind::Bid => "offline.bids",
        MutationKind::Booking => "offline.bookings",
        MutationKind::Message => "offline.messages",
    }
}

/// Store-backed offline mutation queue.
///
/// This struct is cheap to clone; clones share one writer lock, so enqueue,
/// dequeue and clear are serialized across all handles. Reads take no lock.
#[derive(Clone)]
pub struct OfflineQueue {
    store: Arc<dyn KvStore>,
    write_lock: Arc<Mutex<()>>,
}

impl OfflineQueue {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Persist a new mutation and return its client temp id.
    ///
    /// Never deduplicates: identical payloads produce distinct entries.
    pub async fn enqueue(
        &self,
        mutation: impl Into<OfflineMutation>,
    ) -> Result<ClientTempId, SyncError> {
        let mutation = mutation.into();
        mutation.validate()?;

        let kind = mutation.kind();
        let _guard = self.write_lock.lock().await;

        let sequence = self.next_sequence().await?;
        self.store
            .put(META_PARTITION, NEXT_SEQUENCE_KEY, Value::from(sequence + 1))
            .await?;

        let entry = PendingMutation {
            client_temp_id: ClientTempId::generate(kind),
            sequence,
            created_at: Utc::now(),
            mutation,
        };
        let value =
            serde_json::to_value(&entry).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.store
            .put(partition(kind), entry.client_temp_id.as_str(), value)
            .await?;

        tracing::info!(client_temp_id = %entry.client_temp_id, sequence, "queued offline {kind}");
        Ok(entry.client_temp_id)
    }

    /// Remove a mutation after the server confirmed it. Absent ids are a no-op.
    pub async fn dequeue(&self, id: &ClientTempId) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.remove(id).await
    }

    /// Drop a mutation the user decided not to retry.
    ///
    /// Returns whether the mutation was still queued.
    pub async fn discard(&self, id: &ClientTempId) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        let existed = self.get(id).await?.is_some();
        self.remove(id).await?;
        if existed {
            tracing::info!(client_temp_id = %id, "discarded offline mutation");
        }
        Ok(existed)
    }

    pub async fn get(&self, id: &ClientTempId) -> Result<Option<PendingMutation>, StoreError> {
        for kind in candidate_kinds(id) {
            if let Some(value) = self.store.get(partition(kind), id.as_str()).await? {
                return decode(value).map(Some);
            }
        }
        Ok(None)
    }

    /// Pending mutations of one kind, in creation order.
    pub async fn all_pending(&self, kind: MutationKind) -> Result<Vec<PendingMutation>, StoreError> {
        let entries = self.store.all_entries(partition(kind)).await?;
        let mut pending = entries
            .into_values()
            .map(decode)
            .collect::<Result<Vec<_>, _>>()?;
        pending.sort_by_key(|p| p.sequence);
        Ok(pending)
    }

    /// Pending mutations of every kind, in creation order.
    pub async fn all_pending_any(&self) -> Result<Vec<PendingMutation>, StoreError> {
        let mut pending = Vec::new();
        for kind in MutationKind::ALL {
            pending.extend(self.all_pending(kind).await?);
        }
        pending.sort_by_key(|p| p.sequence);
        Ok(pending)
    }

    pub async fn counts_by_type(&self) -> Result<PendingCounts, StoreError> {
        let mut counts = PendingCounts::default();
        for kind in MutationKind::ALL {
            let entries = self.store.all_entries(partition(kind)).await?;
            counts.set(kind, entries.len());
        }
        Ok(counts)
    }

    pub async fn has_pending(&self) -> Result<bool, StoreError> {
        Ok(self.counts_by_type().await?.total() > 0)
    }

    /// Discard every pending mutation (explicit user reset only).
    ///
    /// The sequence counter is kept so later entries still sort after any
    /// entry created before the reset.
    pub async fn clear_all(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        for kind in MutationKind::ALL {
            self.store.clear(partition(kind)).await?;
        }
        tracing::warn!("all offline mutations discarded");
        Ok(())
    }

    async fn remove(&self, id: &ClientTempId) -> Result<(), StoreError> {
        for kind in candidate_kinds(id) {
            self.store.delete(partition(kind), id.as_str()).await?;
        }
        Ok(())
    }

    async fn next_sequence(&self) -> Result<u64, StoreError> {
        match self.store.get(META_PARTITION, NEXT_SEQUENCE_KEY).await? {
            None => Ok(1),
            Some(value) => value.as_u64().ok_or_else(|| {
                StoreError::Serialization(format!("invalid {NEXT_SEQUENCE_KEY}: {value}"))
            }),
        }
    }
}

/// Kinds whose partition may hold `id`; every kind if the prefix is foreign.
fn candidate_kinds(id: &ClientTempId) -> Vec<MutationKind> {
    match id.kind() {
        Some(kind) => vec![kind],
        None => MutationKind::ALL.to_vec(),
    }
}

fn decode(value: Value) -> Result<PendingMutation, StoreError> {
    serde_json::from_value(value).map_err(|e| StoreError::Serialization(e.to_string()))
}
