//! Shared types: queue entries, upload batches/reports and sync summaries.

use chrono::{DateTime, Utc};
use marketsync_core::{ClientTempId, MutationKind, OfflineMutation, ServerId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::cache::{CachedProfile, CachedServiceSet};
use crate::error::SyncError;

/// A queued offline mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingMutation {
    pub client_temp_id: ClientTempId,
    /// Position in the device-wide creation order.
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
    pub mutation: OfflineMutation,
}

impl PendingMutation {
    pub fn kind(&self) -> MutationKind {
        self.mutation.kind()
    }

    /// Wire form: the payload fields plus `clientTempId`.
    pub fn to_upload_item(&self) -> Result<Value, serde_json::Error> {
        let payload = match &self.mutation {
            OfflineMutation::Bid(bid) => serde_json::to_value(bid)?,
            OfflineMutation::Booking(booking) => serde_json::to_value(booking)?,
            OfflineMutation::Message(message) => serde_json::to_value(message)?,
        };
        let mut item = match payload {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("payload".to_string(), other);
                map
            }
        };
        item.insert(
            "clientTempId".to_string(),
            Value::String(self.client_temp_id.to_string()),
        );
        Ok(Value::Object(item))
    }
}

/// Number of pending mutations per kind (UI badges, upload gating).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PendingCounts {
    pub bids: usize,
    pub bookings: usize,
    pub messages: usize,
}

impl PendingCounts {
    pub fn get(&self, kind: MutationKind) -> usize {
        match kind {
            MutationKind::Bid => self.bids,
            MutationKind::Booking => self.bookings,
            MutationKind::Message => self.messages,
        }
    }

    pub(crate) fn set(&mut self, kind: MutationKind, count: usize) {
        match kind {
            MutationKind::Bid => self.bids = count,
            MutationKind::Booking => self.bookings = count,
            MutationKind::Message => self.messages = count,
        }
    }

    pub fn total(&self) -> usize {
        self.bids + self.bookings + self.messages
    }
}

/// Which mutation kinds an upload covers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum UploadScope {
    #[default]
    All,
    Only(Vec<MutationKind>),
}

impl UploadScope {
    pub fn includes(&self, kind: MutationKind) -> bool {
        match self {
            UploadScope::All => true,
            UploadScope::Only(kinds) => kinds.contains(&kind),
        }
    }

    pub fn kinds(&self) -> Vec<MutationKind> {
        MutationKind::ALL
            .into_iter()
            .filter(|kind| self.includes(*kind))
            .collect()
    }
}

/// Snapshot of pending mutations submitted in one upload request.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadBatch {
    pub timestamp: DateTime<Utc>,
    pub bids: Vec<PendingMutation>,
    pub bookings: Vec<PendingMutation>,
    pub messages: Vec<PendingMutation>,
}

impl UploadBatch {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            bids: Vec::new(),
            bookings: Vec::new(),
            messages: Vec::new(),
        }
    }

    pub fn items(&self, kind: MutationKind) -> &[PendingMutation] {
        match kind {
            MutationKind::Bid => &self.bids,
            MutationKind::Booking => &self.bookings,
            MutationKind::Message => &self.messages,
        }
    }

    pub(crate) fn items_mut(&mut self, kind: MutationKind) -> &mut Vec<PendingMutation> {
        match kind {
            MutationKind::Bid => &mut self.bids,
            MutationKind::Booking => &mut self.bookings,
            MutationKind::Message => &mut self.messages,
        }
    }

    pub fn len(&self) -> usize {
        self.bids.len() + self.bookings.len() + self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Request body of `POST /sync/upload`.
    pub fn to_request_body(&self) -> Result<Value, serde_json::Error> {
        let encode = |items: &[PendingMutation]| -> Result<Vec<Value>, serde_json::Error> {
            items.iter().map(PendingMutation::to_upload_item).collect()
        };
        Ok(serde_json::json!({
            "timestamp": self.timestamp.to_rfc3339(),
            "bids": encode(&self.bids)?,
            "bookings": encode(&self.bookings)?,
            "messages": encode(&self.messages)?,
        }))
    }
}

/// A mutation the server accepted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedItem {
    pub client_temp_id: ClientTempId,
    /// Identifier the server assigned, when it reported one.
    pub server_id: Option<ServerId>,
    /// Server representation of the created resource.
    pub record: Value,
}

/// A mutation the server did not accept; it stays queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedItem {
    pub client_temp_id: ClientTempId,
    pub reason: String,
}

/// Outcome of one mutation kind within an upload.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KindOutcome {
    pub processed: Vec<ProcessedItem>,
    pub failed: Vec<FailedItem>,
}

/// Per-item outcome of `upload_pending`.
///
/// Every submitted client temp id appears in exactly one of `processed` or
/// `failed` of its kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UploadReport {
    pub bids: KindOutcome,
    pub bookings: KindOutcome,
    pub messages: KindOutcome,
}

impl UploadReport {
    pub fn for_kind(&self, kind: MutationKind) -> &KindOutcome {
        match kind {
            MutationKind::Bid => &self.bids,
            MutationKind::Booking => &self.bookings,
            MutationKind::Message => &self.messages,
        }
    }

    pub(crate) fn for_kind_mut(&mut self, kind: MutationKind) -> &mut KindOutcome {
        match kind {
            MutationKind::Bid => &mut self.bids,
            MutationKind::Booking => &mut self.bookings,
            MutationKind::Message => &mut self.messages,
        }
    }

    pub fn processed(&self) -> impl Iterator<Item = &ProcessedItem> {
        MutationKind::ALL
            .into_iter()
            .flat_map(move |kind| self.for_kind(kind).processed.iter())
    }

    pub fn failures(&self) -> impl Iterator<Item = &FailedItem> {
        MutationKind::ALL
            .into_iter()
            .flat_map(move |kind| self.for_kind(kind).failed.iter())
    }

    pub fn processed_count(&self) -> usize {
        self.processed().count()
    }

    pub fn failed_count(&self) -> usize {
        self.failures().count()
    }

    /// `true` when nothing was rejected.
    pub fn is_clean(&self) -> bool {
        self.failed_count() == 0
    }
}

/// Outcome of `perform_full_sync` / `perform_quick_sync`.
///
/// Each step is inspectable on its own; `profile` is `None` when the step was
/// not part of the operation (quick sync).
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub upload: Result<UploadReport, SyncError>,
    pub profile: Option<Result<CachedProfile, SyncError>>,
    pub services: Result<CachedServiceSet, SyncError>,
}

impl SyncReport {
    /// `true` only if every executed step succeeded.
    pub fn is_success(&self) -> bool {
        self.upload.is_ok()
            && self.profile.as_ref().is_none_or(|p| p.is_ok())
            && self.services.is_ok()
    }
}

/// Outcome of `on_connectivity_restored`.
#[derive(Debug, Clone)]
pub struct RestoreReport {
    pub upload: Result<UploadReport, SyncError>,
    /// Present when the cached profile was expired and a refresh was attempted.
    pub profile: Option<Result<CachedProfile, SyncError>>,
    /// One entry per expired service set that was re-downloaded.
    pub services: Vec<Result<CachedServiceSet, SyncError>>,
}

impl RestoreReport {
    pub fn is_success(&self) -> bool {
        self.upload.is_ok()
            && self.profile.as_ref().is_none_or(|p| p.is_ok())
            && self.services.iter().all(|s| s.is_ok())
    }
}

/// Name of an engine operation, recorded in the last-attempt status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperation {
    Upload,
    FullSync,
    QuickSync,
    ConnectivityRestore,
}

/// Outcome of the most recent serialized sync operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastSyncAttempt {
    pub operation: SyncOperation,
    pub finished_at: DateTime<Utc>,
    pub succeeded: bool,
    pub message: Option<String>,
}

/// Snapshot for UI badges and "last synced" banners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub pending: PendingCounts,
    pub in_progress: bool,
    pub last_attempt: Option<LastSyncAttempt>,
}
