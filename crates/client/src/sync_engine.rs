//! Sync engine: downloads snapshots into the cache and drains the offline
//! queue through batched uploads.
//!
//! This module provides a `SyncEngine` that:
//! - Downloads the profile and filtered service sets into the `CacheLayer`
//! - Uploads every pending offline mutation in one request per call
//! - Dequeues only mutations the server confirmed, keeping the rest
//! - Sequences full, quick and connectivity-restore syncs
//! - Serializes uploads and composite syncs with an in-progress flag

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use marketsync_core::{
    ClientTempId, MutationKind, ServerId, ServiceFilter, ServiceRecord, SyncMetadata, UserProfile,
};
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::cache::{CacheLayer, CachedProfile, CachedServiceSet};
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::offline_queue::OfflineQueue;
use crate::transport::{Transport, TransportRequest};
use crate::types::{
    FailedItem, LastSyncAttempt, ProcessedItem, RestoreReport, SyncOperation, SyncReport,
    SyncStatus, UploadBatch, UploadReport, UploadScope,
};

pub const PROFILE_PATH: &str = "/sync/profile";
pub const SERVICES_PATH: &str = "/sync/services";
pub const UPLOAD_PATH: &str = "/sync/upload";

/// Options of `perform_full_sync`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FullSyncOptions {
    /// Services to refresh; a missing limit falls back to `full_sync_limit`.
    pub services: ServiceFilter,
}

/// Offline synchronization engine for one device session.
///
/// Construct once per session; it holds no global state. This struct is cheap
/// to clone and clones share the in-progress flag and last-attempt status.
///
/// Uploads and composite syncs run on their own task: once started they finish
/// even if the caller stops awaiting them.
#[derive(Clone)]
pub struct SyncEngine {
    transport: Arc<dyn Transport>,
    cache: CacheLayer,
    queue: OfflineQueue,
    config: Arc<SyncConfig>,
    in_progress: Arc<AtomicBool>,
    last_attempt: Arc<Mutex<Option<LastSyncAttempt>>>,
}

/// Clears the in-progress flag when the operation ends (or is dropped).
struct InProgressGuard(Arc<AtomicBool>);

impl Drop for InProgressGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SyncEngine {
    pub fn new(
        transport: Arc<dyn Transport>,
        cache: CacheLayer,
        queue: OfflineQueue,
        config: SyncConfig,
    ) -> Self {
        Self {
            transport,
            cache,
            queue,
            config: Arc::new(config),
            in_progress: Arc::new(AtomicBool::new(false)),
            last_attempt: Arc::new(Mutex::new(None)),
        }
    }

    pub fn cache(&self) -> &CacheLayer {
        &self.cache
    }

    pub fn queue(&self) -> &OfflineQueue {
        &self.queue
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Download the profile and replace the cached copy.
    ///
    /// On failure the cached profile is left untouched.
    pub async fn download_profile(&self) -> Result<CachedProfile, SyncError> {
        let result = self.fetch_profile().await;
        if let Err(e) = &result {
            tracing::warn!("profile download failed: {e}");
        }
        result
    }

    async fn fetch_profile(&self) -> Result<CachedProfile, SyncError> {
        let data = self
            .transport
            .request(TransportRequest::get(PROFILE_PATH))
            .await
            .into_data()?;

        let profile: UserProfile = serde_json::from_value(unwrap_envelope(data, "profile"))
            .map_err(|e| SyncError::Decode(format!("profile: {e}")))?;
        let metadata = SyncMetadata::fresh(Utc::now(), self.config.profile_ttl);

        let cached = self.cache.save_profile(profile, metadata).await?;
        tracing::info!(username = %cached.profile.username, "profile synced");
        Ok(cached)
    }

    /// Download services matching `filter` and replace the cached set for its
    /// signature.
    pub async fn download_services(
        &self,
        filter: ServiceFilter,
    ) -> Result<CachedServiceSet, SyncError> {
        let result = self.fetch_services(filter).await;
        if let Err(e) = &result {
            tracing::warn!("service download failed: {e}");
        }
        result
    }

    async fn fetch_services(&self, filter: ServiceFilter) -> Result<CachedServiceSet, SyncError> {
        let filter = filter.normalized();
        let request = TransportRequest::get(SERVICES_PATH).with_query(filter.query_pairs());
        let data = self.transport.request(request).await.into_data()?;

        let (services, total) = parse_services(data)?;
        let metadata = SyncMetadata::fresh(Utc::now(), self.config.services_ttl);

        let cached = self
            .cache
            .save_service_set(filter, services, total, metadata)
            .await?;
        tracing::info!(
            signature = %cached.signature,
            count = cached.services.len(),
            total = cached.total,
            "services synced"
        );
        Ok(cached)
    }

    pub async fn download_services_by_category(
        &self,
        category: &str,
        limit: Option<u32>,
    ) -> Result<CachedServiceSet, SyncError> {
        let mut filter = ServiceFilter::new().category(category);
        filter.limit = limit;
        self.download_services(filter).await
    }

    pub async fn download_services_by_location(
        &self,
        location: &str,
        limit: Option<u32>,
    ) -> Result<CachedServiceSet, SyncError> {
        let mut filter = ServiceFilter::new().location(location);
        filter.limit = limit;
        self.download_services(filter).await
    }

    /// Small unfiltered download for constrained connections.
    pub async fn download_services_fast(
        &self,
        limit: Option<u32>,
    ) -> Result<CachedServiceSet, SyncError> {
        let limit = limit.unwrap_or(self.config.fast_limit);
        self.download_services(ServiceFilter::new().limit(limit)).await
    }

    /// Upload pending mutations in `scope` as one batch.
    ///
    /// Processed mutations are dequeued; failed or unacknowledged ones stay
    /// queued and are listed in the report. A transport failure leaves the
    /// queue untouched.
    pub async fn upload_pending(&self, scope: UploadScope) -> Result<UploadReport, SyncError> {
        let guard = self.begin()?;
        let engine = self.clone();
        run_to_completion(async move {
            let _guard = guard;
            let result = engine.upload_unguarded(&scope).await;
            engine.record(SyncOperation::Upload, &result, UploadReport::is_clean);
            result
        })
        .await
    }

    /// Upload everything, then refresh profile and services.
    ///
    /// Every step runs even if an earlier one failed; a storage failure aborts
    /// the whole operation instead.
    pub async fn perform_full_sync(&self, options: FullSyncOptions) -> Result<SyncReport, SyncError> {
        let guard = self.begin()?;
        let engine = self.clone();
        run_to_completion(async move {
            let _guard = guard;
            tracing::info!("starting full sync");
            let result = engine.full_sync_unguarded(options).await;
            engine.record(SyncOperation::FullSync, &result, SyncReport::is_success);
            result
        })
        .await
    }

    async fn full_sync_unguarded(&self, options: FullSyncOptions) -> Result<SyncReport, SyncError> {
        let upload = step(self.upload_unguarded(&UploadScope::All).await)?;
        let profile = step(self.download_profile().await)?;

        let mut filter = options.services;
        if filter.limit.is_none() {
            filter.limit = Some(self.config.full_sync_limit);
        }
        let services = step(self.download_services(filter).await)?;

        Ok(SyncReport {
            upload,
            profile: Some(profile),
            services,
        })
    }

    /// Upload everything, then refresh a small service page. Skips the profile.
    pub async fn perform_quick_sync(&self, limit: Option<u32>) -> Result<SyncReport, SyncError> {
        let guard = self.begin()?;
        let engine = self.clone();
        run_to_completion(async move {
            let _guard = guard;
            tracing::debug!("starting quick sync");
            let result = engine.quick_sync_unguarded(limit).await;
            engine.record(SyncOperation::QuickSync, &result, SyncReport::is_success);
            result
        })
        .await
    }

    async fn quick_sync_unguarded(&self, limit: Option<u32>) -> Result<SyncReport, SyncError> {
        let upload = step(self.upload_unguarded(&UploadScope::All).await)?;
        let limit = limit.unwrap_or(self.config.quick_sync_limit);
        let services = step(self.download_services(ServiceFilter::new().limit(limit)).await)?;
        Ok(SyncReport {
            upload,
            profile: None,
            services,
        })
    }

    /// Upload everything, then refresh only the cache entries that expired.
    pub async fn on_connectivity_restored(&self) -> Result<RestoreReport, SyncError> {
        let guard = self.begin()?;
        let engine = self.clone();
        run_to_completion(async move {
            let _guard = guard;
            tracing::info!("connectivity restored; syncing");
            let result = engine.restore_unguarded().await;
            engine.record(
                SyncOperation::ConnectivityRestore,
                &result,
                RestoreReport::is_success,
            );
            result
        })
        .await
    }

    async fn restore_unguarded(&self) -> Result<RestoreReport, SyncError> {
        let upload = step(self.upload_unguarded(&UploadScope::All).await)?;
        let now = Utc::now();

        let profile = match self.cache.get_profile().await? {
            Some(cached) if CacheLayer::is_expired(&cached.metadata, now) => {
                Some(step(self.download_profile().await)?)
            }
            _ => None,
        };

        let mut services = Vec::new();
        for set in self.cache.all_service_sets().await? {
            if CacheLayer::is_expired(&set.metadata, now) {
                tracing::debug!(signature = %set.signature, "refreshing expired service set");
                services.push(step(self.download_services(set.filter).await)?);
            }
        }

        Ok(RestoreReport {
            upload,
            profile,
            services,
        })
    }

    /// Pending counts, in-progress flag and outcome of the last sync.
    pub async fn status(&self) -> Result<SyncStatus, SyncError> {
        let pending = self.queue.counts_by_type().await?;
        Ok(SyncStatus {
            pending,
            in_progress: self.in_progress.load(Ordering::Acquire),
            last_attempt: self.last_attempt(),
        })
    }

    pub fn last_attempt(&self) -> Option<LastSyncAttempt> {
        self.last_attempt
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Run `upload_pending` in the background and return its handle.
    pub fn spawn_upload(
        &self,
        scope: UploadScope,
    ) -> JoinHandle<Result<UploadReport, SyncError>> {
        let engine = self.clone();
        tokio::spawn(async move { engine.upload_pending(scope).await })
    }

    pub fn spawn_full_sync(
        &self,
        options: FullSyncOptions,
    ) -> JoinHandle<Result<SyncReport, SyncError>> {
        let engine = self.clone();
        tokio::spawn(async move { engine.perform_full_sync(options).await })
    }

    pub fn spawn_quick_sync(
        &self,
        limit: Option<u32>,
    ) -> JoinHandle<Result<SyncReport, SyncError>> {
        let engine = self.clone();
        tokio::spawn(async move { engine.perform_quick_sync(limit).await })
    }

    pub fn spawn_connectivity_restored(&self) -> JoinHandle<Result<RestoreReport, SyncError>> {
        let engine = self.clone();
        tokio::spawn(async move { engine.on_connectivity_restored().await })
    }

    fn begin(&self) -> Result<InProgressGuard, SyncError> {
        self.in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SyncError::AlreadyInProgress)?;
        Ok(InProgressGuard(self.in_progress.clone()))
    }

    fn record<T>(
        &self,
        operation: SyncOperation,
        result: &Result<T, SyncError>,
        succeeded: impl Fn(&T) -> bool,
    ) {
        let (succeeded, message) = match result {
            Ok(value) if succeeded(value) => (true, None),
            Ok(_) => (false, Some("completed with failures".to_string())),
            Err(e) => (false, Some(e.to_string())),
        };
        let attempt = LastSyncAttempt {
            operation,
            finished_at: Utc::now(),
            succeeded,
            message,
        };
        match self.last_attempt.lock() {
            Ok(mut guard) => *guard = Some(attempt),
            Err(poisoned) => *poisoned.into_inner() = Some(attempt),
        }
    }

    async fn upload_unguarded(&self, scope: &UploadScope) -> Result<UploadReport, SyncError> {
        let mut batch = UploadBatch::new(Utc::now());
        for kind in scope.kinds() {
            *batch.items_mut(kind) = self.queue.all_pending(kind).await?;
        }

        if batch.is_empty() {
            tracing::debug!("no pending mutations to upload");
            return Ok(UploadReport::default());
        }

        tracing::info!(
            bids = batch.bids.len(),
            bookings = batch.bookings.len(),
            messages = batch.messages.len(),
            "uploading offline mutations"
        );

        let body = batch
            .to_request_body()
            .map_err(|e| SyncError::Decode(format!("failed to encode upload batch: {e}")))?;
        let data = match self
            .transport
            .request(TransportRequest::post(UPLOAD_PATH, body))
            .await
            .into_data()
        {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!("upload failed, {} mutation(s) stay queued: {e}", batch.len());
                return Err(e);
            }
        };

        let response = parse_upload_response(&data)?;
        let report = reconcile(&batch, response);

        for item in report.processed() {
            self.queue.dequeue(&item.client_temp_id).await?;
        }
        for failure in report.failures() {
            tracing::warn!(
                client_temp_id = %failure.client_temp_id,
                "server rejected offline mutation: {}",
                failure.reason
            );
        }

        tracing::info!(
            processed = report.processed_count(),
            failed = report.failed_count(),
            "upload complete"
        );
        Ok(report)
    }
}

/// Drive `operation` on its own task and wait for it.
///
/// Dropping the returned future detaches the task instead of cancelling it, so
/// a batch the server already accepted is still dequeued.
async fn run_to_completion<T, F>(operation: F) -> Result<T, SyncError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, SyncError>> + Send + 'static,
{
    match tokio::spawn(operation).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => Err(SyncError::Interrupted(e.to_string())),
    }
}

/// Keep a failed step's outcome, but abort the composite on storage failures.
fn step<T>(result: Result<T, SyncError>) -> Result<Result<T, SyncError>, SyncError> {
    match result {
        Err(e) if e.is_storage() => {
            tracing::error!("aborting sync: {e}");
            Err(e)
        }
        other => Ok(other),
    }
}

/// Accept both `{"<key>": {...}}` and a bare object.
fn unwrap_envelope(data: Value, key: &str) -> Value {
    match data {
        Value::Object(mut map) if map.contains_key(key) => map.remove(key).unwrap_or(Value::Null),
        other => other,
    }
}

/// `{services, count}`, a paginated `{results, count}` page, or a bare array.
fn parse_services(data: Value) -> Result<(Vec<ServiceRecord>, usize), SyncError> {
    let (list, count) = match data {
        Value::Array(items) => (Value::Array(items), None),
        Value::Object(mut map) => {
            let count = map.get("count").and_then(Value::as_u64);
            let list = map
                .remove("services")
                .or_else(|| map.remove("results"))
                .ok_or_else(|| SyncError::Decode("services: missing 'services' list".to_string()))?;
            (list, count)
        }
        other => {
            return Err(SyncError::Decode(format!(
                "services: expected object or array, got {other}"
            )));
        }
    };

    let services: Vec<ServiceRecord> =
        serde_json::from_value(list).map_err(|e| SyncError::Decode(format!("services: {e}")))?;
    let total = count
        .and_then(|c| usize::try_from(c).ok())
        .unwrap_or(services.len());
    Ok((services, total))
}

/// Upload response as reported by the server, before reconciliation.
#[derive(Debug, Default)]
struct UploadResponse {
    processed: HashMap<MutationKind, Vec<ProcessedItem>>,
    errors: HashMap<ClientTempId, String>,
}

fn parse_upload_response(data: &Value) -> Result<UploadResponse, SyncError> {
    let object = data
        .as_object()
        .ok_or_else(|| SyncError::Decode("upload: expected a JSON object".to_string()))?;
    let mut response = UploadResponse::default();

    for (kind, key) in [
        (MutationKind::Bid, "processedBids"),
        (MutationKind::Booking, "processedBookings"),
        (MutationKind::Message, "processedMessages"),
    ] {
        let Some(entries) = object.get(key) else {
            continue;
        };
        let entries = entries
            .as_array()
            .ok_or_else(|| SyncError::Decode(format!("upload: '{key}' is not a list")))?;

        let items = response.processed.entry(kind).or_default();
        for entry in entries {
            let Some(client_temp_id) = temp_id_of(entry) else {
                tracing::warn!("upload: processed {kind} without clientTempId ignored");
                continue;
            };
            let server_id = entry
                .get("id")
                .or_else(|| entry.get("serverId"))
                .and_then(|v| serde_json::from_value::<ServerId>(v.clone()).ok());
            items.push(ProcessedItem {
                client_temp_id,
                server_id,
                record: entry.clone(),
            });
        }
    }

    if let Some(errors) = object.get("errors") {
        let errors = errors
            .as_array()
            .ok_or_else(|| SyncError::Decode("upload: 'errors' is not a list".to_string()))?;
        for entry in errors {
            let Some(client_temp_id) = temp_id_of(entry) else {
                tracing::warn!("upload: error entry without clientTempId ignored: {entry}");
                continue;
            };
            let reason = match entry.get("error") {
                Some(Value::String(reason)) => reason.clone(),
                Some(other) => other.to_string(),
                None => "rejected by server".to_string(),
            };
            response.errors.insert(client_temp_id, reason);
        }
    }

    Ok(response)
}

fn temp_id_of(entry: &Value) -> Option<ClientTempId> {
    entry
        .get("clientTempId")
        .or_else(|| entry.get("client_temp_id"))
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

/// Classify every submitted id as processed or failed, exactly once.
///
/// Ids the server omitted, or reported as both processed and failed, count as
/// failures so they are never dequeued without a clean confirmation. Ids the
/// server mentions that were not submitted are ignored.
fn reconcile(batch: &UploadBatch, mut response: UploadResponse) -> UploadReport {
    let mut report = UploadReport::default();
    let mut submitted = HashSet::new();

    for kind in MutationKind::ALL {
        let mut processed: HashMap<ClientTempId, ProcessedItem> = response
            .processed
            .remove(&kind)
            .unwrap_or_default()
            .into_iter()
            .map(|item| (item.client_temp_id.clone(), item))
            .collect();
        let outcome = report.for_kind_mut(kind);

        for pending in batch.items(kind) {
            let id = &pending.client_temp_id;
            submitted.insert(id.clone());
            let success = processed.remove(id);
            let error = response.errors.remove(id);

            match (success, error) {
                (Some(item), None) => outcome.processed.push(item),
                (None, Some(reason)) => outcome.failed.push(FailedItem {
                    client_temp_id: id.clone(),
                    reason,
                }),
                (Some(_), Some(reason)) => outcome.failed.push(FailedItem {
                    client_temp_id: id.clone(),
                    reason: format!("server reported both success and failure: {reason}"),
                }),
                (None, None) => outcome.failed.push(FailedItem {
                    client_temp_id: id.clone(),
                    reason: "not acknowledged by server".to_string(),
                }),
            }
        }

        for stray in processed.keys() {
            tracing::warn!(client_temp_id = %stray, "upload: server processed an id that was not submitted as {kind}");
        }
    }

    for stray in response.errors.keys().filter(|id| !submitted.contains(*id)) {
        tracing::warn!(client_temp_id = %stray, "upload: server reported an error for an id that was not submitted");
    }

    report
}
