//! End-to-end sync scenarios on the SQLite store with a scripted server.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Utc};
use marketsync_client::sync_engine::{PROFILE_PATH, SERVICES_PATH, UPLOAD_PATH};
use marketsync_client::testing::StubTransport;
use marketsync_client::{
    CacheLayer, FullSyncOptions, Method, SyncConfig, SyncSession, TransportRequest,
    TransportResponse, UploadScope,
};
use marketsync_core::{
    BidMutation, BookingMutation, MessageMutation, MessageType, MutationKind, ServiceFilter,
};
use marketsync_infra::{KvStore, SqliteKvStore};
use serde_json::{Value, json};

fn scratch_db() -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!(
        "marketsync-scenario-{}-{}.db",
        std::process::id(),
        Utc::now().timestamp_nanos_opt().unwrap_or_default()
    ));
    path
}

fn session(stub: Arc<StubTransport>, store: Arc<dyn KvStore>) -> SyncSession {
    SyncSession::with_parts(stub, store, SyncConfig::default())
}

fn booking() -> BookingMutation {
    BookingMutation {
        service_id: "svc-3".to_string(),
        provider_id: "prov-8".to_string(),
        date: NaiveDate::from_ymd_opt(2026, 5, 2).unwrap(),
        time: NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
        amount: 120.0,
        address: "4 Quay St".to_string(),
        notes: Some("Gate code 1942".to_string()),
    }
}

fn bid(amount: f64) -> BidMutation {
    BidMutation {
        service_id: "svc-1".to_string(),
        amount,
        message: "Happy to help".to_string(),
        duration_days: 1,
    }
}

/// Server that accepts everything except bids under 10.
fn server(request: &TransportRequest) -> TransportResponse {
    let body = request.body.clone().unwrap_or_default();
    let mut errors = Vec::new();
    let mut processed = |key: &str| -> Vec<Value> {
        let mut out = Vec::new();
        for item in body[key].as_array().into_iter().flatten() {
            let id = item["clientTempId"].clone();
            if key == "bids" && item["amount"].as_f64().unwrap_or(0.0) < 10.0 {
                errors.push(json!({"clientTempId": id, "error": "invalid amount"}));
            } else {
                out.push(json!({"id": out.len() + 1, "clientTempId": id}));
            }
        }
        out
    };
    let bids = processed("bids");
    let bookings = processed("bookings");
    let messages = processed("messages");
    TransportResponse::ok(json!({
        "processedBids": bids,
        "processedBookings": bookings,
        "processedMessages": messages,
        "errors": errors,
    }))
}

fn online_server() -> Arc<StubTransport> {
    let stub = Arc::new(StubTransport::new());
    stub.respond_with(Method::Post, UPLOAD_PATH, server);
    stub.respond(
        Method::Get,
        PROFILE_PATH,
        TransportResponse::ok(json!({
            "profile": {"id": 5, "username": "amina", "email": "amina@example.test", "rating": 4.8}
        })),
    );
    stub.respond(
        Method::Get,
        SERVICES_PATH,
        TransportResponse::ok(json!({
            "services": [
                {"id": 1, "title": "Deep clean", "category": "cleaning", "price": "45.00"},
                {"id": 2, "title": "Window wash", "category": "cleaning", "price": 30}
            ],
            "count": 37,
        })),
    );
    stub
}

#[tokio::test]
async fn offline_work_is_reconciled_by_full_sync() {
    let stub = online_server();
    let session = session(stub.clone(), Arc::new(SqliteKvStore::in_memory()));
    let queue = session.queue();

    queue.enqueue(bid(40.0)).await.unwrap();
    let rejected = queue.enqueue(bid(2.0)).await.unwrap();
    queue.enqueue(booking()).await.unwrap();
    queue
        .enqueue(MessageMutation {
            thread_id: "thread-2".to_string(),
            content: "See you at 2".to_string(),
            message_type: MessageType::Text,
        })
        .await
        .unwrap();

    let report = session
        .engine
        .perform_full_sync(FullSyncOptions {
            services: ServiceFilter::new().category("Cleaning"),
        })
        .await
        .unwrap();

    assert!(report.is_success());
    let upload = report.upload.as_ref().unwrap();
    assert_eq!(upload.processed_count(), 3);
    assert_eq!(upload.bids.failed[0].client_temp_id, rejected);
    assert_eq!(upload.bids.failed[0].reason, "invalid amount");

    let pending = queue.all_pending_any().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].client_temp_id, rejected);

    let profile = session.cache().get_profile().await.unwrap().unwrap();
    assert_eq!(profile.profile.display_name(), "amina");
    assert_eq!(profile.profile.extra.get("rating"), Some(&json!(4.8)));

    let signature = ServiceFilter::new().category("cleaning").limit(50).signature();
    let services = session
        .cache()
        .get_service_set(&signature)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(services.services.len(), 2);
    assert_eq!(services.total, 37);

    let request = &stub.requests()[1];
    assert_eq!(request.path, PROFILE_PATH);
    let status = session.engine.status().await.unwrap();
    assert_eq!(status.pending.total(), 1);
    assert!(status.last_attempt.unwrap().succeeded);
}

#[tokio::test]
async fn rejected_items_are_resubmitted_until_discarded() {
    let stub = online_server();
    let session = session(stub.clone(), Arc::new(SqliteKvStore::in_memory()));
    let rejected = session.queue().enqueue(bid(1.0)).await.unwrap();

    let first = session.engine.upload_pending(UploadScope::All).await.unwrap();
    let second = session.engine.upload_pending(UploadScope::All).await.unwrap();
    assert_eq!(first.failed_count(), 1);
    assert_eq!(second.failed_count(), 1);
    assert_eq!(stub.request_count(Method::Post, UPLOAD_PATH), 2);

    assert!(session.queue().discard(&rejected).await.unwrap());
    let third = session.engine.upload_pending(UploadScope::All).await.unwrap();

    assert_eq!(third.processed_count() + third.failed_count(), 0);
    assert_eq!(stub.request_count(Method::Post, UPLOAD_PATH), 2);
}

#[tokio::test]
async fn identical_bookings_stay_distinct() {
    let session = session(
        Arc::new(StubTransport::new()),
        Arc::new(SqliteKvStore::in_memory()),
    );

    let first = session.queue().enqueue(booking()).await.unwrap();
    let second = session.queue().enqueue(booking()).await.unwrap();

    assert_ne!(first, second);
    let pending = session.queue().all_pending(MutationKind::Booking).await.unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].mutation, pending[1].mutation);
}

#[tokio::test]
async fn queue_survives_restart() {
    let path = scratch_db();

    let before = {
        let session = session(
            Arc::new(StubTransport::new()),
            Arc::new(SqliteKvStore::open(path.clone())),
        );
        let id = session.queue().enqueue(bid(15.0)).await.unwrap();
        let pending = session.queue().all_pending(MutationKind::Bid).await.unwrap();
        (id, pending[0].sequence)
    };

    let session = session(online_server(), Arc::new(SqliteKvStore::open(path.clone())));
    let pending = session.queue().all_pending(MutationKind::Bid).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].client_temp_id, before.0);

    let after = session.queue().enqueue(bid(16.0)).await.unwrap();
    let pending = session.queue().all_pending(MutationKind::Bid).await.unwrap();
    assert_ne!(after, before.0);
    assert!(pending[1].sequence > before.1);

    let report = session.engine.upload_pending(UploadScope::All).await.unwrap();
    assert_eq!(report.processed_count(), 2);
    assert!(!session.queue().has_pending().await.unwrap());

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn stale_cache_stays_readable_while_offline() {
    let stub = Arc::new(StubTransport::new());
    stub.respond_once(
        Method::Get,
        SERVICES_PATH,
        TransportResponse::ok(json!([{"id": 1, "title": "Deep clean"}, {"id": 2, "title": "Tiling"}])),
    );
    stub.respond(
        Method::Get,
        SERVICES_PATH,
        TransportResponse::network_error("network unreachable"),
    );
    let config = SyncConfig {
        services_ttl: Some(chrono::Duration::zero()),
        ..SyncConfig::default()
    };
    let session = SyncSession::with_parts(stub, Arc::new(SqliteKvStore::in_memory()), config);

    let downloaded = session.engine.download_services_fast(Some(2)).await.unwrap();
    assert!(session.engine.download_services_fast(Some(2)).await.is_err());

    let cached = session
        .cache()
        .get_service_set(&downloaded.signature)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cached, downloaded);
    assert!(CacheLayer::is_expired(
        &cached.metadata,
        Utc::now() + chrono::Duration::seconds(1)
    ));
}
