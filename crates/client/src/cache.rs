//! Local cache of server snapshots for offline reads.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use marketsync_core::{FilterSignature, ServiceFilter, ServiceRecord, SyncMetadata, UserProfile};
use marketsync_infra::{KvStore, StoreError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const PROFILE_PARTITION: &str = "cache.profile";
const SERVICES_PARTITION: &str = "cache.services";
const PROFILE_KEY: &str = "current";

/// Cached copy of the user's profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedProfile {
    pub profile: UserProfile,
    pub metadata: SyncMetadata,
}

/// Cached result of one service query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedServiceSet {
    /// Filter the set was downloaded with (used to refresh it).
    pub filter: ServiceFilter,
    pub signature: FilterSignature,
    pub services: Vec<ServiceRecord>,
    /// Total matches reported by the server (may exceed `services.len()`).
    pub total: usize,
    pub metadata: SyncMetadata,
}

/// Snapshot cache on top of the key-value store.
///
/// Every save replaces the previous snapshot wholesale; reads never mutate.
/// Staleness is reported through [`CacheLayer::is_expired`], never corrected
/// here.
#[derive(Clone)]
pub struct CacheLayer {
    store: Arc<dyn KvStore>,
}

impl CacheLayer {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Replace the cached profile.
    pub async fn save_profile(
        &self,
        profile: UserProfile,
        metadata: SyncMetadata,
    ) -> Result<CachedProfile, StoreError> {
        let cached = CachedProfile { profile, metadata };
        self.store
            .put(PROFILE_PARTITION, PROFILE_KEY, encode(&cached)?)
            .await?;
        tracing::debug!(synced_at = %metadata.sync_timestamp(), "cached profile replaced");
        Ok(cached)
    }

    pub async fn get_profile(&self) -> Result<Option<CachedProfile>, StoreError> {
        let value = self.store.get(PROFILE_PARTITION, PROFILE_KEY).await?;
        value.map(decode).transpose()
    }

    /// Replace the cached set for the filter's signature.
    pub async fn save_service_set(
        &self,
        filter: ServiceFilter,
        services: Vec<ServiceRecord>,
        total: usize,
        metadata: SyncMetadata,
    ) -> Result<CachedServiceSet, StoreError> {
        let filter = filter.normalized();
        let signature = filter.signature();
        let cached = CachedServiceSet {
            filter,
            signature: signature.clone(),
            services,
            total,
            metadata,
        };
        self.store
            .put(SERVICES_PARTITION, signature.as_str(), encode(&cached)?)
            .await?;
        tracing::debug!(
            signature = %signature,
            count = cached.services.len(),
            "cached service set replaced"
        );
        Ok(cached)
    }

    pub async fn get_service_set(
        &self,
        signature: &FilterSignature,
    ) -> Result<Option<CachedServiceSet>, StoreError> {
        let value = self.store.get(SERVICES_PARTITION, signature.as_str()).await?;
        value.map(decode).transpose()
    }

    /// Every cached service set, ordered by signature.
    pub async fn all_service_sets(&self) -> Result<Vec<CachedServiceSet>, StoreError> {
        let entries = self.store.all_entries(SERVICES_PARTITION).await?;
        entries.into_values().map(decode).collect()
    }

    /// `true` when the snapshot has an expiry and `now` is past it.
    pub fn is_expired(metadata: &SyncMetadata, now: DateTime<Utc>) -> bool {
        metadata.is_expired_at(now)
    }

    /// Erase every cached snapshot (logout, "clear cache").
    pub async fn clear(&self) -> Result<(), StoreError> {
        self.store.clear(PROFILE_PARTITION).await?;
        self.store.clear(SERVICES_PARTITION).await?;
        tracing::info!("cache cleared");
        Ok(())
    }
}

fn encode<T: Serialize>(value: &T) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, StoreError> {
    serde_json::from_value(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use marketsync_core::ServerId;
    use marketsync_infra::InMemoryKvStore;

    fn cache() -> CacheLayer {
        CacheLayer::new(Arc::new(InMemoryKvStore::new()))
    }

    fn profile(username: &str) -> UserProfile {
        serde_json::from_value(serde_json::json!({
            "id": 1,
            "username": username,
            "email": format!("{username}@example.test"),
        }))
        .unwrap()
    }

    fn service(id: i64, category: &str) -> ServiceRecord {
        ServiceRecord {
            id: ServerId::new(id.to_string()),
            title: format!("{category} #{id}"),
            description: None,
            category: Some(category.to_string()),
            price: Some(40.0),
            location: None,
            provider_id: None,
            extra: Default::default(),
        }
    }

    #[tokio::test]
    async fn profile_is_replaced_wholesale() {
        let cache = cache();
        let meta = SyncMetadata::fresh(Utc::now(), None);

        cache.save_profile(profile("amina"), meta).await.unwrap();
        cache.save_profile(profile("bilal"), meta).await.unwrap();

        let cached = cache.get_profile().await.unwrap().unwrap();
        assert_eq!(cached.profile.username, "bilal");
        assert_eq!(cached.metadata, meta);
    }

    #[tokio::test]
    async fn service_sets_are_keyed_by_signature() {
        let cache = cache();
        let meta = SyncMetadata::fresh(Utc::now(), Some(Duration::hours(1)));
        let cleaning = ServiceFilter::new().category("cleaning").limit(20);
        let plumbing = ServiceFilter::new().category("plumbing").limit(20);

        cache
            .save_service_set(cleaning.clone(), vec![service(1, "cleaning")], 1, meta)
            .await
            .unwrap();
        cache
            .save_service_set(plumbing.clone(), vec![service(2, "plumbing")], 1, meta)
            .await
            .unwrap();

        let set = cache.get_service_set(&cleaning.signature()).await.unwrap().unwrap();
        assert_eq!(set.services[0].category.as_deref(), Some("cleaning"));
        assert_eq!(cache.all_service_sets().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let cache = cache();
        let meta = SyncMetadata::fresh(Utc::now(), None);
        cache.save_profile(profile("amina"), meta).await.unwrap();
        cache
            .save_service_set(ServiceFilter::new(), vec![service(1, "cleaning")], 1, meta)
            .await
            .unwrap();

        cache.clear().await.unwrap();

        assert!(cache.get_profile().await.unwrap().is_none());
        assert!(cache.all_service_sets().await.unwrap().is_empty());
    }

    #[test]
    fn expiry_boundary() {
        let now = Utc::now();
        let meta = SyncMetadata::fresh(now, Some(Duration::minutes(10)));
        let expiry = meta.expires_after().unwrap();

        assert!(!CacheLayer::is_expired(&meta, expiry - Duration::seconds(1)));
        assert!(CacheLayer::is_expired(&meta, expiry + Duration::seconds(1)));
        assert!(!CacheLayer::is_expired(
            &SyncMetadata::fresh(now, None),
            now + Duration::days(3650)
        ));
    }
}
