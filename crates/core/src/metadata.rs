//! Freshness metadata attached to every cached snapshot.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// When a snapshot was downloaded and (optionally) when it stops being fresh.
///
/// Invariant: `expires_after`, when present, is never earlier than
/// `sync_timestamp`. The invariant is checked on construction and on
/// deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawSyncMetadata")]
pub struct SyncMetadata {
    sync_timestamp: DateTime<Utc>,
    expires_after: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSyncMetadata {
    sync_timestamp: DateTime<Utc>,
    #[serde(default)]
    expires_after: Option<DateTime<Utc>>,
}

impl TryFrom<RawSyncMetadata> for SyncMetadata {
    type Error = DomainError;

    fn try_from(raw: RawSyncMetadata) -> Result<Self, Self::Error> {
        Self::new(raw.sync_timestamp, raw.expires_after)
    }
}

impl SyncMetadata {
    pub fn new(
        sync_timestamp: DateTime<Utc>,
        expires_after: Option<DateTime<Utc>>,
    ) -> DomainResult<Self> {
        if let Some(expiry) = expires_after {
            if expiry < sync_timestamp {
                return Err(DomainError::invariant(format!(
                    "expiresAfter ({expiry}) precedes syncTimestamp ({sync_timestamp})"
                )));
            }
        }
        Ok(Self {
            sync_timestamp,
            expires_after,
        })
    }

    /// Metadata for a snapshot downloaded at `now`, fresh for `ttl` (forever if `None`).
    ///
    /// Negative TTLs are clamped to zero so the invariant always holds. A TTL
    /// reaching past the last representable instant means no expiry.
    pub fn fresh(now: DateTime<Utc>, ttl: Option<Duration>) -> Self {
        let expires_after =
            ttl.and_then(|ttl| now.checked_add_signed(ttl.max(Duration::zero())));
        Self {
            sync_timestamp: now,
            expires_after,
        }
    }

    pub fn sync_timestamp(&self) -> DateTime<Utc> {
        self.sync_timestamp
    }

    pub fn expires_after(&self) -> Option<DateTime<Utc>> {
        self.expires_after
    }

    /// `true` once `now` is strictly past the expiry. Snapshots without an
    /// expiry never expire on their own.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_after {
            Some(expiry) => now > expiry,
            None => false,
        }
    }
}
