//! Identifiers used by the offline queue and the upload protocol.

use core::str::FromStr;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::DomainError;
use crate::mutation::MutationKind;

/// Locally generated identifier of a not-yet-confirmed offline mutation.
///
/// Format: `<kind>_<uuid-v7>` (e.g. `bid_01912c…`). The kind prefix makes ids
/// readable in logs; the UUIDv7 suffix makes them unique on the device for the
/// lifetime of the queue. A temp id is sent to the server only as a
/// correlation field, never as a real identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientTempId(String);

impl ClientTempId {
    /// Allocate a fresh id for a mutation of the given kind.
    pub fn generate(kind: MutationKind) -> Self {
        Self(format!("{}_{}", kind.prefix(), Uuid::now_v7().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Mutation kind encoded in the prefix, if recognizable.
    pub fn kind(&self) -> Option<MutationKind> {
        let (prefix, _) = self.0.split_once('_')?;
        MutationKind::from_prefix(prefix)
    }
}

impl core::fmt::Display for ClientTempId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ClientTempId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, suffix) = s
            .split_once('_')
            .ok_or_else(|| DomainError::invalid_id(format!("ClientTempId: missing kind prefix in '{s}'")))?;
        if MutationKind::from_prefix(prefix).is_none() {
            return Err(DomainError::invalid_id(format!(
                "ClientTempId: unknown kind prefix '{prefix}'"
            )));
        }
        Uuid::try_parse(suffix)
            .map_err(|e| DomainError::invalid_id(format!("ClientTempId: {e}")))?;
        Ok(Self(s.to_string()))
    }
}

/// Server-assigned identifier returned for a processed mutation.
///
/// The backend emits numeric primary keys for some resources and strings for
/// others; both are normalized to their string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ServerId(String);

impl ServerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ServerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ServerId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Int(n) => ServerId(n.to_string()),
            Raw::Text(s) => ServerId(s),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_carry_their_kind() {
        let id = ClientTempId::generate(MutationKind::Booking);
        assert!(id.as_str().starts_with("booking_"));
        assert_eq!(id.kind(), Some(MutationKind::Booking));
    }

    #[test]
    fn generated_ids_parse_back() {
        let id = ClientTempId::generate(MutationKind::Message);
        let parsed: ClientTempId = id.as_str().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn unknown_prefix_is_rejected() {
        let err = "offer_0190d5b4e8d27c0a9b1f3e2d4c5b6a79"
            .parse::<ClientTempId>()
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidId(_)));
    }

    #[test]
    fn server_id_accepts_numbers_and_strings() {
        let n: ServerId = serde_json::from_str("42").unwrap();
        let s: ServerId = serde_json::from_str("\"bk-9\"").unwrap();
        assert_eq!(n.as_str(), "42");
        assert_eq!(s.as_str(), "bk-9");
    }
}
