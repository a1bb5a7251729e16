//! Snapshot of the authenticated user's profile.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::id::ServerId;

/// Denormalized copy of the user's profile as served by `/sync/profile`.
///
/// Fields the client does not model are preserved in `extra` so a cached
/// profile round-trips without loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: ServerId,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub is_provider: bool,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserProfile {
    /// Display name, falling back to the username.
    pub fn display_name(&self) -> String {
        let first = self.first_name.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let last = self.last_name.as_deref().map(str::trim).filter(|s| !s.is_empty());
        match (first, last) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (Some(first), None) => first.to_string(),
            _ => self.username.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn profile(first: Option<&str>, last: Option<&str>) -> UserProfile {
        serde_json::from_value(json!({
            "id": 3,
            "username": "amina_k",
            "first_name": first,
            "last_name": last,
        }))
        .unwrap()
    }

    #[test]
    fn display_name_skips_blank_parts() {
        assert_eq!(profile(Some("Amina"), Some("Khan")).display_name(), "Amina Khan");
        assert_eq!(profile(Some("Amina"), Some("")).display_name(), "Amina");
        assert_eq!(profile(Some("Amina"), None).display_name(), "Amina");
        assert_eq!(profile(Some(" "), Some("Khan")).display_name(), "amina_k");
        assert_eq!(profile(None, None).display_name(), "amina_k");
    }

    #[test]
    fn unknown_fields_are_preserved() {
        let value = json!({"id": "u-1", "username": "bilal", "rating": 4.5});
        let profile: UserProfile = serde_json::from_value(value).unwrap();
        assert_eq!(profile.extra.get("rating"), Some(&json!(4.5)));
        assert_eq!(serde_json::to_value(&profile).unwrap()["rating"], json!(4.5));
    }
}
