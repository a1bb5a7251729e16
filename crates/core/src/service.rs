//! Service listings and the filters used to download them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::id::ServerId;

/// One service listing as served by `/sync/services`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub id: ServerId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    /// Accepts numbers and decimal strings (`"45.00"`).
    #[serde(default, deserialize_with = "price_from_number_or_text")]
    pub price: Option<f64>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub provider_id: Option<ServerId>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn price_from_number_or_text<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Price {
        Number(f64),
        Text(String),
    }

    match Option::<Price>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Price::Number(n)) => Ok(Some(n)),
        Some(Price::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid price '{text}'"))),
    }
}

/// Query parameters for a service download.
///
/// Two filters that normalize to the same values share one cached set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceFilter {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub max_price: Option<f64>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub ordering: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
}

impl ServiceFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn max_price(mut self, max_price: f64) -> Self {
        self.max_price = Some(max_price);
        self
    }

    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn ordering(mut self, ordering: impl Into<String>) -> Self {
        self.ordering = Some(ordering.into());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Canonical form: trimmed strings, lower-cased category/location/ordering,
    /// blanks dropped, non-finite or non-positive prices and zero limits dropped.
    pub fn normalized(&self) -> Self {
        fn text(value: &Option<String>, lowercase: bool) -> Option<String> {
            let trimmed = value.as_deref()?.trim();
            if trimmed.is_empty() {
                return None;
            }
            Some(if lowercase {
                trimmed.to_lowercase()
            } else {
                trimmed.to_string()
            })
        }

        Self {
            category: text(&self.category, true),
            location: text(&self.location, true),
            max_price: self.max_price.filter(|p| p.is_finite() && *p > 0.0),
            search: text(&self.search, false),
            ordering: text(&self.ordering, true),
            limit: self.limit.filter(|l| *l > 0),
        }
    }

    /// Query parameters of the normalized filter, in a fixed order.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let n = self.normalized();
        let mut pairs = Vec::new();
        if let Some(category) = n.category {
            pairs.push(("category".to_string(), category));
        }
        if let Some(location) = n.location {
            pairs.push(("location".to_string(), location));
        }
        if let Some(max_price) = n.max_price {
            pairs.push(("max_price".to_string(), max_price.to_string()));
        }
        if let Some(search) = n.search {
            pairs.push(("search".to_string(), search));
        }
        if let Some(ordering) = n.ordering {
            pairs.push(("ordering".to_string(), ordering));
        }
        if let Some(limit) = n.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        pairs
    }

    pub fn signature(&self) -> FilterSignature {
        let encoded: Vec<String> = self
            .query_pairs()
            .into_iter()
            .map(|(k, v)| format!("{k}={}", escape(&v)))
            .collect();
        if encoded.is_empty() {
            FilterSignature("all".to_string())
        } else {
            FilterSignature(encoded.join("&"))
        }
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '%' => out.push_str("%25"),
            '&' => out.push_str("%26"),
            '=' => out.push_str("%3D"),
            _ => out.push(c),
        }
    }
    out
}

/// Normalized key of a cached service set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterSignature(String);

impl FilterSignature {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for FilterSignature {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_accepts_decimal_strings() {
        let records: Vec<ServiceRecord> = serde_json::from_value(serde_json::json!([
            {"id": 1, "title": "Deep clean", "price": "45.50"},
            {"id": 2, "title": "Tiling", "price": 30},
            {"id": 3, "title": "Quote on request", "price": null},
            {"id": 4, "title": "Unpriced"},
        ]))
        .unwrap();

        let prices: Vec<_> = records.iter().map(|r| r.price).collect();
        assert_eq!(prices, vec![Some(45.5), Some(30.0), None, None]);
        assert!(
            serde_json::from_value::<ServiceRecord>(
                serde_json::json!({"id": 5, "title": "x", "price": "free"})
            )
            .is_err()
        );
    }

    #[test]
    fn equivalent_filters_share_a_signature() {
        let a = ServiceFilter::new().category(" Cleaning ").limit(20);
        let b = ServiceFilter::new().category("cleaning").limit(20).search("  ");
        assert_eq!(a.signature(), b.signature());
        assert_eq!(a.signature().as_str(), "category=cleaning&limit=20");
    }

    #[test]
    fn different_categories_have_different_signatures() {
        let cleaning = ServiceFilter::new().category("cleaning").limit(20);
        let plumbing = ServiceFilter::new().category("plumbing").limit(20);
        assert_ne!(cleaning.signature(), plumbing.signature());
    }

    #[test]
    fn empty_filter_has_stable_signature() {
        assert_eq!(ServiceFilter::new().signature().as_str(), "all");
        assert_eq!(ServiceFilter::new().limit(0).signature().as_str(), "all");
    }

    #[test]
    fn separators_in_values_cannot_collide() {
        let tricky = ServiceFilter::new().search("a&limit=5");
        let plain = ServiceFilter::new().search("a").limit(5);
        assert_ne!(tricky.signature(), plain.signature());
    }

    #[test]
    fn service_record_keeps_unknown_fields() {
        let json = serde_json::json!({
            "id": 7,
            "title": "Deep clean",
            "category": "cleaning",
            "price": 80.0,
            "rating": 4.8
        });
        let record: ServiceRecord = serde_json::from_value(json).unwrap();
        assert_eq!(record.id.as_str(), "7");
        assert_eq!(record.extra.get("rating"), Some(&serde_json::json!(4.8)));
    }
}
