use std::fmt;
use std::hash::{Hash, Hasher};

use serde::Deserialize;

use super::FilterSet;

/// `rel` of the link that carries the public listing URL.
pub const SELF_LINK_REL: &str = "self-public-website";

/// Key a listing is identified by. `None` (no self link) is a valid key of its own.
pub type IdentityKey = Option<String>;

/// A `{"value": ...}` wrapper as used throughout the listing API.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Valued<T> {
    #[serde(default = "Option::default")]
    pub value: Option<T>,
}

impl<T> Valued<T> {
    pub fn of(value: T) -> Self {
        Self { value: Some(value) }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawLink {
    #[serde(default)]
    pub rel: Option<String>,
    #[serde(default)]
    pub href: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawPrice {
    #[serde(default)]
    pub amount: Option<Valued<serde_json::Value>>,
    #[serde(default, rename = "currency-iso-code")]
    pub currency_iso_code: Option<Valued<Valued<String>>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawAddress {
    #[serde(default)]
    pub state: Option<Valued<String>>,
    #[serde(default, rename = "zip-code")]
    pub zip_code: Option<Valued<String>>,
}

/// One listing record exactly as the source returns it. Every field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawListing {
    #[serde(default, deserialize_with = "deserialize_lenient_id")]
    pub id: i64,
    #[serde(default)]
    pub title: Option<Valued<String>>,
    #[serde(default)]
    pub link: Vec<RawLink>,
    #[serde(default)]
    pub price: Option<RawPrice>,
    #[serde(default, rename = "ad-address")]
    pub ad_address: Option<RawAddress>,
}

impl RawListing {
    pub fn new(id: i64, title: &str) -> Self {
        Self {
            id,
            title: Some(Valued::of(title.to_string())),
            ..Default::default()
        }
    }

    pub fn with_self_link(mut self, href: &str) -> Self {
        self.link.push(RawLink {
            rel: Some(SELF_LINK_REL.to_string()),
            href: href.to_string(),
        });
        self
    }

    pub fn with_price(mut self, amount: serde_json::Value, currency: &str) -> Self {
        self.price = Some(RawPrice {
            amount: Some(Valued::of(amount)),
            currency_iso_code: Some(Valued::of(Valued::of(currency.to_string()))),
        });
        self
    }

    pub fn with_address(mut self, zip_code: &str, state: &str) -> Self {
        self.ad_address = Some(RawAddress {
            state: Some(Valued::of(state.to_string())),
            zip_code: Some(Valued::of(zip_code.to_string())),
        });
        self
    }
}

/// Ids arrive as numbers, numeric strings or not at all; anything unusable maps to 0.
fn deserialize_lenient_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_i64().unwrap_or(0),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

fn valued_string(valued: Option<Valued<String>>) -> String {
    valued.and_then(|v| v.value).unwrap_or_default()
}

fn render_amount(amount: serde_json::Value) -> String {
    match amount {
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s,
        _ => String::new(),
    }
}

/// A single listing, normalised from a [`RawListing`].
///
/// Equality and hashing look at the self link only; `id` is carried along as
/// metadata and never decides whether two listings are the same.
#[derive(Debug, Clone)]
pub struct ListingItem {
    pub id: i64,
    pub title: String,
    pub url: Option<String>,
    pub price: String,
    pub currency: String,
    pub location_state: String,
    pub location_zip: String,
}

impl ListingItem {
    pub fn from_raw(raw: RawListing) -> Self {
        let url = raw
            .link
            .into_iter()
            .find(|l| l.rel.as_deref() == Some(SELF_LINK_REL))
            .map(|l| l.href);

        let (price, currency) = match raw.price {
            Some(p) => (
                p.amount
                    .and_then(|a| a.value)
                    .map(render_amount)
                    .unwrap_or_default(),
                p.currency_iso_code
                    .and_then(|c| c.value)
                    .and_then(|c| c.value)
                    .unwrap_or_default(),
            ),
            None => (String::new(), String::new()),
        };

        let (location_state, location_zip) = match raw.ad_address {
            Some(a) => (valued_string(a.state), valued_string(a.zip_code)),
            None => (String::new(), String::new()),
        };

        Self {
            id: raw.id,
            title: valued_string(raw.title),
            url,
            price,
            currency,
            location_state,
            location_zip,
        }
    }

    pub fn identity_key(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn identity(&self) -> IdentityKey {
        self.url.clone()
    }

    pub fn location_label(&self) -> String {
        format!("{} {}", self.location_zip, self.location_state)
    }

    /// True when the listing has a URL and any pattern in `filters` matches it.
    pub fn matches_any_filter(&self, filters: &FilterSet) -> bool {
        filters.is_excluded(self)
    }
}

impl From<RawListing> for ListingItem {
    fn from(raw: RawListing) -> Self {
        ListingItem::from_raw(raw)
    }
}

impl PartialEq for ListingItem {
    fn eq(&self, other: &Self) -> bool {
        self.identity_key() == other.identity_key()
    }
}

impl Eq for ListingItem {}

impl Hash for ListingItem {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity_key().hash(state);
    }
}

impl fmt::Display for ListingItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.url.as_deref().unwrap_or("(no link)"))?;
        writeln!(f, "{}", self.title)?;
        if self.currency.is_empty() {
            write!(f, "{} - {}", self.price, self.location_label())
        } else {
            write!(f, "{} {} - {}", self.price, self.currency, self.location_label())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    const API_RECORD: &str = r#"{
        "id": "2712345678",
        "title": {"value": "Road bike 56cm"},
        "link": [
            {"rel": "self", "href": "https://api.example.com/ads/2712345678.json"},
            {"rel": "self-public-website", "href": "https://www.example.com/s-anzeige/road-bike/2712345678"}
        ],
        "price": {
            "amount": {"value": 350},
            "currency-iso-code": {"value": {"value": "EUR"}}
        },
        "ad-address": {
            "state": {"value": "Berlin"},
            "zip-code": {"value": "10115"}
        }
    }"#;

    #[test]
    fn test_from_api_record() {
        let raw: RawListing = serde_json::from_str(API_RECORD).unwrap();
        let item = ListingItem::from_raw(raw);

        assert_eq!(item.id, 2712345678);
        assert_eq!(item.title, "Road bike 56cm");
        assert_eq!(
            item.url.as_deref(),
            Some("https://www.example.com/s-anzeige/road-bike/2712345678")
        );
        assert_eq!(item.price, "350");
        assert_eq!(item.currency, "EUR");
        assert_eq!(item.location_label(), "10115 Berlin");
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let raw: RawListing = serde_json::from_str("{}").unwrap();
        let item = ListingItem::from_raw(raw);

        assert_eq!(item.id, 0);
        assert_eq!(item.title, "");
        assert!(item.url.is_none());
        assert_eq!(item.price, "");
        assert_eq!(item.currency, "");
        assert_eq!(item.location_label(), " ");
    }

    #[test]
    fn test_url_requires_self_public_website_rel() {
        let raw: RawListing = serde_json::from_value(json!({
            "link": [{"rel": "self", "href": "https://api.example.com/ads/1.json"}]
        }))
        .unwrap();

        assert!(ListingItem::from_raw(raw).url.is_none());
    }

    #[test]
    fn test_unparseable_id_maps_to_zero() {
        let raw: RawListing = serde_json::from_value(json!({"id": "abc"})).unwrap();
        assert_eq!(raw.id, 0);

        let raw: RawListing = serde_json::from_value(json!({"id": null})).unwrap();
        assert_eq!(raw.id, 0);
    }

    #[test]
    fn test_equality_uses_url_only() {
        let a = ListingItem::from_raw(RawListing::new(1, "Sofa").with_self_link("https://x/item/1"));
        let b = ListingItem::from_raw(
            RawListing::new(99, "Different title")
                .with_self_link("https://x/item/1")
                .with_price(json!(5), "EUR"),
        );
        let c = ListingItem::from_raw(RawListing::new(1, "Sofa").with_self_link("https://x/item/2"));

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_items_without_url_are_equal() {
        let a = ListingItem::from_raw(RawListing::new(1, "One"));
        let b = ListingItem::from_raw(RawListing::new(2, "Two"));

        assert_eq!(a, b);

        let set: HashSet<ListingItem> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_hash_consistent_with_equality() {
        let set: HashSet<ListingItem> = [
            ListingItem::from_raw(RawListing::new(1, "A").with_self_link("https://x/a")),
            ListingItem::from_raw(RawListing::new(1, "A again").with_self_link("https://x/a")),
            ListingItem::from_raw(RawListing::new(1, "B").with_self_link("https://x/b")),
        ]
        .into_iter()
        .collect();

        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_display_format() {
        let item = ListingItem::from_raw(
            RawListing::new(1, "Lamp")
                .with_self_link("https://x/item/1")
                .with_price(json!(12), "EUR")
                .with_address("80331", "Bayern"),
        );

        assert_eq!(
            item.to_string(),
            "https://x/item/1\nLamp\n12 EUR - 80331 Bayern"
        );
    }

    #[test]
    fn test_display_without_url_or_currency() {
        let item = ListingItem::from_raw(RawListing::new(1, "Lamp"));
        assert_eq!(item.to_string(), "(no link)\nLamp\n -  ");
    }

    #[test]
    fn test_string_price_kept_verbatim() {
        let item = ListingItem::from_raw(
            RawListing::new(1, "Chair").with_price(json!("VB"), ""),
        );
        assert_eq!(item.price, "VB");
    }
}
