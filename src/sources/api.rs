use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Client;
use serde_json::Value;

use crate::config::Config;
use crate::domain::RawListing;
use crate::errors::{WatchError, WatchResult};
use crate::sources::traits::ListingSource;

/// Listing API client. Search URLs are requested as-is with basic auth and
/// the `ad` array is pulled out of whatever envelope the API wraps it in.
pub struct ApiSource {
    client: Client,
    user: String,
    password: String,
}

impl ApiSource {
    pub fn new(user: &str, password: &str, timeout: Duration) -> WatchResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            user: user.to_string(),
            password: password.to_string(),
        })
    }

    pub fn from_config(config: &Config) -> WatchResult<Self> {
        Self::new(&config.api_user, &config.api_password, config.fetch_timeout)
    }

    /// Extract listing records from a decoded response body
    pub fn parse_listings(body: &Value) -> Vec<RawListing> {
        let ads = match body {
            Value::Array(items) => Some(items),
            other => find_ad_array(other),
        };

        let Some(ads) = ads else {
            return Vec::new();
        };

        ads.iter()
            .filter_map(|ad| match serde_json::from_value::<RawListing>(ad.clone()) {
                Ok(raw) => Some(raw),
                Err(e) => {
                    tracing::warn!("Skipping malformed listing record: {}", e);
                    None
                }
            })
            .collect()
    }
}

fn find_ad_array(value: &Value) -> Option<&Vec<Value>> {
    match value {
        Value::Object(map) => {
            if let Some(Value::Array(items)) = map.get("ad") {
                return Some(items);
            }
            map.values().find_map(find_ad_array)
        }
        _ => None,
    }
}

#[async_trait]
impl ListingSource for ApiSource {
    async fn fetch(&self, url: &str) -> WatchResult<Vec<RawListing>> {
        let response = self
            .client
            .get(url)
            .basic_auth(&self.user, Some(&self.password))
            .send()
            .await?
            .error_for_status()?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| WatchError::fetch_failure(url, format!("invalid response body: {}", e)))?;

        Ok(Self::parse_listings(&body))
    }
}
