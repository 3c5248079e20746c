//! Async Notebrook channel bindings
//! Provides listing, creation and message posting for channels addressed by name

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Invalid header value")]
    InvalidHeader,
    #[error("Payload too large")]
    PayloadTooLarge,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    #[serde(deserialize_with = "deserialize_string_or_i64")]
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct ChannelsResponse {
    channels: Vec<Channel>,
}

fn deserialize_string_or_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{self, Visitor};
    use std::fmt;

    struct StringOrI64Visitor;

    impl<'de> Visitor<'de> for StringOrI64Visitor {
        type Value = i64;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or i64")
        }

        fn visit_i64<E>(self, v: i64) -> Result<i64, E> {
            Ok(v)
        }

        fn visit_u64<E>(self, v: u64) -> Result<i64, E> {
            Ok(v as i64)
        }

        fn visit_str<E>(self, v: &str) -> Result<i64, E>
        where
            E: de::Error,
        {
            v.parse().map_err(de::Error::custom)
        }
    }

    deserializer.deserialize_any(StringOrI64Visitor)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(deserialize_with = "deserialize_string_or_i64")]
    pub id: i64,
    pub content: String,
}

#[derive(Debug, Serialize)]
struct SendMessagePayload<'a> {
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateChannelPayload<'a> {
    name: &'a str,
}

pub struct ChannelClient {
    url: String,
    client: Client,
}

impl ChannelClient {
    pub fn new(url: &str, token: &str) -> Result<Self, ChannelError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("authorization"),
            HeaderValue::from_str(token).map_err(|_| ChannelError::InvalidHeader)?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder().default_headers(headers).build()?;

        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// List all available channels
    pub async fn list_channels(&self) -> Result<Vec<Channel>, ChannelError> {
        let response = self
            .client
            .get(format!("{}/channels", self.url))
            .send()
            .await?
            .error_for_status()?;

        let wrapper: ChannelsResponse = response.json().await?;
        Ok(wrapper.channels)
    }

    /// Find a channel ID by its name
    pub async fn find_channel_id_by_name(&self, name: &str) -> Result<Option<i64>, ChannelError> {
        let channels = self.list_channels().await?;
        Ok(channels.into_iter().find(|c| c.name == name).map(|c| c.id))
    }

    pub async fn create_channel(&self, name: &str) -> Result<Channel, ChannelError> {
        let response = self
            .client
            .post(format!("{}/channels/", self.url))
            .json(&CreateChannelPayload { name })
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }

    /// Send a message to a channel whose id is already known
    pub async fn send_to_channel_id(
        &self,
        channel_id: i64,
        content: &str,
    ) -> Result<Message, ChannelError> {
        let response = self
            .client
            .post(format!("{}/channels/{}/messages", self.url, channel_id))
            .json(&SendMessagePayload { content })
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::PAYLOAD_TOO_LARGE {
            return Err(ChannelError::PayloadTooLarge);
        }

        let response = response.error_for_status()?;
        Ok(response.json().await?)
    }
}
