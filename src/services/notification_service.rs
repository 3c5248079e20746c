use std::collections::HashMap;
use std::sync::Mutex;

use channels::{ChannelClient, ChannelError};

use crate::config::NotebrookConfig;
use crate::domain::Notification;
use crate::errors::{WatchError, WatchResult};
use crate::services::subscriber::SubscriberId;

/// Delivers listing notifications to one Notebrook channel per subscriber.
pub struct NotificationService {
    client: ChannelClient,
    prefix: String,
    channel_ids: Mutex<HashMap<String, i64>>,
}

impl NotificationService {
    pub fn new(config: &NotebrookConfig) -> WatchResult<Self> {
        let client = ChannelClient::new(&config.url, &config.token)?;

        Ok(Self {
            client,
            prefix: config.channel_prefix.clone(),
            channel_ids: Mutex::new(HashMap::new()),
        })
    }

    pub fn channel_name(&self, id: SubscriberId) -> String {
        channel_name(&self.prefix, id)
    }

    /// Look the channel up once, creating it if missing, then reuse its id
    async fn channel_id(&self, id: SubscriberId) -> WatchResult<i64> {
        let name = self.channel_name(id);

        if let Some(cached) = self.cached_id(&name) {
            return Ok(cached);
        }

        let channel_id = match self.client.find_channel_id_by_name(&name).await? {
            Some(existing) => existing,
            None => {
                tracing::info!(channel = %name, "Creating notification channel");
                self.client.create_channel(&name).await?.id
            }
        };

        self.channel_ids
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(name, channel_id);
        Ok(channel_id)
    }

    fn cached_id(&self, name: &str) -> Option<i64> {
        self.channel_ids
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .copied()
    }

    /// Send a notification, shortening the title if the server rejects the size
    pub async fn send(&self, id: SubscriberId, notification: &Notification) -> WatchResult<()> {
        let channel_id = self.channel_id(id).await?;

        // Try with full message first
        match self
            .client
            .send_to_channel_id(channel_id, &notification.format())
            .await
        {
            Ok(_) => return Ok(()),
            Err(ChannelError::PayloadTooLarge) => {}
            Err(e) => return Err(e.into()),
        }

        let mut truncated = notification.clone();
        let mut high = notification.title.chars().count();

        while high > 0 {
            let mid = high / 2;
            truncated.title = truncate_to_char_boundary(&notification.title, mid);

            match self
                .client
                .send_to_channel_id(channel_id, &truncated.format())
                .await
            {
                Ok(_) => return Ok(()),
                Err(ChannelError::PayloadTooLarge) => high = mid,
                Err(e) => return Err(e.into()),
            }
        }

        Err(WatchError::Channel(format!(
            "notification for {} is too large even without a title",
            notification.url.as_deref().unwrap_or("listing")
        )))
    }

    /// Send every notification; returns the failures instead of stopping at the first
    pub async fn send_all(&self, id: SubscriberId, notifications: &[Notification]) -> Vec<WatchError> {
        let mut errors = Vec::new();

        for notification in notifications {
            if let Err(e) = self.send(id, notification).await {
                errors.push(e);
            }
        }

        errors
    }
}

fn channel_name(prefix: &str, id: SubscriberId) -> String {
    format!("{}-{}", prefix, id)
}

/// Truncate string to at most `max_chars` characters, respecting char boundaries
fn truncate_to_char_boundary(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> NotebrookConfig {
        NotebrookConfig {
            url: "http://localhost:3000".to_string(),
            token: "token".to_string(),
            channel_prefix: "listings".to_string(),
        }
    }

    #[test]
    fn test_channel_name_per_subscriber() {
        let service = NotificationService::new(&config()).unwrap();

        assert_eq!(service.channel_name(42), "listings-42");
        assert_eq!(service.channel_name(-7), "listings--7");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_to_char_boundary("Fahrrad für Kinder", 9), "Fahrrad f");
        assert_eq!(truncate_to_char_boundary("Öl", 1), "Ö");
        assert_eq!(truncate_to_char_boundary("abc", 10), "abc");
    }

    #[test]
    fn test_invalid_token_is_a_channel_error() {
        let mut bad = config();
        bad.token = "line\nbreak".to_string();

        let result = NotificationService::new(&bad);
        assert!(matches!(result, Err(WatchError::Channel(_))));
    }
}
