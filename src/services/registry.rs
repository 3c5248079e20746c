use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::Mutex;

use crate::services::subscriber::{SharedSubscriber, Subscriber, SubscriberId};

/// Process-wide map from consumer identity to its subscriber.
///
/// Starts empty; entries are only added by `register` and only removed by
/// an explicit `remove`.
#[derive(Default)]
pub struct SubscriberRegistry {
    subscribers: RwLock<HashMap<SubscriberId, SharedSubscriber>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the subscriber for `id`, creating it on first contact
    pub fn register(&self, id: SubscriberId) -> SharedSubscriber {
        if let Some(existing) = self.get(id) {
            return existing;
        }

        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        subscribers
            .entry(id)
            .or_insert_with(|| {
                tracing::info!(subscriber = id, "Registered subscriber");
                Arc::new(Mutex::new(Subscriber::new(id)))
            })
            .clone()
    }

    pub fn get(&self, id: SubscriberId) -> Option<SharedSubscriber> {
        self.subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&id)
            .cloned()
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.get(id).is_some()
    }

    pub fn remove(&self, id: SubscriberId) -> Option<SharedSubscriber> {
        self.subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&id)
    }

    pub fn ids(&self) -> Vec<SubscriberId> {
        let mut ids: Vec<SubscriberId> = self
            .subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .copied()
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
