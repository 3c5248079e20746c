use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};

use crate::config::Config;
use crate::domain::ListingItem;
use crate::errors::{WatchError, WatchResult};
use crate::services::registry::SubscriberRegistry;
use crate::services::scheduler::{ErrorCallback, ItemsCallback, JobState, Scheduler};
use crate::services::subscriber::{SharedSubscriber, SubscriberId, TrackerSummary};
use crate::sources::ListingSource;

/// What a polling cycle reports, when callbacks are routed into a channel.
#[derive(Debug)]
pub enum CycleEvent {
    NewItems(SubscriberId, Vec<ListingItem>),
    Failed(SubscriberId, WatchError),
}

#[derive(Clone)]
pub struct CycleCallbacks {
    pub on_items: ItemsCallback,
    pub on_error: ErrorCallback,
}

impl CycleCallbacks {
    pub fn new(on_items: ItemsCallback, on_error: ErrorCallback) -> Self {
        Self { on_items, on_error }
    }

    /// Callbacks that forward every cycle result to the returned receiver
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<CycleEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let items_tx = tx.clone();

        let callbacks = Self::new(
            Arc::new(move |id: SubscriberId, items: Vec<ListingItem>| {
                // receiver gone means we're shutting down
                let _ = items_tx.send(CycleEvent::NewItems(id, items));
            }),
            Arc::new(move |id: SubscriberId, error: WatchError| {
                let _ = tx.send(CycleEvent::Failed(id, error));
            }),
        );

        (callbacks, rx)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WatchSettings {
    pub poll_interval: Duration,
    pub fetch_timeout: Duration,
}

impl From<&Config> for WatchSettings {
    fn from(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval,
            fetch_timeout: config.fetch_timeout,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerRemoval {
    /// The fetch job was stopped because no trackers were left
    pub stopped_job: bool,
    pub remaining: usize,
}

#[derive(Debug, Clone)]
pub struct SubscriberStatus {
    pub state: JobState,
    pub trackers: Vec<TrackerSummary>,
    pub filters: Vec<String>,
}

type ManagementLock = Arc<Mutex<()>>;

/// Management surface over the registry and the scheduler.
///
/// Operations that span both (removing the last tracker, clearing a
/// subscriber) are coordinated here so a running job is never left polling
/// a subscriber that has nothing to poll. Tracker and job changes for one
/// subscriber run one at a time under that subscriber's management lock;
/// polling ticks never take it.
pub struct WatchService {
    registry: Arc<SubscriberRegistry>,
    scheduler: Scheduler,
    source: Arc<dyn ListingSource>,
    settings: WatchSettings,
    callbacks: CycleCallbacks,
    management: std::sync::Mutex<HashMap<SubscriberId, ManagementLock>>,
}

impl WatchService {
    pub fn new(
        source: Arc<dyn ListingSource>,
        settings: WatchSettings,
        callbacks: CycleCallbacks,
    ) -> Self {
        let registry = Arc::new(SubscriberRegistry::new());
        let scheduler = Scheduler::new(registry.clone(), source.clone(), settings.fetch_timeout);

        Self {
            registry,
            scheduler,
            source,
            settings,
            callbacks,
            management: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Register `id`, or return the existing subscriber
    pub fn register(&self, id: SubscriberId) -> SharedSubscriber {
        self.registry.register(id)
    }

    pub fn is_registered(&self, id: SubscriberId) -> bool {
        self.registry.contains(id)
    }

    fn subscriber(&self, id: SubscriberId) -> WatchResult<SharedSubscriber> {
        self.registry
            .get(id)
            .ok_or_else(|| WatchError::NotFound(format!("subscriber {}", id)))
    }

    async fn manage(&self, id: SubscriberId) -> OwnedMutexGuard<()> {
        let lock = self
            .management
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(id)
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    pub async fn add_tracker(
        &self,
        id: SubscriberId,
        name: &str,
        source_url: &str,
    ) -> WatchResult<usize> {
        let _guard = self.manage(id).await;
        let subscriber = self.subscriber(id)?;
        let mut subscriber = subscriber.lock().await;
        subscriber
            .add_tracker(
                name,
                source_url,
                self.source.as_ref(),
                self.settings.fetch_timeout,
            )
            .await
    }

    /// Remove a tracker by name; stops the job if that was the last one.
    /// A tick in flight finishes before the tracker goes.
    pub async fn remove_tracker(&self, id: SubscriberId, name: &str) -> WatchResult<TrackerRemoval> {
        let _guard = self.manage(id).await;
        let remaining = {
            let subscriber = self.subscriber(id)?;
            let mut subscriber = subscriber.lock().await;
            if !subscriber.remove_tracker(name) {
                return Err(WatchError::NotFound(format!("tracker '{}'", name)));
            }
            subscriber.trackers().len()
        };

        let mut stopped_job = false;
        if remaining == 0 {
            match self.scheduler.stop(id).await {
                Ok(()) => stopped_job = true,
                Err(WatchError::NotRunning(_)) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(TrackerRemoval {
            stopped_job,
            remaining,
        })
    }

    /// Stop the job if it runs, then drop every tracker.
    /// Returns what was removed.
    pub async fn clear_all(&self, id: SubscriberId) -> WatchResult<Vec<TrackerSummary>> {
        let _guard = self.manage(id).await;
        let subscriber = self.subscriber(id)?;

        match self.scheduler.stop(id).await {
            Ok(()) | Err(WatchError::NotRunning(_)) => {}
            Err(e) => return Err(e),
        }

        let mut subscriber = subscriber.lock().await;
        let removed = subscriber.summaries();
        subscriber.clear_trackers();
        Ok(removed)
    }

    /// Stop the job and forget the subscriber entirely
    pub async fn unregister(&self, id: SubscriberId) -> WatchResult<()> {
        let _guard = self.manage(id).await;
        self.subscriber(id)?;

        match self.scheduler.stop(id).await {
            Ok(()) | Err(WatchError::NotRunning(_)) => {}
            Err(e) => return Err(e),
        }

        self.registry.remove(id);
        Ok(())
    }

    /// Add every pattern or none of them. Returns the full filter list.
    pub async fn add_filters(&self, id: SubscriberId, patterns: &[String]) -> WatchResult<Vec<String>> {
        let subscriber = self.subscriber(id)?;
        let mut subscriber = subscriber.lock().await;

        let mut updated = subscriber.filters().clone();
        for pattern in patterns {
            updated.add(pattern)?;
        }
        *subscriber.filters_mut() = updated;

        Ok(subscriber.filters().list())
    }

    pub async fn clear_filters(&self, id: SubscriberId) -> WatchResult<()> {
        let subscriber = self.subscriber(id)?;
        subscriber.lock().await.filters_mut().clear();
        Ok(())
    }

    pub async fn filters(&self, id: SubscriberId) -> WatchResult<Vec<String>> {
        let subscriber = self.subscriber(id)?;
        let filters = subscriber.lock().await.filters().list();
        Ok(filters)
    }

    pub async fn trackers(&self, id: SubscriberId) -> WatchResult<Vec<TrackerSummary>> {
        let subscriber = self.subscriber(id)?;
        let summaries = subscriber.lock().await.summaries();
        Ok(summaries)
    }

    pub async fn start(&self, id: SubscriberId) -> WatchResult<()> {
        let _guard = self.manage(id).await;
        self.subscriber(id)?;
        self.scheduler
            .start(
                id,
                self.settings.poll_interval,
                self.callbacks.on_items.clone(),
                self.callbacks.on_error.clone(),
            )
            .await
    }

    pub async fn stop(&self, id: SubscriberId) -> WatchResult<()> {
        let _guard = self.manage(id).await;
        self.scheduler.stop(id).await
    }

    pub async fn job_state(&self, id: SubscriberId) -> JobState {
        self.scheduler.job_state(id).await
    }

    pub async fn status(&self, id: SubscriberId) -> WatchResult<SubscriberStatus> {
        let (trackers, filters) = {
            let subscriber = self.subscriber(id)?;
            let subscriber = subscriber.lock().await;
            (subscriber.summaries(), subscriber.filters().list())
        };

        Ok(SubscriberStatus {
            state: self.scheduler.job_state(id).await,
            trackers,
            filters,
        })
    }

    /// Stop every running job. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }
}
