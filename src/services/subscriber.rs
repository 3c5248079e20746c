use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::Mutex;
use url::Url;

use crate::domain::{FilterSet, ListingItem};
use crate::errors::{WatchError, WatchResult};
use crate::services::tracker::Tracker;
use crate::sources::ListingSource;

/// Consumer identity, e.g. a chat id.
pub type SubscriberId = i64;

/// A subscriber as shared between management calls and its polling job.
pub type SharedSubscriber = Arc<Mutex<Subscriber>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerSummary {
    pub name: String,
    pub source_url: String,
    pub item_count: usize,
    pub last_polled: Option<DateTime<Utc>>,
}

/// Outcome of one poll over all of a subscriber's trackers.
///
/// Deltas from trackers that succeeded are kept even when others failed.
#[derive(Debug)]
pub struct PollReport {
    deltas: Vec<ListingItem>,
    filters: FilterSet,
    failures: Vec<WatchError>,
}

impl PollReport {
    /// New listings that survive the filter set, evaluated lazily
    pub fn new_items(&self) -> impl Iterator<Item = &ListingItem> + '_ {
        self.deltas
            .iter()
            .filter(move |item| !item.matches_any_filter(&self.filters))
    }

    /// Split into the filtered new listings and the failures
    pub fn into_parts(self) -> (Vec<ListingItem>, Vec<WatchError>) {
        let items = self.new_items().cloned().collect();
        (items, self.failures)
    }
}

/// Everything one consumer watches: named trackers plus exclusion filters.
#[derive(Debug)]
pub struct Subscriber {
    id: SubscriberId,
    trackers: Vec<Tracker>,
    filters: FilterSet,
}

impl Subscriber {
    pub fn new(id: SubscriberId) -> Self {
        Self {
            id,
            trackers: Vec::new(),
            filters: FilterSet::new(),
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Create a tracker for `source_url` and keep it under `name`.
    /// Returns the number of listings the tracker starts with.
    pub async fn add_tracker(
        &mut self,
        name: &str,
        source_url: &str,
        source: &dyn ListingSource,
        timeout: Duration,
    ) -> WatchResult<usize> {
        if self.has_tracker(name) {
            return Err(WatchError::DuplicateName(name.to_string()));
        }

        Url::parse(source_url).map_err(|e| {
            WatchError::InvalidSource(format!("{} ({})", source_url, e))
        })?;

        let tracker = Tracker::initialize(name, source_url, source, timeout).await?;
        if tracker.is_invalid() {
            return Err(WatchError::InvalidSource(source_url.to_string()));
        }

        let count = tracker.len();
        self.trackers.push(tracker);

        tracing::info!(
            subscriber = self.id,
            tracker = name,
            items = count,
            "Added tracker"
        );

        Ok(count)
    }

    pub fn remove_tracker(&mut self, name: &str) -> bool {
        let before = self.trackers.len();
        self.trackers.retain(|t| t.name() != name);
        self.trackers.len() != before
    }

    /// Drop every tracker, returning them for display
    pub fn clear_trackers(&mut self) -> Vec<Tracker> {
        std::mem::take(&mut self.trackers)
    }

    pub fn has_tracker(&self, name: &str) -> bool {
        self.trackers.iter().any(|t| t.name() == name)
    }

    pub fn trackers(&self) -> &[Tracker] {
        &self.trackers
    }

    pub fn summaries(&self) -> Vec<TrackerSummary> {
        self.trackers
            .iter()
            .map(|t| TrackerSummary {
                name: t.name().to_string(),
                source_url: t.source_url().to_string(),
                item_count: t.len(),
                last_polled: t.last_polled(),
            })
            .collect()
    }

    pub fn filters(&self) -> &FilterSet {
        &self.filters
    }

    pub fn filters_mut(&mut self) -> &mut FilterSet {
        &mut self.filters
    }

    /// Poll every tracker concurrently and merge their deltas in tracker order.
    pub async fn poll_all(&mut self, source: &dyn ListingSource, timeout: Duration) -> PollReport {
        let results = join_all(
            self.trackers
                .iter_mut()
                .map(|tracker| tracker.poll(source, timeout)),
        )
        .await;

        let mut deltas = Vec::new();
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(delta) => deltas.extend(delta),
                Err(e) => failures.push(e),
            }
        }

        PollReport {
            deltas,
            filters: self.filters.clone(),
            failures,
        }
    }
}
