use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::domain::{IdentityKey, ListingItem};
use crate::errors::{WatchError, WatchResult};
use crate::sources::ListingSource;

/// Change detection for one search URL.
///
/// `known` holds every listing ever seen for the source, keyed by identity.
/// It only grows; a poll reports what is not in it yet and then absorbs it.
#[derive(Debug, Clone)]
pub struct Tracker {
    name: String,
    source_url: String,
    known: HashMap<IdentityKey, ListingItem>,
    invalid: bool,
    last_polled: Option<DateTime<Utc>>,
}

impl Tracker {
    /// Fetch the source once and remember everything it returns.
    /// An empty first result is not an error here; it marks the tracker invalid.
    pub async fn initialize(
        name: &str,
        source_url: &str,
        source: &dyn ListingSource,
        timeout: Duration,
    ) -> WatchResult<Self> {
        let items = fetch_items(name, source_url, source, timeout).await?;

        let mut known = HashMap::with_capacity(items.len());
        for item in items {
            known.insert(item.identity(), item);
        }

        let invalid = known.is_empty();
        let now = Utc::now();

        Ok(Self {
            name: name.to_string(),
            source_url: source_url.to_string(),
            known,
            invalid,
            last_polled: Some(now),
        })
    }

    /// Fetch again and return listings not seen before. A failed fetch leaves
    /// the known set untouched.
    pub async fn poll(
        &mut self,
        source: &dyn ListingSource,
        timeout: Duration,
    ) -> WatchResult<Vec<ListingItem>> {
        let candidates = fetch_items(&self.name, &self.source_url, source, timeout).await?;

        let mut delta = Vec::new();
        for item in candidates {
            let key = item.identity();
            if !self.known.contains_key(&key) {
                self.known.insert(key, item.clone());
                delta.push(item);
            }
        }

        self.last_polled = Some(Utc::now());

        tracing::debug!(
            tracker = %self.name,
            new = delta.len(),
            known = self.known.len(),
            "Polled tracker"
        );

        Ok(delta)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn is_invalid(&self) -> bool {
        self.invalid
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    pub fn items(&self) -> impl Iterator<Item = &ListingItem> {
        self.known.values()
    }

    pub fn last_polled(&self) -> Option<DateTime<Utc>> {
        self.last_polled
    }
}

async fn fetch_items(
    name: &str,
    url: &str,
    source: &dyn ListingSource,
    timeout: Duration,
) -> WatchResult<Vec<ListingItem>> {
    let raw = match tokio::time::timeout(timeout, source.fetch(url)).await {
        Ok(Ok(raw)) => raw,
        Ok(Err(WatchError::FetchFailure { reason, .. })) => {
            return Err(WatchError::fetch_failure(name, reason))
        }
        Ok(Err(e)) => return Err(WatchError::fetch_failure(name, e)),
        Err(_) => {
            return Err(WatchError::fetch_failure(
                name,
                format!("timed out after {}s", timeout.as_secs_f32()),
            ))
        }
    };

    Ok(raw.into_iter().map(ListingItem::from_raw).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RawListing;
    use crate::sources::MockListingSource;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn raw(url: &str) -> RawListing {
        RawListing::new(1, url).with_self_link(url)
    }

    fn source_returning(urls: &'static [&'static str]) -> MockListingSource {
        let mut source = MockListingSource::new();
        source
            .expect_fetch()
            .returning(move |_| Ok(urls.iter().map(|u| raw(u)).collect()));
        source
    }

    /// Returns one batch per call, repeating the last batch once exhausted.
    fn source_with_batches(batches: Vec<Vec<&'static str>>) -> MockListingSource {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut source = MockListingSource::new();
        source.expect_fetch().returning(move |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst).min(batches.len() - 1);
            Ok(batches[n].iter().map(|u| raw(u)).collect())
        });
        source
    }

    #[tokio::test]
    async fn test_initialize_counts_unique_items() {
        let source = source_returning(&["a", "b", "a"]);
        let tracker = Tracker::initialize("bikes", "https://x/search", &source, TIMEOUT)
            .await
            .unwrap();

        assert_eq!(tracker.len(), 2);
        assert!(!tracker.is_invalid());
        assert_eq!(tracker.name(), "bikes");
        assert_eq!(tracker.source_url(), "https://x/search");
    }

    #[tokio::test]
    async fn test_initialize_empty_marks_invalid() {
        let source = source_returning(&[]);
        let tracker = Tracker::initialize("empty", "https://x/none", &source, TIMEOUT)
            .await
            .unwrap();

        assert!(tracker.is_invalid());
        assert!(tracker.is_empty());
    }

    #[tokio::test]
    async fn test_poll_returns_set_difference() {
        let source = source_with_batches(vec![vec!["x", "y"], vec!["x", "y", "z"]]);
        let mut tracker = Tracker::initialize("t", "u", &source, TIMEOUT).await.unwrap();

        let delta = tracker.poll(&source, TIMEOUT).await.unwrap();

        assert_eq!(delta.len(), 1);
        assert_eq!(delta[0].url.as_deref(), Some("z"));
        assert_eq!(tracker.len(), 3);
    }

    #[tokio::test]
    async fn test_poll_is_idempotent() {
        let source = source_with_batches(vec![vec!["a"], vec!["a", "b"]]);
        let mut tracker = Tracker::initialize("t", "u", &source, TIMEOUT).await.unwrap();

        assert_eq!(tracker.poll(&source, TIMEOUT).await.unwrap().len(), 1);
        assert!(tracker.poll(&source, TIMEOUT).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_known_items_only_grow() {
        let source = source_with_batches(vec![vec!["a", "b"], vec!["c"], vec!["a"]]);
        let mut tracker = Tracker::initialize("t", "u", &source, TIMEOUT).await.unwrap();

        tracker.poll(&source, TIMEOUT).await.unwrap();
        let delta = tracker.poll(&source, TIMEOUT).await.unwrap();

        assert!(delta.is_empty(), "a reappearing listing is not new");
        let mut known: Vec<&str> = tracker.items().filter_map(|i| i.url.as_deref()).collect();
        known.sort_unstable();
        assert_eq!(known, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_poll_failure_is_reported() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut source = MockListingSource::new();
        source.expect_fetch().returning(move |_| {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(vec![raw("a")])
            } else {
                Err(WatchError::Config("connection reset".to_string()))
            }
        });

        let mut tracker = Tracker::initialize("bikes", "u", &source, TIMEOUT).await.unwrap();
        let result = tracker.poll(&source, TIMEOUT).await;

        match result {
            Err(WatchError::FetchFailure { tracker: name, reason }) => {
                assert_eq!(name, "bikes");
                assert!(reason.contains("connection reset"));
            }
            other => panic!("expected FetchFailure, got {:?}", other),
        }
        assert_eq!(tracker.len(), 1);
    }

    #[tokio::test]
    async fn test_initialize_failure_propagates() {
        let mut source = MockListingSource::new();
        source
            .expect_fetch()
            .returning(|url| Err(WatchError::fetch_failure(url, "HTTP 401")));

        let result = Tracker::initialize("t", "u", &source, TIMEOUT).await;
        assert!(matches!(result, Err(WatchError::FetchFailure { .. })));
    }

    struct SlowSource;

    #[async_trait::async_trait]
    impl ListingSource for SlowSource {
        async fn fetch(&self, _url: &str) -> WatchResult<Vec<RawListing>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_is_bounded_by_timeout() {
        let result = Tracker::initialize("slow", "u", &SlowSource, Duration::from_secs(2)).await;

        match result {
            Err(WatchError::FetchFailure { reason, .. }) => assert!(reason.contains("timed out")),
            other => panic!("expected timeout, got {:?}", other),
        }
    }
}
