use async_trait::async_trait;

use crate::domain::RawListing;
use crate::errors::WatchResult;

/// The network collaborator that turns a search URL into raw listing records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Fetch every listing currently returned for `url`
    async fn fetch(&self, url: &str) -> WatchResult<Vec<RawListing>>;
}
