use regex::{Regex, RegexBuilder};

use super::ListingItem;
use crate::errors::WatchResult;

/// Ordered set of case-insensitive exclusion patterns matched against listing URLs.
///
/// Patterns are compiled when added, so a bad pattern is rejected up front
/// instead of surfacing in the middle of a poll.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    patterns: Vec<(String, Regex)>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, pattern: &str) -> WatchResult<()> {
        let regex = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        self.patterns.push((pattern.to_string(), regex));
        Ok(())
    }

    pub fn clear(&mut self) {
        self.patterns.clear();
    }

    /// Patterns in insertion order
    pub fn list(&self) -> Vec<String> {
        self.patterns.iter().map(|(p, _)| p.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// An item is excluded when any pattern is found somewhere in its URL.
    /// Items without a URL are never excluded.
    pub fn is_excluded(&self, item: &ListingItem) -> bool {
        match item.identity_key() {
            Some(url) => self.patterns.iter().any(|(_, re)| re.is_match(url)),
            None => false,
        }
    }
}
