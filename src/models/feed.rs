// src/models/feed.rs

use serde::{Deserialize, Serialize};

/// Starting value of the high-water mark before any feed entry is seen.
pub const EPOCH_SENTINEL: &str = "2000-01-01 00:00:00";

/// One record of the upstream "recently updated" feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    /// Page link, usually a site-relative path
    pub link: String,
    /// Lexicographically comparable timestamp string
    pub updated_at: String,
}

/// Most recent `(updated_at, url)` pair observed in the feed.
///
/// Owned by the polling task; workers never see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighWaterMark {
    pub max_updated_at: String,
    pub max_url: Option<String>,
}

impl HighWaterMark {
    /// Advance the mark if `updated_at` is strictly newer. Returns whether it moved.
    pub fn observe(&mut self, updated_at: &str, url: &str) -> bool {
        if updated_at > self.max_updated_at.as_str() {
            self.max_updated_at = updated_at.to_string();
            self.max_url = Some(url.to_string());
            true
        } else {
            false
        }
    }

    /// True when the entry is exactly the mark itself, i.e. the feed's repeated tail.
    pub fn is_tail(&self, updated_at: &str, url: &str) -> bool {
        self.max_updated_at == updated_at && self.max_url.as_deref() == Some(url)
    }
}

impl Default for HighWaterMark {
    fn default() -> Self {
        Self {
            max_updated_at: EPOCH_SENTINEL.to_string(),
            max_url: None,
        }
    }
}
