// src/models/work.rs

use std::fmt;

/// Priority tier of a queued item. Lower bands are always served first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Band {
    /// Worker shutdown pills
    Shutdown = 1,
    /// Pages discovered by incremental feed polls
    Incremental = 2,
    /// Static assets and the initial full crawl
    Initial = 3,
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

/// A page to fetch and sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageJob {
    pub url: String,
    /// Feed timestamp for the page; `None` for static assets
    pub updated_at: Option<String>,
}

impl PageJob {
    pub fn new(url: impl Into<String>, updated_at: Option<String>) -> Self {
        Self {
            url: url.into(),
            updated_at,
        }
    }
}

/// What a worker pulls off the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkItem {
    Page(PageJob),
    /// Poison pill: the receiving worker exits
    Stop,
}

impl WorkItem {
    pub fn is_stop(&self) -> bool {
        matches!(self, WorkItem::Stop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_ordering() {
        assert!(Band::Shutdown < Band::Incremental);
        assert!(Band::Incremental < Band::Initial);
        assert_eq!(Band::Initial.to_string(), "3");
    }
}
