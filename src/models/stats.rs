// src/models/stats.rs

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Result of syncing one page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageOutcome {
    pub new: bool,
    pub updated: bool,
    pub invalidated: bool,
}

/// Run-wide counters shared by every worker.
#[derive(Debug, Default)]
pub struct RunStats {
    pages_scraped: AtomicU64,
    pages_new: AtomicU64,
    pages_updated: AtomicU64,
    invalidations: AtomicU64,
    updated_at_pages: AtomicU64,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a finished page.
    pub fn record(&self, outcome: &PageOutcome) {
        self.pages_scraped.fetch_add(1, Ordering::Relaxed);
        if outcome.new {
            self.pages_new.fetch_add(1, Ordering::Relaxed);
        }
        if outcome.updated {
            self.pages_updated.fetch_add(1, Ordering::Relaxed);
        }
        if outcome.invalidated {
            self.invalidations.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Count a page enqueued by an incremental feed poll.
    pub fn record_updated_at_page(&self) {
        self.updated_at_pages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            pages_scraped: self.pages_scraped.load(Ordering::Relaxed),
            pages_new: self.pages_new.load(Ordering::Relaxed),
            pages_updated: self.pages_updated.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            updated_at_pages: self.updated_at_pages.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`RunStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub pages_scraped: u64,
    pub pages_new: u64,
    pub pages_updated: u64,
    pub invalidations: u64,
    pub updated_at_pages: u64,
}

impl StatsSnapshot {
    /// Metric name and value pairs in publishing order.
    pub fn metrics(&self) -> [(&'static str, u64); 5] {
        [
            ("pages-scraped", self.pages_scraped),
            ("pages-new", self.pages_new),
            ("pages-updated", self.pages_updated),
            ("invalidations", self.invalidations),
            ("updated-at-pages", self.updated_at_pages),
        ]
    }
}
