// src/models/mod.rs

//! Domain models for the mirror.
//!
//! This module contains the data structures shared between the feed poller,
//! the work queue and the workers, organized by their primary purpose.

mod config;
mod feed;
mod stats;
mod work;

// Re-export all public types
pub use config::{
    CdnConfig, Config, CrawlerConfig, LoggingConfig, MetricsConfig, NotifyConfig, SourceConfig,
    StorageBackend, StorageConfig,
};
pub use feed::{FeedEntry, HighWaterMark, EPOCH_SENTINEL};
pub use stats::{PageOutcome, RunStats, StatsSnapshot};
pub use work::{Band, PageJob, WorkItem};
