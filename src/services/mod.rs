//! Service layer for the mirror.
//!
//! This module contains the per-page building blocks:
//! - Page fetching and hostname rewriting (`ContentFetcher`, `HostRewriter`)
//! - Content hashing and change classification (`ChangeDetector`)
//! - CDN invalidation and its per-run budget (`Invalidator`)
//! - Metrics publishing (`MetricsSink`)
//! - Failure notifications (`Notifier`)

pub mod detector;
pub mod fetcher;
pub mod invalidation;
pub mod metrics;
pub mod notify;

pub use detector::{Change, ChangeDetector, Classification};
pub use fetcher::{ContentFetcher, FetchedPage, HostRewriter};
pub use invalidation::{InvalidationBudget, Invalidator, caller_reference};
pub use metrics::MetricsSink;
pub use notify::{MailRelay, Notifier};

#[cfg(feature = "aws")]
pub use invalidation::CloudFrontInvalidator;
#[cfg(feature = "aws")]
pub use metrics::CloudWatchSink;
#[cfg(feature = "email")]
pub use notify::SmtpRelay;
