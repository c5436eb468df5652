// src/services/invalidation.rs

//! CDN invalidation and the per-run invalidation budget.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;

use crate::error::Result;

/// A CDN that can purge cached paths.
#[async_trait]
pub trait Invalidator: Send + Sync {
    /// Request invalidation of one path. `caller_reference` makes repeated
    /// requests for the same logical change idempotent.
    async fn invalidate(&self, path: &str, caller_reference: &str) -> Result<()>;
}

/// Idempotency token for an invalidation: update timestamp followed by path.
///
/// Pages without a feed timestamp (static assets) use the current time.
pub fn caller_reference(updated_at: Option<&str>, path: &str) -> String {
    match updated_at {
        Some(ts) => format!("{ts}{path}"),
        None => format!("{}{}", Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f"), path),
    }
}

/// Upper bound on invalidations issued during one run.
///
/// Check and increment are separate steps, so concurrent workers can
/// overshoot the limit by at most the pool size minus one.
#[derive(Debug)]
pub struct InvalidationBudget {
    max: usize,
    used: AtomicUsize,
}

impl InvalidationBudget {
    pub fn new(max: usize) -> Self {
        Self {
            max,
            used: AtomicUsize::new(0),
        }
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn used(&self) -> usize {
        self.used.load(Ordering::SeqCst)
    }

    pub fn has_capacity(&self) -> bool {
        self.used() < self.max
    }

    /// Record a successful invalidation; returns the new total.
    pub fn consume(&self) -> usize {
        self.used.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[cfg(feature = "aws")]
pub use cloudfront::CloudFrontInvalidator;

#[cfg(feature = "aws")]
mod cloudfront {
    use aws_sdk_cloudfront::Client;
    use aws_sdk_cloudfront::error::DisplayErrorContext;
    use aws_sdk_cloudfront::types::{InvalidationBatch, Paths};
    use async_trait::async_trait;

    use super::Invalidator;
    use crate::error::{AppError, Result};

    /// Invalidates paths on one CloudFront distribution.
    #[derive(Clone)]
    pub struct CloudFrontInvalidator {
        client: Client,
        distribution_id: String,
    }

    impl CloudFrontInvalidator {
        pub fn new(client: Client, distribution_id: impl Into<String>) -> Self {
            Self {
                client,
                distribution_id: distribution_id.into(),
            }
        }

        pub fn from_conf(
            sdk_config: &aws_config::SdkConfig,
            distribution_id: impl Into<String>,
        ) -> Self {
            Self::new(Client::new(sdk_config), distribution_id)
        }
    }

    #[async_trait]
    impl Invalidator for CloudFrontInvalidator {
        async fn invalidate(&self, path: &str, caller_reference: &str) -> Result<()> {
            let paths = Paths::builder()
                .quantity(1)
                .items(path)
                .build()
                .map_err(AppError::cdn)?;
            let batch = InvalidationBatch::builder()
                .paths(paths)
                .caller_reference(caller_reference)
                .build()
                .map_err(AppError::cdn)?;

            self.client
                .create_invalidation()
                .distribution_id(&self.distribution_id)
                .invalidation_batch(batch)
                .send()
                .await
                .map_err(|e| AppError::cdn(DisplayErrorContext(&e)))?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_reference_uses_timestamp() {
        assert_eq!(
            caller_reference(Some("2024-05-01 10:00:00"), "/a/index.html"),
            "2024-05-01 10:00:00/a/index.html"
        );
    }

    #[test]
    fn test_caller_reference_without_timestamp() {
        let reference = caller_reference(None, "/style.css");
        assert!(reference.ends_with("/style.css"));
        assert!(reference.len() > "/style.css".len());
    }

    #[test]
    fn test_budget() {
        let budget = InvalidationBudget::new(2);
        assert!(budget.has_capacity());
        assert_eq!(budget.consume(), 1);
        assert!(budget.has_capacity());
        assert_eq!(budget.consume(), 2);
        assert!(!budget.has_capacity());
        assert_eq!(budget.used(), 2);
        assert_eq!(budget.max(), 2);
    }

    #[test]
    fn test_zero_budget_never_has_capacity() {
        assert!(!InvalidationBudget::new(0).has_capacity());
    }
}
