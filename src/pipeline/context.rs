// src/pipeline/context.rs

//! State shared by every task of one run.

use std::sync::{Arc, OnceLock};

use crate::models::RunStats;
use crate::services::InvalidationBudget;

/// Run-scoped shared state: the sticky failure, statistics and the
/// invalidation budget. Passed explicitly to every worker.
#[derive(Debug)]
pub struct RunContext {
    error: OnceLock<String>,
    pub stats: RunStats,
    pub budget: Arc<InvalidationBudget>,
}

impl RunContext {
    pub fn new(max_invalidations: usize) -> Self {
        Self {
            error: OnceLock::new(),
            stats: RunStats::new(),
            budget: Arc::new(InvalidationBudget::new(max_invalidations)),
        }
    }

    /// Record a fatal failure. Only the first message is kept.
    pub fn fail(&self, message: impl Into<String>) {
        let message = message.into();
        if self.error.set(message).is_err() {
            log::debug!("Run already failed; keeping first error");
        }
    }

    pub fn has_failed(&self) -> bool {
        self.error.get().is_some()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.get().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_failure_wins() {
        let ctx = RunContext::new(1);
        assert!(!ctx.has_failed());
        ctx.fail("first");
        ctx.fail("second");
        assert!(ctx.has_failed());
        assert_eq!(ctx.error(), Some("first"));
    }
}
