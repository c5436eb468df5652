// src/pipeline/prune.rs

//! Removes stored objects the site no longer publishes.

use std::collections::HashSet;

use serde::Serialize;

use crate::error::Result;
use crate::pipeline::feed::FeedPoller;
use crate::storage::ObjectStore;
use crate::utils::url::{object_key, static_url};

/// Counts from one prune pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub listed: usize,
    pub kept: usize,
    pub preserved: usize,
    pub deleted: usize,
}

/// Compares the store against the feed and static list and deletes the rest.
pub struct Pruner<'a> {
    poller: &'a FeedPoller,
    store: &'a dyn ObjectStore,
    preserved_prefixes: Vec<String>,
    dry_run: bool,
}

impl<'a> Pruner<'a> {
    pub fn new(poller: &'a FeedPoller, store: &'a dyn ObjectStore) -> Self {
        Self {
            poller,
            store,
            preserved_prefixes: Vec::new(),
            dry_run: false,
        }
    }

    /// Key prefixes that are never deleted, e.g. hand-uploaded assets.
    pub fn preserve(mut self, prefixes: Vec<String>) -> Self {
        self.preserved_prefixes = prefixes
            .into_iter()
            .map(|p| p.trim_start_matches('/').to_string())
            .filter(|p| !p.is_empty())
            .collect();
        self
    }

    /// Only log what would be deleted.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Keys the mirror currently publishes.
    pub async fn expected_keys(&self, static_paths: &[String]) -> Result<HashSet<String>> {
        let mut keys = HashSet::new();
        for entry in self.poller.fetch_feed(None).await? {
            let url = self.poller.source().resolve(&entry.link)?;
            keys.insert(object_key(url.as_str())?);
        }

        let base = self.poller.source().base()?;
        for path in static_paths {
            keys.insert(object_key(&static_url(&base, path)?)?);
        }
        Ok(keys)
    }

    fn is_preserved(&self, key: &str) -> bool {
        self.preserved_prefixes
            .iter()
            .any(|prefix| key.starts_with(prefix.as_str()))
    }

    pub async fn prune(&self, static_paths: &[String]) -> Result<PruneReport> {
        let expected = self.expected_keys(static_paths).await?;
        let stored = self.store.list_keys().await?;

        let mut report = PruneReport {
            listed: stored.len(),
            ..Default::default()
        };
        for key in stored {
            if expected.contains(&key) {
                report.kept += 1;
            } else if self.is_preserved(&key) {
                report.preserved += 1;
            } else if self.dry_run {
                log::info!("Would delete: {}", self.store.location(&key));
                report.deleted += 1;
            } else {
                self.store.delete(&key).await?;
                log::info!("Deleted: {}", self.store.location(&key));
                report.deleted += 1;
            }
        }

        log::info!(
            "Prune - Listed: {}, Kept: {}, Preserved: {}, Deleted: {}{}",
            report.listed,
            report.kept,
            report.preserved,
            report.deleted,
            if self.dry_run { " (dry run)" } else { "" }
        );
        Ok(report)
    }
}
