// src/pipeline/feed.rs

//! Polls the upstream "recently updated" feed.

use reqwest::Client;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{Band, FeedEntry, HighWaterMark, PageJob, RunStats, SourceConfig};
use crate::pipeline::queue::WorkQueue;
use crate::utils::http::create_async_client;

/// Reads the feed and turns its entries into page jobs.
///
/// Owns the high-water mark; nothing else reads or writes it.
pub struct FeedPoller {
    client: Client,
    source: SourceConfig,
    feed_url: Url,
    mark: HighWaterMark,
}

impl FeedPoller {
    pub fn new(source: &SourceConfig) -> Result<Self> {
        Ok(Self {
            client: create_async_client(source)?,
            source: source.clone(),
            feed_url: source.feed_url()?,
            mark: HighWaterMark::default(),
        })
    }

    pub fn mark(&self) -> &HighWaterMark {
        &self.mark
    }

    pub fn source(&self) -> &SourceConfig {
        &self.source
    }

    /// Fetch the feed, optionally limited to entries updated since `since`.
    pub async fn fetch_feed(&self, since: Option<&str>) -> Result<Vec<FeedEntry>> {
        let mut request = self.client.get(self.feed_url.clone());
        if let Some(since) = since {
            request = request.query(&[("timestamp", since)]);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::fetch(
                self.feed_url.as_str(),
                format!("HTTP status {status}"),
            ));
        }
        Ok(response.json().await?)
    }

    /// Enqueue every page in the full feed at the initial band.
    pub async fn initial_pass(&mut self, queue: &WorkQueue) -> Result<usize> {
        let entries = self.fetch_feed(None).await?;
        let count = entries.len();

        for entry in entries {
            let url = self.source.resolve(&entry.link)?.to_string();
            self.mark.observe(&entry.updated_at, &url);
            queue.push_page(Band::Initial, PageJob::new(url, Some(entry.updated_at)));
        }

        log::info!(
            "Queued {} feed pages, latest update {}",
            count,
            self.mark.max_updated_at
        );
        Ok(count)
    }

    /// Enqueue pages updated since the mark at the incremental band.
    ///
    /// The feed repeats its newest entry on every poll; that entry is
    /// skipped when it matches the mark exactly.
    pub async fn poll_updates(&mut self, queue: &WorkQueue, stats: &RunStats) -> Result<usize> {
        log::info!("Fetching pages updated since: {}", self.mark.max_updated_at);
        let since = self.mark.max_updated_at.clone();
        let entries = self.fetch_feed(Some(&since)).await?;

        let mut queued = 0;
        for entry in entries {
            let url = self.source.resolve(&entry.link)?.to_string();
            if self.mark.is_tail(&entry.updated_at, &url) {
                continue;
            }

            self.mark.observe(&entry.updated_at, &url);
            stats.record_updated_at_page();
            log::info!("Updated page: {} at {}", url, entry.updated_at);
            queue.push_page(Band::Incremental, PageJob::new(url, Some(entry.updated_at)));
            queued += 1;
        }

        Ok(queued)
    }
}
