// src/pipeline/sync.rs

//! Per-page fetch, classify, store and invalidate.

use std::sync::Arc;

use crate::error::Result;
use crate::models::{PageJob, PageOutcome};
use crate::services::{
    Change, ChangeDetector, Classification, ContentFetcher, FetchedPage, InvalidationBudget,
    Invalidator, caller_reference,
};
use crate::storage::{ObjectStore, StoredObject};
use crate::utils::url::{invalidation_path, object_key};

/// Syncs pages into one worker's store handle.
pub struct PageSyncer {
    fetcher: ContentFetcher,
    detector: ChangeDetector,
    store: Arc<dyn ObjectStore>,
    invalidator: Option<Arc<dyn Invalidator>>,
    budget: Arc<InvalidationBudget>,
}

impl PageSyncer {
    pub fn new(
        fetcher: ContentFetcher,
        detector: ChangeDetector,
        store: Arc<dyn ObjectStore>,
        invalidator: Option<Arc<dyn Invalidator>>,
        budget: Arc<InvalidationBudget>,
    ) -> Self {
        Self {
            fetcher,
            detector,
            store,
            invalidator,
            budget,
        }
    }

    /// Fetch one page and bring the store up to date with it.
    pub async fn sync_page(&self, job: &PageJob) -> Result<PageOutcome> {
        log::info!("Scraping: {}", job.url);

        let page = self.fetcher.fetch(&job.url).await?;
        let key = object_key(&job.url)?;
        let classification = self
            .detector
            .classify(&key, &page.body, &page.mime, self.store.as_ref())
            .await?;

        self.sync(&key, page, &classification).await?;
        let invalidated = self
            .maybe_invalidate(&key, classification.is_updated(), job.updated_at.as_deref())
            .await;

        Ok(PageOutcome {
            new: classification.is_new(),
            updated: classification.is_updated(),
            invalidated,
        })
    }

    /// Write the page if it is new or changed. Returns whether it wrote.
    pub async fn sync(
        &self,
        key: &str,
        page: FetchedPage,
        classification: &Classification,
    ) -> Result<bool> {
        let hash = &classification.hash;
        match &classification.change {
            Change::Unchanged => {
                log::info!("Page not updated: {}, source: {}", key, hash);
                return Ok(false);
            }
            Change::New => log::info!("New page: {}, source: {}", key, hash),
            Change::Updated { previous } => log::info!(
                "Page update: {}, source: {}, store: {}",
                key,
                hash,
                previous
            ),
        }

        let object = StoredObject::with_hash(key, page.content_type, page.body, hash.clone());
        self.store.put(object).await?;
        Ok(true)
    }

    /// Invalidate the CDN copy of an updated page while budget remains.
    ///
    /// Failures are logged and reported as "not invalidated".
    pub async fn maybe_invalidate(
        &self,
        key: &str,
        is_updated: bool,
        updated_at: Option<&str>,
    ) -> bool {
        if !is_updated {
            return false;
        }
        let Some(invalidator) = &self.invalidator else {
            return false;
        };
        if !self.budget.has_capacity() {
            log::debug!(
                "Invalidation budget exhausted ({}), skipping {}",
                self.budget.max(),
                key
            );
            return false;
        }

        let path = invalidation_path(key);
        let reference = caller_reference(updated_at, &path);
        match invalidator.invalidate(&path, &reference).await {
            Ok(()) => {
                let used = self.budget.consume();
                log::info!(
                    "CloudFront invalidation ({}/{}): {}",
                    used,
                    self.budget.max(),
                    path
                );
                true
            }
            Err(e) => {
                log::error!("Exception invalidating {}: {}", path, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::error::AppError;
    use crate::models::SourceConfig;
    use crate::services::HostRewriter;
    use crate::storage::MemoryStore;

    #[derive(Default)]
    struct RecordingInvalidator {
        calls: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl Invalidator for RecordingInvalidator {
        async fn invalidate(&self, path: &str, caller_reference: &str) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push((path.to_string(), caller_reference.to_string()));
            if self.fail {
                Err(AppError::cdn("throttled"))
            } else {
                Ok(())
            }
        }
    }

    fn syncer(
        base: &str,
        store: &MemoryStore,
        invalidator: Option<Arc<RecordingInvalidator>>,
        max: usize,
    ) -> PageSyncer {
        let source = SourceConfig {
            base_url: base.to_string(),
            ..SourceConfig::default()
        };
        let rewriter = Arc::new(HostRewriter::from_config(&source).unwrap());
        PageSyncer::new(
            ContentFetcher::new(&source, rewriter).unwrap(),
            ChangeDetector::new().unwrap(),
            Arc::new(store.clone()),
            invalidator.map(|i| i as Arc<dyn Invalidator>),
            Arc::new(InvalidationBudget::new(max)),
        )
    }

    async fn serve_html(server: &MockServer, route: &str, body: &str, times: u64) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html; charset=UTF-8")
                    .set_body_string(body),
            )
            .up_to_n_times(times)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_unchanged_page_is_not_rewritten() {
        let server = MockServer::start().await;
        serve_html(&server, "/about/", r#"<p>{"nonce":"0123456789"}</p>"#, 1).await;
        serve_html(&server, "/about/", r#"<p>{"nonce":"abcdefabcd"}</p>"#, 1).await;

        let store = MemoryStore::new();
        let invalidator = Arc::new(RecordingInvalidator::default());
        let syncer = syncer(&server.uri(), &store, Some(invalidator.clone()), 10);
        let job = PageJob::new(format!("{}/about/", server.uri()), None);

        let first = syncer.sync_page(&job).await.unwrap();
        assert!(first.new);
        assert!(!first.invalidated);

        let second = syncer.sync_page(&job).await.unwrap();
        assert_eq!(second, PageOutcome::default());
        assert_eq!(store.put_count(), 1);
        assert!(invalidator.calls.lock().unwrap().is_empty());
        assert!(store.get("about/index.html").is_some());
    }

    #[tokio::test]
    async fn test_changed_page_is_updated_and_invalidated() {
        let server = MockServer::start().await;
        serve_html(&server, "/news/", "<p>v1</p>", 1).await;
        serve_html(&server, "/news/", "<p>v2</p>", 1).await;

        let store = MemoryStore::new();
        let invalidator = Arc::new(RecordingInvalidator::default());
        let syncer = syncer(&server.uri(), &store, Some(invalidator.clone()), 10);
        let job = PageJob::new(
            format!("{}/news/", server.uri()),
            Some("2024-03-01 12:00:00".to_string()),
        );

        assert!(syncer.sync_page(&job).await.unwrap().new);
        let outcome = syncer.sync_page(&job).await.unwrap();
        assert!(outcome.updated);
        assert!(outcome.invalidated);

        let calls = invalidator.calls.lock().unwrap();
        assert_eq!(
            calls.as_slice(),
            &[(
                "/news/index.html".to_string(),
                "2024-03-01 12:00:00/news/index.html".to_string()
            )]
        );
        assert_eq!(store.get("news/index.html").unwrap().body, b"<p>v2</p>");
    }

    #[tokio::test]
    async fn test_budget_caps_invalidations() {
        let store = MemoryStore::new();
        let invalidator = Arc::new(RecordingInvalidator::default());
        let syncer = syncer("https://example.org", &store, Some(invalidator.clone()), 2);

        let mut invalidated = 0;
        for i in 0..5 {
            if syncer
                .maybe_invalidate(&format!("p{i}/index.html"), true, None)
                .await
            {
                invalidated += 1;
            }
        }

        assert_eq!(invalidated, 2);
        assert_eq!(invalidator.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_new_pages_are_never_invalidated() {
        let store = MemoryStore::new();
        let invalidator = Arc::new(RecordingInvalidator::default());
        let syncer = syncer("https://example.org", &store, Some(invalidator.clone()), 5);

        assert!(!syncer.maybe_invalidate("a/index.html", false, None).await);
        assert!(invalidator.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalidation_failure_is_not_fatal() {
        let store = MemoryStore::new();
        let invalidator = Arc::new(RecordingInvalidator {
            fail: true,
            ..Default::default()
        });
        let syncer = syncer("https://example.org", &store, Some(invalidator.clone()), 5);

        assert!(!syncer.maybe_invalidate("a/index.html", true, None).await);
        assert_eq!(invalidator.calls.lock().unwrap().len(), 1);
        assert_eq!(syncer.budget.used(), 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let store = MemoryStore::new();
        let syncer = syncer(&server.uri(), &store, None, 0);
        let job = PageJob::new(format!("{}/missing/", server.uri()), None);

        assert!(syncer.sync_page(&job).await.is_err());
        assert!(store.is_empty());
    }
}
