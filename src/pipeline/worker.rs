// src/pipeline/worker.rs

//! Fixed-size pool of page workers.

use std::sync::Arc;

use futures::future::join_all;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::models::{SourceConfig, WorkItem};
use crate::pipeline::backends::BackendFactory;
use crate::pipeline::context::RunContext;
use crate::pipeline::queue::WorkQueue;
use crate::pipeline::sync::PageSyncer;
use crate::services::{ChangeDetector, ContentFetcher, HostRewriter};

/// Settings every worker builds its syncer from.
#[derive(Clone)]
pub struct WorkerSettings {
    pub source: SourceConfig,
    pub rewriter: Arc<HostRewriter>,
    pub detector: ChangeDetector,
}

impl WorkerSettings {
    pub fn from_source(source: &SourceConfig) -> Result<Self> {
        Ok(Self {
            source: source.clone(),
            rewriter: Arc::new(HostRewriter::from_config(source)?),
            detector: ChangeDetector::new()?,
        })
    }
}

/// Running workers.
pub struct WorkerPool {
    handles: Vec<JoinHandle<Result<()>>>,
}

impl WorkerPool {
    /// Spawn `size` workers pulling from `queue`.
    pub fn spawn(
        size: usize,
        ctx: Arc<RunContext>,
        queue: Arc<WorkQueue>,
        factory: Arc<dyn BackendFactory>,
        settings: WorkerSettings,
    ) -> Self {
        let handles = (0..size)
            .map(|id| {
                let ctx = Arc::clone(&ctx);
                let queue = Arc::clone(&queue);
                let factory = Arc::clone(&factory);
                let settings = settings.clone();
                tokio::spawn(async move { run_worker(id, ctx, queue, factory, settings).await })
            })
            .collect();

        log::info!("Started {} workers", size);
        Self { handles }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every worker to exit. A panicked worker fails the run.
    pub async fn join(self, ctx: &RunContext) {
        for (id, joined) in join_all(self.handles).await.into_iter().enumerate() {
            match joined {
                Ok(Ok(())) => log::debug!("Worker {} exited", id),
                Ok(Err(e)) => log::debug!("Worker {} exited with error: {}", id, e),
                Err(e) => {
                    log::error!("Worker {} panicked: {}", id, e);
                    ctx.fail(format!("Worker {id} panicked: {e}"));
                }
            }
        }
    }
}

async fn connect(
    id: usize,
    factory: &dyn BackendFactory,
    settings: &WorkerSettings,
    ctx: &RunContext,
) -> Result<PageSyncer> {
    let backends = factory.connect(id).await?;
    let fetcher = ContentFetcher::new(&settings.source, Arc::clone(&settings.rewriter))?;
    Ok(PageSyncer::new(
        fetcher,
        settings.detector.clone(),
        backends.store,
        backends.invalidator,
        Arc::clone(&ctx.budget),
    ))
}

async fn run_worker(
    id: usize,
    ctx: Arc<RunContext>,
    queue: Arc<WorkQueue>,
    factory: Arc<dyn BackendFactory>,
    settings: WorkerSettings,
) -> Result<()> {
    let syncer = match connect(id, factory.as_ref(), &settings, &ctx).await {
        Ok(syncer) => syncer,
        Err(e) => {
            let message = format!("Exception creating clients in worker {id}: {e}");
            log::error!("{}", message);
            ctx.fail(message);
            return Err(e);
        }
    };

    while !ctx.has_failed() {
        let job = match queue.pop().await {
            WorkItem::Stop => break,
            WorkItem::Page(job) => job,
        };
        // Another worker may have failed while this one waited.
        if ctx.has_failed() {
            break;
        }

        match syncer.sync_page(&job).await {
            Ok(outcome) => ctx.stats.record(&outcome),
            Err(e) => {
                let message = format!("Exception scraping: {}: {}", job.url, e);
                log::error!("{}", message);
                ctx.fail(message);
                return Err(e);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::error::AppError;
    use crate::models::{Band, PageJob};
    use crate::pipeline::backends::{SharedBackends, WorkerBackends};
    use crate::storage::MemoryStore;

    struct FailingFactory;

    #[async_trait]
    impl BackendFactory for FailingFactory {
        async fn connect(&self, _worker_id: usize) -> Result<WorkerBackends> {
            Err(AppError::store("no credentials"))
        }
    }

    fn settings(base: &str) -> WorkerSettings {
        WorkerSettings::from_source(&SourceConfig {
            base_url: base.to_string(),
            ..SourceConfig::default()
        })
        .unwrap()
    }

    async fn join_within(pool: WorkerPool, ctx: &RunContext) {
        tokio::time::timeout(Duration::from_secs(5), pool.join(ctx))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_workers_drain_queue_and_stop() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).insert_header("content-type", "text/css"))
            .mount(&server)
            .await;

        let store = MemoryStore::new();
        let ctx = Arc::new(RunContext::new(0));
        let queue = Arc::new(WorkQueue::new());
        for i in 0..6 {
            queue.push_page(
                Band::Initial,
                PageJob::new(format!("{}/css/{i}.css", server.uri()), None),
            );
        }

        let pool = WorkerPool::spawn(
            3,
            Arc::clone(&ctx),
            Arc::clone(&queue),
            Arc::new(SharedBackends::new(Arc::new(store.clone()))),
            settings(&server.uri()),
        );
        while !queue.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        for _ in 0..pool.size() {
            queue.push_stop();
        }
        join_within(pool, &ctx).await;

        assert!(!ctx.has_failed());
        assert_eq!(ctx.stats.snapshot().pages_scraped, 6);
        assert_eq!(ctx.stats.snapshot().pages_new, 6);
        assert_eq!(store.len(), 6);
    }

    #[tokio::test]
    async fn test_page_error_fails_run() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/broken/"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let ctx = Arc::new(RunContext::new(0));
        let queue = Arc::new(WorkQueue::new());
        queue.push_page(
            Band::Initial,
            PageJob::new(format!("{}/broken/", server.uri()), None),
        );

        let pool = WorkerPool::spawn(
            2,
            Arc::clone(&ctx),
            Arc::clone(&queue),
            Arc::new(SharedBackends::new(Arc::new(MemoryStore::new()))),
            settings(&server.uri()),
        );
        while !ctx.has_failed() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        for _ in 0..pool.size() {
            queue.push_stop();
        }
        join_within(pool, &ctx).await;

        let error = ctx.error().unwrap();
        assert!(error.starts_with("Exception scraping:"), "{error}");
        assert!(error.contains("/broken/"));
        assert_eq!(ctx.stats.snapshot().pages_scraped, 0);
    }

    #[tokio::test]
    async fn test_no_page_starts_after_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/broken/"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).insert_header("content-type", "text/css"))
            .mount(&server)
            .await;

        let store = MemoryStore::new();
        let ctx = Arc::new(RunContext::new(0));
        let queue = Arc::new(WorkQueue::new());
        queue.push_page(
            Band::Initial,
            PageJob::new(format!("{}/broken/", server.uri()), None),
        );

        let pool = WorkerPool::spawn(
            3,
            Arc::clone(&ctx),
            Arc::clone(&queue),
            Arc::new(SharedBackends::new(Arc::new(store.clone()))),
            settings(&server.uri()),
        );
        while !ctx.has_failed() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        for i in 0..4 {
            queue.push_page(
                Band::Incremental,
                PageJob::new(format!("{}/ok/{i}.css", server.uri()), None),
            );
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        for _ in 0..pool.size() {
            queue.push_stop();
        }
        join_within(pool, &ctx).await;

        assert_eq!(ctx.stats.snapshot().pages_scraped, 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_connect_failure_fails_run() {
        let ctx = Arc::new(RunContext::new(0));
        let queue = Arc::new(WorkQueue::new());

        let pool = WorkerPool::spawn(
            2,
            Arc::clone(&ctx),
            Arc::clone(&queue),
            Arc::new(FailingFactory),
            settings("https://example.org"),
        );
        join_within(pool, &ctx).await;

        assert!(ctx.error().unwrap().contains("no credentials"));
    }
}
