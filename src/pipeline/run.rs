// src/pipeline/run.rs

//! Run coordinator: owns the queue, the pool and the feed poller for one
//! mirror run and drives them through a fixed sequence of states.
//!
//! ```text
//! Starting -> Running -> Draining -> Reporting -> Done
//!                \-> Aborting -/
//! ```
//!
//! `Aborting` is entered on a fatal error or a termination signal. Stats
//! are reported on every path that reaches `Draining`.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{Band, Config, PageJob, StatsSnapshot};
use crate::pipeline::backends::BackendFactory;
use crate::pipeline::context::RunContext;
use crate::pipeline::feed::FeedPoller;
use crate::pipeline::queue::WorkQueue;
use crate::pipeline::shutdown::termination_signal;
use crate::pipeline::worker::{WorkerPool, WorkerSettings};
use crate::services::MetricsSink;
use crate::utils::url::static_url;

/// Lifecycle of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Starting,
    Running,
    Aborting,
    Draining,
    Reporting,
    Done,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Aborting => "aborting",
            Self::Draining => "draining",
            Self::Reporting => "reporting",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Outcome of a run that reached reporting.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub stats: StatsSnapshot,
    /// First fatal error, if any
    pub error: Option<String>,
    /// A termination signal cut the run short
    pub aborted: bool,
    pub final_state: RunState,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Drives one mirror run.
pub struct RunCoordinator {
    config: Config,
    factory: Arc<dyn BackendFactory>,
    metrics: Option<Arc<dyn MetricsSink>>,
    static_paths: Vec<String>,
    run_id: String,
    state: RunState,
}

impl RunCoordinator {
    pub fn new(config: Config, factory: Arc<dyn BackendFactory>) -> Self {
        Self {
            config,
            factory,
            metrics: None,
            static_paths: Vec::new(),
            run_id: Uuid::new_v4().to_string(),
            state: RunState::Starting,
        }
    }

    pub fn with_metrics(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(sink);
        self
    }

    /// Site-relative paths of static assets to mirror on every run.
    pub fn with_static_paths(mut self, paths: Vec<String>) -> Self {
        self.static_paths = paths;
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn transition(&mut self, next: RunState) {
        log::debug!("Run {} {} -> {}", self.run_id, self.state, next);
        self.state = next;
    }

    /// Run until the work is done or SIGINT/SIGTERM arrives.
    pub async fn run(self) -> Result<RunReport> {
        self.run_until(termination_signal()).await
    }

    /// Run until the work is done or `shutdown` resolves.
    ///
    /// Returns `Err` only for invalid config, setup failures and a failed
    /// heartbeat. Fatal page or feed errors are carried in
    /// [`RunReport::error`], or folded into the heartbeat error when both
    /// happen.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<RunReport>
    where
        F: Future<Output = ()>,
    {
        self.config.validate()?;
        log::info!("Starting run {}", self.run_id);

        let settings = WorkerSettings::from_source(&self.config.source)?;
        let mut poller = FeedPoller::new(&self.config.source)?;
        let ctx = Arc::new(RunContext::new(self.config.cdn.max_invalidations));
        let queue = Arc::new(WorkQueue::new());

        let pool = WorkerPool::spawn(
            self.config.crawler.workers,
            Arc::clone(&ctx),
            Arc::clone(&queue),
            Arc::clone(&self.factory),
            settings,
        );
        self.transition(RunState::Running);

        tokio::pin!(shutdown);
        let aborted = tokio::select! {
            result = self.crawl(&mut poller, &queue, &ctx) => {
                if let Err(e) = result {
                    let message = format!("Exception occurred scraping site: {e}");
                    log::error!("{}", message);
                    ctx.fail(message);
                }
                false
            }
            _ = &mut shutdown => {
                log::warn!("Termination requested, stopping workers");
                true
            }
        };

        if aborted || ctx.has_failed() {
            self.transition(RunState::Aborting);
        }

        self.transition(RunState::Draining);
        for _ in 0..pool.size() {
            queue.push_stop();
        }
        pool.join(&ctx).await;

        self.transition(RunState::Reporting);
        let stats = ctx.stats.snapshot();
        log::info!(
            "Stats - Pages Scraped: {}, New Pages: {}, Updated Pages: {}, Invalidations: {}, Updated-at Pages: {}",
            stats.pages_scraped,
            stats.pages_new,
            stats.pages_updated,
            stats.invalidations,
            stats.updated_at_pages
        );
        if let Err(e) = self.publish(&stats).await {
            return Err(match ctx.error() {
                Some(run_error) => {
                    AppError::Run(format!("{run_error}; heartbeat failed: {e}"))
                }
                None => e,
            });
        }

        self.transition(RunState::Done);
        Ok(RunReport {
            run_id: self.run_id.clone(),
            stats,
            error: ctx.error().map(str::to_string),
            aborted,
            final_state: self.state,
        })
    }

    async fn crawl(
        &self,
        poller: &mut FeedPoller,
        queue: &WorkQueue,
        ctx: &RunContext,
    ) -> Result<()> {
        let base = self.config.source.base()?;
        for path in &self.static_paths {
            queue.push_page(Band::Initial, PageJob::new(static_url(&base, path)?, None));
        }
        if !self.static_paths.is_empty() {
            log::info!("Queued {} static files", self.static_paths.len());
        }

        poller.initial_pass(queue).await?;

        let interval = self.config.crawler.poll_interval();
        while !queue.is_empty() && !ctx.has_failed() {
            poller.poll_updates(queue, &ctx.stats).await?;
            tokio::time::sleep(interval).await;
        }
        Ok(())
    }

    /// Publish run stats and the heartbeat. Only a failed heartbeat is
    /// an error; stats failures are logged.
    async fn publish(&self, stats: &StatsSnapshot) -> Result<()> {
        let settings = &self.config.metrics;
        if !settings.publish_stats && !settings.heartbeat {
            return Ok(());
        }
        let Some(sink) = &self.metrics else {
            log::warn!("Metrics enabled but no metrics sink configured");
            return Ok(());
        };

        if settings.publish_stats {
            match sink.put_counts(&stats.metrics()).await {
                Ok(()) => log::info!("Published run stats"),
                Err(e) => log::error!("Exception publishing stats: {}", e),
            }
        }

        if settings.heartbeat {
            sink.heartbeat().await.map_err(|e| {
                log::error!("Exception sending heartbeat: {}", e);
                e
            })?;
            log::info!("Heartbeat sent");
        }
        Ok(())
    }
}
