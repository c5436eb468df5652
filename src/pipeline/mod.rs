//! Mirror run pipeline.
//!
//! - `RunCoordinator`: one incremental mirror run, feed to store
//! - `Pruner`: deletes stored objects the site no longer publishes

pub mod backends;
pub mod context;
pub mod feed;
pub mod prune;
pub mod queue;
pub mod run;
pub mod shutdown;
pub mod sync;
pub mod worker;

pub use backends::{BackendFactory, SharedBackends, WorkerBackends};
#[cfg(feature = "aws")]
pub use backends::AwsBackends;
pub use context::RunContext;
pub use feed::FeedPoller;
pub use prune::{PruneReport, Pruner};
pub use queue::WorkQueue;
pub use run::{RunCoordinator, RunReport, RunState};
pub use shutdown::termination_signal;
pub use sync::PageSyncer;
pub use worker::{WorkerPool, WorkerSettings};
