// src/pipeline/backends.rs

//! Per-worker store and CDN handles.
//!
//! Every worker asks the factory for its own handles when it starts, so
//! no client is shared between workers unless the factory chooses to.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::services::Invalidator;
use crate::storage::ObjectStore;

/// Handles owned by one worker.
#[derive(Clone)]
pub struct WorkerBackends {
    pub store: Arc<dyn ObjectStore>,
    pub invalidator: Option<Arc<dyn Invalidator>>,
}

/// Creates the backend handles for a worker.
#[async_trait]
pub trait BackendFactory: Send + Sync {
    async fn connect(&self, worker_id: usize) -> Result<WorkerBackends>;
}

/// Hands every worker the same pre-built handles.
///
/// Used for the local and in-memory stores, whose handles are cheap to
/// share.
#[derive(Clone)]
pub struct SharedBackends {
    backends: WorkerBackends,
}

impl SharedBackends {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            backends: WorkerBackends {
                store,
                invalidator: None,
            },
        }
    }

    pub fn with_invalidator(mut self, invalidator: Arc<dyn Invalidator>) -> Self {
        self.backends.invalidator = Some(invalidator);
        self
    }
}

#[async_trait]
impl BackendFactory for SharedBackends {
    async fn connect(&self, _worker_id: usize) -> Result<WorkerBackends> {
        Ok(self.backends.clone())
    }
}

#[cfg(feature = "aws")]
pub use aws::AwsBackends;

#[cfg(feature = "aws")]
mod aws {
    use std::sync::Arc;

    use async_trait::async_trait;
    use aws_config::SdkConfig;

    use super::{BackendFactory, WorkerBackends};
    use crate::error::Result;
    use crate::models::{StorageBackend, StorageConfig};
    use crate::services::{CloudFrontInvalidator, Invalidator};
    use crate::storage::{LocalStore, ObjectStore, S3Store};

    /// Builds fresh S3 and CloudFront clients for each worker.
    pub struct AwsBackends {
        sdk_config: SdkConfig,
        storage: StorageConfig,
        distribution_id: Option<String>,
    }

    impl AwsBackends {
        pub fn new(
            sdk_config: SdkConfig,
            storage: StorageConfig,
            distribution_id: Option<String>,
        ) -> Self {
            Self {
                sdk_config,
                storage,
                distribution_id,
            }
        }
    }

    #[async_trait]
    impl BackendFactory for AwsBackends {
        async fn connect(&self, worker_id: usize) -> Result<WorkerBackends> {
            let store: Arc<dyn ObjectStore> = match self.storage.backend {
                StorageBackend::S3 => {
                    Arc::new(S3Store::from_conf(&self.sdk_config, &self.storage.bucket))
                }
                StorageBackend::Local => Arc::new(LocalStore::new(&self.storage.local_root)),
            };
            let invalidator = self.distribution_id.as_ref().map(|id| {
                Arc::new(CloudFrontInvalidator::from_conf(&self.sdk_config, id.clone()))
                    as Arc<dyn Invalidator>
            });

            log::debug!(
                "Worker {} connected to {}",
                worker_id,
                store.location("")
            );
            Ok(WorkerBackends { store, invalidator })
        }
    }
}
