// src/services/metrics.rs

//! Metrics sink for run statistics and the liveness heartbeat.

use async_trait::async_trait;

use crate::error::Result;

/// Metric name of the liveness heartbeat.
pub const HEARTBEAT_METRIC: &str = "heartbeat";

/// Value published for every heartbeat.
pub const HEARTBEAT_VALUE: u64 = 1;

/// Destination for named counters.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Publish counters in one request.
    async fn put_counts(&self, metrics: &[(&str, u64)]) -> Result<()>;

    /// Publish the fixed heartbeat value.
    async fn heartbeat(&self) -> Result<()> {
        self.put_counts(&[(HEARTBEAT_METRIC, HEARTBEAT_VALUE)]).await
    }
}

#[cfg(feature = "aws")]
pub use cloudwatch::CloudWatchSink;

#[cfg(feature = "aws")]
mod cloudwatch {
    use aws_sdk_cloudwatch::Client;
    use aws_sdk_cloudwatch::error::DisplayErrorContext;
    use aws_sdk_cloudwatch::types::{MetricDatum, StandardUnit};
    use async_trait::async_trait;

    use super::MetricsSink;
    use crate::error::{AppError, Result};

    /// Publishes `Count` metrics under one CloudWatch namespace.
    #[derive(Clone)]
    pub struct CloudWatchSink {
        client: Client,
        namespace: String,
    }

    impl CloudWatchSink {
        pub fn new(client: Client, namespace: impl Into<String>) -> Self {
            Self {
                client,
                namespace: namespace.into(),
            }
        }

        pub fn from_conf(sdk_config: &aws_config::SdkConfig, namespace: impl Into<String>) -> Self {
            Self::new(Client::new(sdk_config), namespace)
        }
    }

    #[async_trait]
    impl MetricsSink for CloudWatchSink {
        async fn put_counts(&self, metrics: &[(&str, u64)]) -> Result<()> {
            let data = metrics
                .iter()
                .map(|(name, value)| {
                    MetricDatum::builder()
                        .metric_name(*name)
                        .value(*value as f64)
                        .unit(StandardUnit::Count)
                        .build()
                })
                .collect();

            self.client
                .put_metric_data()
                .namespace(&self.namespace)
                .set_metric_data(Some(data))
                .send()
                .await
                .map_err(|e| AppError::metrics(DisplayErrorContext(&e)))?;
            Ok(())
        }
    }
}
