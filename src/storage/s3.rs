//! AWS S3 object store.
//!
//! Pages are written with a `public-read` ACL and the mirror's content hash
//! in user metadata; change detection reads it back with a head request.

use aws_sdk_s3::Client;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::storage::{ObjectHead, ObjectStore, StoredObject};

/// S3-backed object store for one bucket.
#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    /// Create a new S3 store instance.
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Create an S3 store from a loaded SDK configuration.
    pub fn from_conf(sdk_config: &aws_config::SdkConfig, bucket: impl Into<String>) -> Self {
        Self::new(Client::new(sdk_config), bucket)
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn head(&self, key: &str) -> Result<Option<ObjectHead>> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(output) => Ok(Some(ObjectHead {
                metadata: output.metadata().cloned().unwrap_or_default(),
                e_tag: output.e_tag().map(str::to_string),
            })),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_not_found() {
                    Ok(None)
                } else {
                    Err(AppError::store(format!(
                        "head s3://{}/{}: {}",
                        self.bucket,
                        key,
                        DisplayErrorContext(&service_err)
                    )))
                }
            }
        }
    }

    async fn put(&self, object: StoredObject) -> Result<()> {
        let size = object.body.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&object.key)
            .body(ByteStream::from(object.body))
            .content_type(&object.content_type)
            .acl(ObjectCannedAcl::PublicRead)
            .set_metadata(Some(object.metadata))
            .send()
            .await
            .map_err(|e| {
                AppError::store(format!(
                    "put s3://{}/{}: {}",
                    self.bucket,
                    object.key,
                    DisplayErrorContext(&e)
                ))
            })?;

        log::debug!("Wrote {} bytes to s3://{}/{}", size, self.bucket, object.key);
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| {
                AppError::store(format!("list s3://{}: {}", self.bucket, DisplayErrorContext(&e)))
            })?;
            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );
        }

        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                AppError::store(format!(
                    "delete s3://{}/{}: {}",
                    self.bucket,
                    key,
                    DisplayErrorContext(&e)
                ))
            })?;

        log::info!("Deleted s3://{}/{}", self.bucket, key);
        Ok(())
    }

    fn location(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }
}
