//! Object store abstractions for mirrored pages.
//!
//! Every mirrored URL maps to one object keyed by its path (see
//! [`crate::utils::url::object_key`]). Objects carry the content hash the
//! mirror computed when it last wrote them, under [`HASH_METADATA_KEY`].
//!
//! ## Backends
//!
//! ```text
//! S3Store      # production: head/put/list/delete against a bucket
//! LocalStore   # directory mirror with a hidden metadata sidecar tree
//! MemoryStore  # in-process map, used by tests and embedders
//! ```

pub mod local;
pub mod memory;
#[cfg(feature = "aws")]
pub mod s3;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;

// Re-export for convenience
pub use local::LocalStore;
pub use memory::MemoryStore;
#[cfg(feature = "aws")]
pub use s3::S3Store;

/// Metadata field holding the mirror's own content hash.
pub const HASH_METADATA_KEY: &str = "scraper_md5";

/// What a head lookup returns for an existing object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectHead {
    /// User metadata stored with the object
    pub metadata: HashMap<String, String>,
    /// Store-computed checksum, quotes included as the store returns it
    pub e_tag: Option<String>,
}

impl ObjectHead {
    /// Previously stored content hash.
    ///
    /// Prefers the mirror's metadata field. Falls back to the store checksum
    /// for objects written before that field existed. The checksum is not a
    /// content hash for multi-part uploads, hence the preference.
    pub fn content_hash(&self) -> Option<String> {
        self.metadata
            .get(HASH_METADATA_KEY)
            .cloned()
            .or_else(|| self.e_tag.as_ref().map(|tag| tag.trim_matches('"').to_string()))
    }
}

/// An object to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    /// Full Content-Type header value as served by the source
    pub content_type: String,
    pub body: Vec<u8>,
    pub metadata: HashMap<String, String>,
}

impl StoredObject {
    /// Build an object tagged with its content hash.
    pub fn with_hash(
        key: impl Into<String>,
        content_type: impl Into<String>,
        body: Vec<u8>,
        hash: impl Into<String>,
    ) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert(HASH_METADATA_KEY.to_string(), hash.into());
        Self {
            key: key.into(),
            content_type: content_type.into(),
            body,
            metadata,
        }
    }
}

/// Trait for durable object store backends.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Look up an object. "Not found" is `Ok(None)`, never an error.
    async fn head(&self, key: &str) -> Result<Option<ObjectHead>>;

    /// Write an object, publicly readable, replacing any previous version.
    async fn put(&self, object: StoredObject) -> Result<()>;

    /// List every key in the store.
    async fn list_keys(&self) -> Result<Vec<String>>;

    /// Delete an object. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Human-readable location of a key, for logs.
    fn location(&self, key: &str) -> String;
}
