//! Local filesystem object store.
//!
//! Mirrors the site into a directory for development and for hosting
//! without S3. Object metadata lives in a hidden sidecar tree so change
//! detection behaves the same as against a bucket.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! ├── index.html                 # Mirrored objects, keyed by path
//! ├── services/water/index.html
//! └── .meta/                     # Sidecar metadata, one JSON per key
//!     └── services/water/index.html.json
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::storage::{ObjectHead, ObjectStore, StoredObject};
use crate::utils::md5_hex;

const META_DIR: &str = ".meta";
const TMP_SUFFIX: &str = ".tmp";

/// Sidecar record written next to every object.
#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    content_type: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root_dir: PathBuf,
}

impl LocalStore {
    /// Create a new LocalStore rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Get the full path for a key, rejecting keys that escape the root.
    fn path(&self, key: &str) -> Result<PathBuf> {
        if key.split('/').any(|segment| segment == "..") {
            return Err(AppError::store(format!("key escapes store root: {key}")));
        }
        Ok(self.root_dir.join(key))
    }

    fn sidecar_path(&self, key: &str) -> Result<PathBuf> {
        self.path(&format!("{META_DIR}/{key}.json"))
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    ///
    /// Every write gets its own temp file, so concurrent writes of one key
    /// never share it; the last rename wins.
    async fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
        Self::ensure_dir(path).await?;

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(format!(".{}{}", Uuid::new_v4().simple(), TMP_SUFFIX));
        let tmp = PathBuf::from(tmp);

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Read bytes, returning None if the file doesn't exist.
    async fn read_bytes(path: &Path) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn remove_if_exists(path: &Path) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Io(e)),
        }
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn head(&self, key: &str) -> Result<Option<ObjectHead>> {
        let Some(body) = Self::read_bytes(&self.path(key)?).await? else {
            return Ok(None);
        };

        match Self::read_bytes(&self.sidecar_path(key)?).await? {
            Some(bytes) => {
                let sidecar: Sidecar = serde_json::from_slice(&bytes)?;
                Ok(Some(ObjectHead {
                    metadata: sidecar.metadata,
                    e_tag: None,
                }))
            }
            // Files copied in by hand: behave like a single-part upload ETag.
            None => Ok(Some(ObjectHead {
                metadata: HashMap::new(),
                e_tag: Some(format!("\"{}\"", md5_hex(&body))),
            })),
        }
    }

    async fn put(&self, object: StoredObject) -> Result<()> {
        let path = self.path(&object.key)?;
        Self::write_bytes(&path, &object.body).await?;

        let sidecar = Sidecar {
            content_type: object.content_type,
            metadata: object.metadata,
        };
        let bytes = serde_json::to_vec_pretty(&sidecar)?;
        Self::write_bytes(&self.sidecar_path(&object.key)?, &bytes).await?;

        log::debug!("Wrote {}", path.display());
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut pending = vec![self.root_dir.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(AppError::Io(e)),
            };

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    if dir == self.root_dir && entry.file_name() == META_DIR {
                        continue;
                    }
                    pending.push(path);
                    continue;
                }
                // Leftover from an interrupted write
                if entry.file_name().to_string_lossy().ends_with(TMP_SUFFIX) {
                    continue;
                }

                if let Ok(relative) = path.strip_prefix(&self.root_dir) {
                    let key = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        Self::remove_if_exists(&self.path(key)?).await?;
        Self::remove_if_exists(&self.sidecar_path(key)?).await
    }

    fn location(&self, key: &str) -> String {
        self.root_dir.join(key).display().to_string()
    }
}
