// src/services/detector.rs

//! Change detection.
//!
//! A page is hashed (MD5, matching single-part S3 ETags) after stripping the
//! per-request nonce tokens the CMS embeds in HTML, then compared with the
//! hash stored alongside the previous upload.

use regex::Regex;

use crate::error::Result;
use crate::services::fetcher::HTML_MIME;
use crate::storage::ObjectStore;
use crate::utils::md5_hex;

/// Per-request token that varies between fetches of identical content.
pub const NONCE_PATTERN: &str = r#""nonce":"[a-f0-9]{10}""#;

/// How a page compares to what the store already holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// No previous object, or no previous hash
    New,
    /// Previous hash differs
    Updated { previous: String },
    /// Previous hash matches; nothing to write
    Unchanged,
}

/// Classification plus the hash that should be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub change: Change,
    pub hash: String,
}

impl Classification {
    pub fn is_new(&self) -> bool {
        self.change == Change::New
    }

    pub fn is_updated(&self) -> bool {
        matches!(self.change, Change::Updated { .. })
    }

    /// Whether the object needs to be written.
    pub fn needs_write(&self) -> bool {
        self.change != Change::Unchanged
    }
}

/// Computes content hashes and classifies pages against the store.
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    nonce: Regex,
}

impl ChangeDetector {
    pub fn new() -> Result<Self> {
        Ok(Self {
            nonce: Regex::new(NONCE_PATTERN)?,
        })
    }

    /// Canonical hash of a body. HTML is hashed with nonces removed.
    pub fn content_hash(&self, body: &[u8], mime: &str) -> String {
        if mime == HTML_MIME {
            let text = String::from_utf8_lossy(body);
            let stripped = self.nonce.replace_all(&text, "");
            md5_hex(stripped.as_bytes())
        } else {
            md5_hex(body)
        }
    }

    /// Classify a page as new, updated or unchanged.
    pub async fn classify(
        &self,
        key: &str,
        body: &[u8],
        mime: &str,
        store: &dyn ObjectStore,
    ) -> Result<Classification> {
        let hash = self.content_hash(body, mime);
        let previous = store.head(key).await?.and_then(|head| head.content_hash());

        let change = match previous {
            None => Change::New,
            Some(previous) if previous != hash => Change::Updated { previous },
            Some(_) => Change::Unchanged,
        };

        Ok(Classification { change, hash })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, StoredObject};

    const PAGE_A: &str = r#"<script>var cfg = {"nonce":"0a1b2c3d4e","x":1};</script><p>Hi</p>"#;
    const PAGE_B: &str = r#"<script>var cfg = {"nonce":"ffee998877","x":1};</script><p>Hi</p>"#;

    #[test]
    fn test_nonce_does_not_change_hash() {
        let detector = ChangeDetector::new().unwrap();
        assert_eq!(
            detector.content_hash(PAGE_A.as_bytes(), "text/html"),
            detector.content_hash(PAGE_B.as_bytes(), "text/html")
        );
    }

    #[test]
    fn test_nonce_only_stripped_for_html() {
        let detector = ChangeDetector::new().unwrap();
        assert_ne!(
            detector.content_hash(PAGE_A.as_bytes(), "application/json"),
            detector.content_hash(PAGE_B.as_bytes(), "application/json")
        );
    }

    #[test]
    fn test_nonce_pattern_is_exact() {
        let detector = ChangeDetector::new().unwrap();
        // 11 hex characters is not a nonce token
        let long = r#"{"nonce":"0a1b2c3d4e5"}"#;
        let other = r#"{"nonce":"0a1b2c3d4e6"}"#;
        assert_ne!(
            detector.content_hash(long.as_bytes(), "text/html"),
            detector.content_hash(other.as_bytes(), "text/html")
        );
    }

    #[tokio::test]
    async fn test_classify_new_updated_unchanged() {
        let detector = ChangeDetector::new().unwrap();
        let store = MemoryStore::new();

        let first = detector
            .classify("a/index.html", b"one", "text/html", &store)
            .await
            .unwrap();
        assert!(first.is_new());

        store
            .put(StoredObject::with_hash(
                "a/index.html",
                "text/html",
                b"one".to_vec(),
                first.hash.clone(),
            ))
            .await
            .unwrap();

        let same = detector
            .classify("a/index.html", b"one", "text/html", &store)
            .await
            .unwrap();
        assert_eq!(same.change, Change::Unchanged);
        assert!(!same.needs_write());

        let changed = detector
            .classify("a/index.html", b"two", "text/html", &store)
            .await
            .unwrap();
        assert!(changed.is_updated());
        assert_eq!(
            changed.change,
            Change::Updated {
                previous: first.hash
            }
        );
    }

    #[tokio::test]
    async fn test_classify_falls_back_to_etag() {
        let detector = ChangeDetector::new().unwrap();
        let store = MemoryStore::new();
        store.insert_legacy("logo.png", b"png".to_vec(), &md5_hex(b"png"));

        let result = detector
            .classify("logo.png", b"png", "image/png", &store)
            .await
            .unwrap();
        assert_eq!(result.change, Change::Unchanged);
    }
}
