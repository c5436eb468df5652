//! In-memory object store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::Result;
use crate::storage::{ObjectHead, ObjectStore, StoredObject};

#[derive(Debug, Default)]
struct Inner {
    objects: Mutex<HashMap<String, (StoredObject, Option<String>)>>,
    puts: AtomicUsize,
}

/// Process-local store. Clones share the same objects.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn objects(&self) -> MutexGuard<'_, HashMap<String, (StoredObject, Option<String>)>> {
        // A panicked writer cannot leave a half-written entry behind.
        self.inner
            .objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Seed an object that only has a store checksum, like objects uploaded
    /// before the mirror started tagging its own hash.
    pub fn insert_legacy(&self, key: &str, body: Vec<u8>, e_tag: &str) {
        let object = StoredObject {
            key: key.to_string(),
            content_type: "text/html".to_string(),
            body,
            metadata: HashMap::new(),
        };
        self.objects()
            .insert(key.to_string(), (object, Some(format!("\"{e_tag}\""))));
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects().get(key).map(|(object, _)| object.clone())
    }

    pub fn len(&self) -> usize {
        self.objects().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of successful puts since creation.
    pub fn put_count(&self) -> usize {
        self.inner.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn head(&self, key: &str) -> Result<Option<ObjectHead>> {
        Ok(self.objects().get(key).map(|(object, e_tag)| ObjectHead {
            metadata: object.metadata.clone(),
            e_tag: e_tag.clone(),
        }))
    }

    async fn put(&self, object: StoredObject) -> Result<()> {
        self.objects().insert(object.key.clone(), (object, None));
        self.inner.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.objects().keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects().remove(key);
        Ok(())
    }

    fn location(&self, key: &str) -> String {
        format!("memory://{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_then_head() {
        let store = MemoryStore::new();
        assert!(store.head("a/index.html").await.unwrap().is_none());

        store
            .put(StoredObject::with_hash(
                "a/index.html",
                "text/html; charset=UTF-8",
                b"<p>hi</p>".to_vec(),
                "abc",
            ))
            .await
            .unwrap();

        let head = store.head("a/index.html").await.unwrap().unwrap();
        assert_eq!(head.content_hash().as_deref(), Some("abc"));
        assert_eq!(store.put_count(), 1);
    }

    #[tokio::test]
    async fn test_legacy_objects_expose_etag() {
        let store = MemoryStore::new();
        store.insert_legacy("old.html", b"x".to_vec(), "deadbeef");
        let head = store.head("old.html").await.unwrap().unwrap();
        assert_eq!(head.content_hash().as_deref(), Some("deadbeef"));
        assert_eq!(store.put_count(), 0);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = MemoryStore::new();
        let other = store.clone();
        other
            .put(StoredObject::with_hash("k", "text/plain", vec![], "h"))
            .await
            .unwrap();
        assert_eq!(store.list_keys().await.unwrap(), vec!["k"]);
        store.delete("k").await.unwrap();
        assert!(other.is_empty());
    }
}
