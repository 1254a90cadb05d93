use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{ObjectInfo, ObjectStore, PutObject, StorageError};

/// Per-operation call counts, for asserting which I/O a code path performed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CallCounts {
    pub gets: usize,
    pub puts: usize,
    pub heads: usize,
    pub presigns: usize,
    pub lists: usize,
}

/// In-memory object store with call counters and failure injection.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<(String, String), PutObject>>,
    gets: AtomicUsize,
    puts: AtomicUsize,
    heads: AtomicUsize,
    presigns: AtomicUsize,
    lists: AtomicUsize,
    fail_puts: AtomicBool,
    fail_gets: AtomicBool,
    get_delay: Mutex<Option<Duration>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without counting it as a put.
    pub fn insert(&self, bucket: &str, key: &str, object: PutObject) {
        self.lock()
            .insert((bucket.to_string(), key.to_string()), object);
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<PutObject> {
        self.lock()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.object(bucket, key).is_some()
    }

    pub fn remove(&self, bucket: &str, key: &str) -> Option<PutObject> {
        self.lock().remove(&(bucket.to_string(), key.to_string()))
    }

    pub fn calls(&self) -> CallCounts {
        CallCounts {
            gets: self.gets.load(Ordering::SeqCst),
            puts: self.puts.load(Ordering::SeqCst),
            heads: self.heads.load(Ordering::SeqCst),
            presigns: self.presigns.load(Ordering::SeqCst),
            lists: self.lists.load(Ordering::SeqCst),
        }
    }

    /// Make every subsequent put fail with [`StorageError::Write`].
    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent get fail with a backend (transient) error.
    pub fn set_fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    /// Delay every subsequent get, to exercise deadlines.
    pub fn set_get_delay(&self, delay: Option<Duration>) {
        *self
            .get_delay
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = delay;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<(String, String), PutObject>> {
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let delay = *self
            .get_delay
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(StorageError::Backend {
                key: key.to_string(),
                message: "injected read failure".to_string(),
            });
        }
        self.object(bucket, key)
            .map(|o| o.body)
            .ok_or_else(|| StorageError::NotFound {
                key: key.to_string(),
            })
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        object: PutObject,
    ) -> Result<(), StorageError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StorageError::Write {
                key: key.to_string(),
                message: "injected write failure".to_string(),
            });
        }
        self.insert(bucket, key, object);
        Ok(())
    }

    async fn head_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<ObjectInfo>, StorageError> {
        self.heads.fetch_add(1, Ordering::SeqCst);
        Ok(self.object(bucket, key).map(|o| ObjectInfo {
            key: key.to_string(),
            size: o.body.len() as u64,
            content_type: Some(o.content_type),
            cache_control: o.cache_control,
        }))
    }

    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, StorageError> {
        self.presigns.fetch_add(1, Ordering::SeqCst);
        Ok(format!(
            "memory://{}/{}?expires_in={}",
            bucket,
            key,
            expires_in.as_secs()
        ))
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<ObjectInfo>, StorageError> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .lock()
            .iter()
            .filter(|((b, k), _)| b == bucket && k.starts_with(prefix))
            .map(|((_, k), o)| ObjectInfo {
                key: k.clone(),
                size: o.body.len() as u64,
                content_type: Some(o.content_type.clone()),
                cache_control: o.cache_control.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counts_and_failure_injection() {
        let store = MemoryStore::new();
        let obj = PutObject {
            body: b"x".to_vec(),
            content_type: "image/png".into(),
            cache_control: None,
        };
        store.insert("b", "k.png", obj.clone());
        assert_eq!(store.calls(), CallCounts::default());

        assert_eq!(store.get_object("b", "k.png").await.unwrap(), b"x");
        store.set_fail_puts(true);
        assert!(store.put_object("b", "k2.png", obj).await.is_err());
        assert!(!store.contains("b", "k2.png"));

        let calls = store.calls();
        assert_eq!((calls.gets, calls.puts), (1, 1));
    }

    #[tokio::test]
    async fn test_presign_existing_counts_head_and_presign() {
        let store = MemoryStore::new();
        assert!(store
            .presign_existing("b", "missing.jpg", Duration::from_secs(60))
            .await
            .unwrap_err()
            .is_not_found());
        let calls = store.calls();
        assert_eq!((calls.heads, calls.presigns), (1, 0));
    }
}
