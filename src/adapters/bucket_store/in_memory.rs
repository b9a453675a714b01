//! In-memory bucket store for testing and development.
//!
//! Emulates TTL expiry against an injected [`Clock`] and supports fault
//! injection so error paths can be exercised without a live backend.
//! Not suitable for production multi-server deployments.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::ports::{BucketStore, BucketStoreError, Clock, SetWithExpiry};

/// A stored value and the unix second at which it expires.
#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: i64,
}

impl Entry {
    fn is_live(&self, now: i64) -> bool {
        now < self.expires_at
    }
}

/// In-memory TTL key-value store.
#[derive(Clone)]
pub struct InMemoryBucketStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    clock: Arc<dyn Clock>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
}

impl InMemoryBucketStore {
    /// Create an empty store that expires entries against `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            clock,
            fail_reads: Arc::new(AtomicBool::new(false)),
            fail_writes: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make every subsequent read (and ping) fail.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent write fail without modifying any entry.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Store a raw value, bypassing fault injection.
    pub async fn insert_raw(&self, key: &str, value: &str, ttl: Duration) {
        let expires_at = self.expiry_for(ttl);
        self.entries.write().await.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
    }

    /// Read a value without fault injection, honouring expiry.
    pub async fn peek(&self, key: &str) -> Option<String> {
        let now = self.clock.now_unix_secs();
        self.entries
            .read()
            .await
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone())
    }

    /// Number of unexpired entries.
    pub async fn len(&self) -> usize {
        let now = self.clock.now_unix_secs();
        self.entries
            .read()
            .await
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    /// Whether no unexpired entries remain.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn expiry_for(&self, ttl: Duration) -> i64 {
        let secs = ttl.as_secs().max(1) as i64;
        self.clock.now_unix_secs().saturating_add(secs)
    }

    fn check_reads(&self) -> Result<(), BucketStoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(BucketStoreError::Unavailable("injected read failure".to_string()));
        }
        Ok(())
    }

    fn check_writes(&self) -> Result<(), BucketStoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BucketStoreError::Unavailable("injected write failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BucketStore for InMemoryBucketStore {
    async fn get(&self, key: &str) -> Result<Option<String>, BucketStoreError> {
        self.check_reads()?;
        let now = self.clock.now_unix_secs();

        let mut entries = self.entries.write().await;
        let found = entries
            .get(key)
            .map(|entry| (entry.is_live(now), entry.value.clone()));
        match found {
            Some((true, value)) => Ok(Some(value)),
            Some((false, _)) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), BucketStoreError> {
        self.check_writes()?;
        self.insert_raw(key, value, ttl).await;
        Ok(())
    }

    async fn atomic_batch(&self, ops: Vec<SetWithExpiry>) -> Result<(), BucketStoreError> {
        self.check_writes()?;

        // One write guard for the whole batch keeps it indivisible.
        let mut entries = self.entries.write().await;
        for op in ops {
            let expires_at = self.expiry_for(op.ttl);
            entries.insert(
                op.key,
                Entry {
                    value: op.value,
                    expires_at,
                },
            );
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), BucketStoreError> {
        self.check_reads()
    }
}

impl std::fmt::Debug for InMemoryBucketStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBucketStore")
            .field("fail_reads", &self.fail_reads.load(Ordering::SeqCst))
            .field("fail_writes", &self.fail_writes.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
