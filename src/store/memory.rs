//! In-memory coordination store
//!
//! Keeps records in process with lease expiry measured on the tokio clock, so
//! paused-time tests observe expiry deterministically. Also used by the binary
//! for dry runs.

use crate::error::RegistrarError;
use crate::RegistrarResult;
use crate::store::trait_def::{CoordinationStore, LeaseId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
struct Record {
    value: String,
    lease_id: LeaseId,
    expires_at: Instant,
}

/// In-memory store with failure injection
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, Record>>,
    next_lease: AtomicI64,
    puts: AtomicUsize,
    deletes: AtomicUsize,
    fail_puts: AtomicBool,
    fail_deletes: AtomicBool,
    put_delay_ms: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value at `key`, unless absent or its lease expired
    pub async fn get(&self, key: &str) -> Option<String> {
        let records = self.records.read().await;
        records
            .get(key)
            .filter(|record| record.expires_at > Instant::now())
            .map(|record| record.value.clone())
    }

    /// Lease the live record at `key` is attached to
    pub async fn lease_of(&self, key: &str) -> Option<LeaseId> {
        let records = self.records.read().await;
        records
            .get(key)
            .filter(|record| record.expires_at > Instant::now())
            .map(|record| record.lease_id)
    }

    /// Number of successful puts
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Number of successful deletes
    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Make every subsequent put fail until reset
    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent delete fail until reset
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Delay applied to each put before it is written
    pub fn set_put_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.put_delay_ms.store(millis, Ordering::SeqCst);
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn put(&self, key: &str, value: &str, ttl_secs: u64) -> RegistrarResult<LeaseId> {
        let delay = self.put_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(RegistrarError::Store(format!(
                "put {} rejected: store unavailable",
                key
            )));
        }

        let lease_id = self.next_lease.fetch_add(1, Ordering::SeqCst) + 1;
        let record = Record {
            value: value.to_string(),
            lease_id,
            expires_at: Instant::now() + Duration::from_secs(ttl_secs),
        };

        self.records.write().await.insert(key.to_string(), record);
        self.puts.fetch_add(1, Ordering::SeqCst);

        debug!("Put {} in memory store (lease: {})", key, lease_id);
        Ok(lease_id)
    }

    async fn delete(&self, key: &str) -> RegistrarResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(RegistrarError::Store(format!(
                "delete {} rejected: store unavailable",
                key
            )));
        }

        self.records.write().await.remove(key);
        self.deletes.fetch_add(1, Ordering::SeqCst);

        debug!("Deleted {} from memory store", key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_record_expires_with_lease() {
        let store = MemoryStore::new();
        let lease = store.put("/svc/10.0.0.5:80", "v1", 10).await.unwrap();

        assert_eq!(store.get("/svc/10.0.0.5:80").await.as_deref(), Some("v1"));
        assert_eq!(store.lease_of("/svc/10.0.0.5:80").await, Some(lease));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(store.get("/svc/10.0.0.5:80").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_overwrites_and_extends_lease() {
        let store = MemoryStore::new();
        let first = store.put("/svc/a:1", "v1", 10).await.unwrap();

        tokio::time::advance(Duration::from_secs(8)).await;
        let second = store.put("/svc/a:1", "v2", 10).await.unwrap();
        assert_ne!(first, second);

        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(store.get("/svc/a:1").await.as_deref(), Some("v2"));
        assert_eq!(store.put_count(), 2);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = MemoryStore::new();

        store.fail_puts(true);
        assert!(matches!(
            store.put("/svc/a:1", "v", 10).await,
            Err(RegistrarError::Store(_))
        ));
        assert_eq!(store.put_count(), 0);

        store.fail_puts(false);
        store.put("/svc/a:1", "v", 10).await.unwrap();

        store.fail_deletes(true);
        assert!(store.delete("/svc/a:1").await.is_err());
        assert!(store.get("/svc/a:1").await.is_some());

        store.fail_deletes(false);
        store.delete("/svc/a:1").await.unwrap();
        assert!(store.get("/svc/a:1").await.is_none());
        assert_eq!(store.delete_count(), 1);
    }
}
