//! Coordination store trait definition

use crate::RegistrarResult;
use async_trait::async_trait;

/// Identifier of the lease a record was attached to
pub type LeaseId = i64;

/// Key-value store with TTL leases that registrations are published to.
///
/// Implementations must be safe to call concurrently from the caller and from
/// the renewal task.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Write `value` at `key`, attached to a lease that expires after `ttl_secs`
    async fn put(&self, key: &str, value: &str, ttl_secs: u64) -> RegistrarResult<LeaseId>;

    /// Remove `key`
    async fn delete(&self, key: &str) -> RegistrarResult<()>;
}
