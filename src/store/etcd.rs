//! etcd coordination store

use crate::config::RegistrarConfig;
use crate::error::RegistrarError;
use crate::RegistrarResult;
use crate::store::trait_def::{CoordinationStore, LeaseId};
use async_trait::async_trait;
use etcd_client::{Client, ConnectOptions, DeleteOptions, LeaseGrantOptions, PutOptions};
use std::time::Duration as StdDuration;
use tracing::{debug, info};

/// etcd client wrapper
#[derive(Clone)]
pub struct EtcdStore {
    client: Client,
}

impl EtcdStore {
    /// Connect to etcd and verify that the cluster answers
    pub async fn connect(config: &RegistrarConfig) -> RegistrarResult<Self> {
        let connect_options = ConnectOptions::new()
            .with_connect_timeout(config.connect_timeout())
            .with_timeout(config.connect_timeout())
            .with_keep_alive(StdDuration::from_secs(30), StdDuration::from_secs(10));

        let mut client = Client::connect(&config.endpoints, Some(connect_options))
            .await
            .map_err(|e| {
                RegistrarError::ConnectionError(format!(
                    "Failed to connect to etcd {:?}: {}",
                    config.endpoints, e
                ))
            })?;

        // The channel is established lazily; a status call proves an endpoint is reachable.
        let status = tokio::time::timeout(config.connect_timeout(), client.status())
            .await
            .map_err(|_| {
                RegistrarError::ConnectionError(format!(
                    "etcd {:?} did not answer within {:?}",
                    config.endpoints,
                    config.connect_timeout()
                ))
            })?
            .map_err(|e| {
                RegistrarError::ConnectionError(format!(
                    "etcd {:?} is unreachable: {}",
                    config.endpoints, e
                ))
            })?;

        info!(
            "Connected to etcd {:?} (server version {})",
            config.endpoints,
            status.version()
        );
        Ok(Self { client })
    }
}

#[async_trait]
impl CoordinationStore for EtcdStore {
    async fn put(&self, key: &str, value: &str, ttl_secs: u64) -> RegistrarResult<LeaseId> {
        let ttl = i64::try_from(ttl_secs).map_err(|_| {
            RegistrarError::Configuration(format!("lease TTL {}s is out of range", ttl_secs))
        })?;

        // etcd_client::Client is a cheap handle over a shared channel
        let mut client = self.client.clone();

        let lease_grant = client
            .lease_grant(ttl, Some(LeaseGrantOptions::new()))
            .await
            .map_err(|e| RegistrarError::Store(format!("Failed to create etcd lease: {}", e)))?;
        let lease_id = lease_grant.id();

        let put_options = PutOptions::new().with_lease(lease_id);
        client
            .put(key, value, Some(put_options))
            .await
            .map_err(|e| RegistrarError::Store(format!("Failed to put {} in etcd: {}", key, e)))?;

        debug!("Put {} in etcd (lease: {}, ttl: {}s)", key, lease_id, ttl);
        Ok(lease_id)
    }

    async fn delete(&self, key: &str) -> RegistrarResult<()> {
        let mut client = self.client.clone();

        let response = client
            .delete(key, Some(DeleteOptions::new()))
            .await
            .map_err(|e| {
                RegistrarError::Store(format!("Failed to delete {} from etcd: {}", key, e))
            })?;

        debug!("Deleted {} from etcd ({} keys removed)", key, response.deleted());
        Ok(())
    }
}
