//! Service registration with lease renewal

use crate::config::RegistrarConfig;
use crate::error::RegistrarError;
use crate::net::resolve_local_address;
use crate::store::{CoordinationStore, EtcdStore, LeaseId};
use crate::types::ServiceDescriptor;
use crate::RegistrarResult;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Publishes one service descriptor and keeps it alive until unregistered
pub struct Registrar {
    /// Registrar configuration
    config: RegistrarConfig,

    /// Coordination store, shared with the renewal task
    store: Arc<dyn CoordinationStore>,

    /// Registration currently being renewed
    active: Option<ActiveRegistration>,
}

struct ActiveRegistration {
    descriptor: ServiceDescriptor,
    shutdown_tx: mpsc::Sender<()>,
    renewal_task: JoinHandle<()>,
}

/// State owned by the renewal task
struct Renewal {
    store: Arc<dyn CoordinationStore>,
    descriptor: ServiceDescriptor,
    key_prefix: String,
    lease_ttl: Duration,
    interval: Duration,
    renewal_timeout: Duration,
}

impl Registrar {
    /// Connect to the etcd cluster named in `config`
    pub async fn connect(config: RegistrarConfig) -> RegistrarResult<Self> {
        config.validate()?;
        let store = EtcdStore::connect(&config).await?;
        Ok(Self {
            config,
            store: Arc::new(store),
            active: None,
        })
    }

    /// Create a registrar over an already established store
    pub fn with_store(
        config: RegistrarConfig,
        store: Arc<dyn CoordinationStore>,
    ) -> RegistrarResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            store,
            active: None,
        })
    }

    pub fn config(&self) -> &RegistrarConfig {
        &self.config
    }

    /// Descriptor of the active registration, with address and key filled in
    pub fn descriptor(&self) -> Option<&ServiceDescriptor> {
        self.active.as_ref().map(|active| &active.descriptor)
    }

    pub fn is_registered(&self) -> bool {
        self.active.is_some()
    }

    /// Publish `descriptor` and start renewing it in the background.
    ///
    /// A blank address is resolved from the local network. On any error the
    /// registrar is left as it was before the call.
    pub async fn register(&mut self, mut descriptor: ServiceDescriptor) -> RegistrarResult<()> {
        if let Some(active) = &self.active {
            return Err(RegistrarError::AlreadyRegistered(format!(
                "{} is still registered; unregister it first",
                active.descriptor.key
            )));
        }

        if descriptor.address.trim().is_empty() {
            descriptor.address = resolve_local_address();
        }
        descriptor.validate()?;

        let lease_id = publish(
            self.store.as_ref(),
            &mut descriptor,
            &self.config.key_prefix,
            self.config.lease_ttl_secs,
        )
        .await
        .map_err(|e| {
            error!("Failed to register service {}: {}", descriptor.key, e);
            registration_failed(&descriptor.key, e)
        })?;

        info!(
            "Service registered: {} -> {} (lease: {})",
            descriptor.key,
            descriptor.endpoint(),
            lease_id
        );

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let renewal = Renewal {
            store: self.store.clone(),
            descriptor: descriptor.clone(),
            key_prefix: self.config.key_prefix.clone(),
            lease_ttl: self.config.lease_ttl(),
            interval: self.config.renewal_interval(),
            renewal_timeout: self.config.renewal_timeout(),
        };
        let renewal_task = tokio::spawn(renewal.run(shutdown_rx));

        self.active = Some(ActiveRegistration {
            descriptor,
            shutdown_tx,
            renewal_task,
        });
        Ok(())
    }

    /// Stop renewal and delete the published record.
    ///
    /// Returns immediately when nothing is registered. The renewal task has
    /// exited before the delete is issued, so the record cannot be re-published
    /// afterwards. Each renewal is bounded by the renewal timeout, which config
    /// validation keeps below the shutdown timeout, so the join finishes before
    /// the abort fallback is reached. A failed delete is reported, but the
    /// registration is released either way.
    pub async fn unregister(&mut self) -> RegistrarResult<()> {
        let Some(active) = self.active.take() else {
            return Ok(());
        };
        let ActiveRegistration {
            descriptor,
            shutdown_tx,
            mut renewal_task,
        } = active;

        // Fails only when the task is already gone
        let _ = shutdown_tx.send(()).await;

        match tokio::time::timeout(self.config.shutdown_timeout(), &mut renewal_task).await {
            Ok(Ok(())) => debug!("Renewal task for {} stopped", descriptor.key),
            Ok(Err(e)) => warn!("Renewal task for {} ended abnormally: {}", descriptor.key, e),
            Err(_) => {
                warn!(
                    "Renewal task for {} did not stop within {:?}, aborting it",
                    descriptor.key,
                    self.config.shutdown_timeout()
                );
                renewal_task.abort();
                let _ = renewal_task.await;
            }
        }

        self.store.delete(&descriptor.key).await.map_err(|e| {
            error!("Failed to unregister service {}: {}", descriptor.key, e);
            RegistrarError::UnregistrationError(format!(
                "Failed to delete {}; the record may remain until its lease expires: {}",
                descriptor.key, e
            ))
        })?;

        info!("Service unregistered: {}", descriptor.key);
        Ok(())
    }
}

impl Drop for Registrar {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.renewal_task.abort();
            warn!(
                "Registrar dropped while {} was registered; the record will expire with its lease",
                active.descriptor.key
            );
        }
    }
}

impl Renewal {
    /// Renewal loop: re-publish on every tick until shutdown is signalled
    async fn run(mut self, mut shutdown_rx: mpsc::Receiver<()>) {
        let mut interval = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_success = Instant::now();
        let mut consecutive_failures: u32 = 0;

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!("Renewal of {} stopped", self.descriptor.key);
                    break;
                }
                _ = interval.tick() => {
                    match self.publish().await {
                        Ok(lease_id) => {
                            if consecutive_failures > 0 {
                                info!(
                                    "Renewal of {} recovered after {} failed attempts",
                                    self.descriptor.key, consecutive_failures
                                );
                            }
                            consecutive_failures = 0;
                            last_success = Instant::now();
                            debug!("Renewed {} (lease: {})", self.descriptor.key, lease_id);
                        }
                        Err(e) => {
                            consecutive_failures += 1;
                            if last_success.elapsed() >= self.lease_ttl {
                                error!(
                                    "{}; no successful renewal for {:?}, lease has likely expired ({} consecutive failures)",
                                    e, last_success.elapsed(), consecutive_failures
                                );
                            } else {
                                warn!("{}; retrying in {:?}", e, self.interval);
                            }
                        }
                    }
                }
            }
        }
    }

    /// One renewal, bounded by the renewal timeout so the task always gets
    /// back to its shutdown check before `unregister` stops waiting for it
    async fn publish(&mut self) -> RegistrarResult<LeaseId> {
        let attempt = publish(
            self.store.as_ref(),
            &mut self.descriptor,
            &self.key_prefix,
            self.lease_ttl.as_secs(),
        );
        let outcome = tokio::time::timeout(self.renewal_timeout, attempt).await;
        match outcome {
            Ok(result) => result.map_err(|e| renewal_failed(&self.descriptor.key, e)),
            Err(_) => Err(RegistrarError::RenewalError(format!(
                "Renewal of {} did not complete within {:?}",
                self.descriptor.key, self.renewal_timeout
            ))),
        }
    }
}

/// Attach the key, serialize and put the descriptor
async fn publish(
    store: &dyn CoordinationStore,
    descriptor: &mut ServiceDescriptor,
    key_prefix: &str,
    ttl_secs: u64,
) -> RegistrarResult<LeaseId> {
    let payload = descriptor.seal(key_prefix)?;
    store.put(&descriptor.key, &payload, ttl_secs).await
}

fn registration_failed(key: &str, err: RegistrarError) -> RegistrarError {
    RegistrarError::RegistrationError(format!("Failed to register {}: {}", key, err))
}

fn renewal_failed(key: &str, err: RegistrarError) -> RegistrarError {
    RegistrarError::RenewalError(format!("Failed to renew {}: {}", key, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serialization_error() -> RegistrarError {
        serde_json::from_str::<u16>("not a port").unwrap_err().into()
    }

    #[test]
    fn test_serialization_failure_is_a_registration_error() {
        let err = registration_failed("/order-svc/10.0.0.5:8080", serialization_error());
        match err {
            RegistrarError::RegistrationError(message) => {
                assert!(message.contains("/order-svc/10.0.0.5:8080"));
                assert!(message.contains("Serialization error"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_serialization_failure_is_a_renewal_error() {
        let err = renewal_failed("/order-svc/10.0.0.5:8080", serialization_error());
        assert!(matches!(err, RegistrarError::RenewalError(_)));
    }

    #[tokio::test]
    async fn test_store_failure_is_classified_per_operation() {
        let store = crate::store::MemoryStore::new();
        store.fail_puts(true);
        let mut descriptor = ServiceDescriptor::new("order-svc", "10.0.0.5", 8080);

        let err = publish(&store, &mut descriptor, "", 10).await.unwrap_err();
        assert!(matches!(err, RegistrarError::Store(_)));
        assert!(matches!(
            registration_failed(&descriptor.key, err),
            RegistrarError::RegistrationError(_)
        ));
    }
}
