//! Configuration for the service registrar

use crate::error::RegistrarError;
use crate::RegistrarResult;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Configuration for a [`Registrar`](crate::Registrar)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrarConfig {
    /// etcd endpoints
    pub endpoints: Vec<String>,

    /// Lease TTL in seconds
    pub lease_ttl_secs: u64,

    /// Renewal interval in seconds
    pub renewal_interval_secs: u64,

    /// Timeout for establishing the store session, in seconds
    pub connect_timeout_secs: u64,

    /// Upper bound on waiting for the renewal task during unregister, in seconds.
    /// Must exceed the renewal timeout (twice the connect timeout).
    pub shutdown_timeout_secs: u64,

    /// Prefix prepended to every descriptor key, e.g. `/services`
    pub key_prefix: String,
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![crate::DEFAULT_ENDPOINT.to_string()],
            lease_ttl_secs: crate::DEFAULT_LEASE_TTL_SECS,
            renewal_interval_secs: crate::DEFAULT_RENEWAL_INTERVAL_SECS,
            connect_timeout_secs: 5,
            shutdown_timeout_secs: 15,
            key_prefix: String::new(),
        }
    }
}

impl RegistrarConfig {
    /// Create a configuration for the given endpoints with default timings
    pub fn new(endpoints: Vec<String>) -> Self {
        Self {
            endpoints,
            ..Default::default()
        }
    }

    pub fn with_lease_ttl(mut self, secs: u64) -> Self {
        self.lease_ttl_secs = secs;
        self
    }

    pub fn with_renewal_interval(mut self, secs: u64) -> Self {
        self.renewal_interval_secs = secs;
        self
    }

    pub fn with_connect_timeout(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    pub fn with_shutdown_timeout(mut self, secs: u64) -> Self {
        self.shutdown_timeout_secs = secs;
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs)
    }

    pub fn renewal_interval(&self) -> Duration {
        Duration::from_secs(self.renewal_interval_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Bound on one renewal: a lease grant and a put, each limited by the
    /// store's request timeout
    pub fn renewal_timeout(&self) -> Duration {
        self.connect_timeout() * 2
    }

    /// Check the configuration before any store session is opened.
    ///
    /// A renewal interval that is not shorter than the lease TTL is accepted,
    /// but the record will expire between renewals, so it is logged.
    pub fn validate(&self) -> RegistrarResult<()> {
        if self.endpoints.is_empty() || self.endpoints.iter().all(|e| e.trim().is_empty()) {
            return Err(RegistrarError::Configuration(
                "at least one store endpoint is required".to_string(),
            ));
        }
        if self.lease_ttl_secs == 0 {
            return Err(RegistrarError::Configuration(
                "lease TTL must be greater than zero".to_string(),
            ));
        }
        if self.renewal_interval_secs == 0 {
            return Err(RegistrarError::Configuration(
                "renewal interval must be greater than zero".to_string(),
            ));
        }
        if self.shutdown_timeout() <= self.renewal_timeout() {
            return Err(RegistrarError::Configuration(format!(
                "shutdown timeout ({}s) must exceed the renewal timeout ({:?}, twice the connect timeout)",
                self.shutdown_timeout_secs,
                self.renewal_timeout()
            )));
        }
        if self.renewal_interval_secs >= self.lease_ttl_secs {
            warn!(
                "Renewal interval ({}s) is not shorter than lease TTL ({}s); the record may expire between renewals",
                self.renewal_interval_secs, self.lease_ttl_secs
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RegistrarConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.lease_ttl(), Duration::from_secs(10));
        assert_eq!(config.renewal_interval(), Duration::from_secs(5));
        assert!(config.key_prefix.is_empty());
    }

    #[test]
    fn test_empty_endpoints_rejected() {
        let config = RegistrarConfig::new(Vec::new());
        assert!(matches!(
            config.validate(),
            Err(RegistrarError::Configuration(_))
        ));

        let config = RegistrarConfig::new(vec!["  ".to_string()]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_timings_rejected() {
        let config = RegistrarConfig::default().with_lease_ttl(0);
        assert!(config.validate().is_err());

        let config = RegistrarConfig::default().with_renewal_interval(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_shutdown_timeout_must_exceed_renewal_timeout() {
        let config = RegistrarConfig::default()
            .with_connect_timeout(5)
            .with_shutdown_timeout(10);
        assert!(matches!(
            config.validate(),
            Err(RegistrarError::Configuration(_))
        ));

        let config = RegistrarConfig::default()
            .with_connect_timeout(5)
            .with_shutdown_timeout(11);
        assert!(config.validate().is_ok());
        assert_eq!(config.renewal_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_interval_not_shorter_than_ttl_is_accepted() {
        let config = RegistrarConfig::default()
            .with_lease_ttl(5)
            .with_renewal_interval(5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: RegistrarConfig = toml::from_str(
            r#"
            endpoints = ["http://etcd-0:2379", "http://etcd-1:2379"]
            lease_ttl_secs = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.endpoints.len(), 2);
        assert_eq!(config.lease_ttl_secs, 30);
        assert_eq!(config.renewal_interval_secs, 5);
        assert_eq!(config.shutdown_timeout_secs, 15);
    }
}
