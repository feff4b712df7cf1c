//! Types for service registration

use crate::error::RegistrarError;
use crate::RegistrarResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::Ipv6Addr;

/// A discoverable service instance.
///
/// The serialized form is the value stored under [`key`](Self::key), so the
/// field order here is the field order of the published JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Logical service name
    pub name: String,

    /// Host the service listens on; resolved locally when blank
    #[serde(default)]
    pub address: String,

    /// Port the service listens on
    pub port: u16,

    /// Storage key, attached before every publish
    #[serde(default)]
    pub key: String,

    /// Service metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl ServiceDescriptor {
    /// Create a descriptor; pass an empty address to have it resolved at registration
    pub fn new(name: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            port,
            key: String::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// `address:port`, with IPv6 literals bracketed
    pub fn endpoint(&self) -> String {
        if self.address.parse::<Ipv6Addr>().is_ok() {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }

    /// Compute the storage key: `<prefix>/<name>/<address>:<port>`
    pub fn build_key(&self, prefix: &str) -> String {
        format!(
            "{}/{}/{}",
            prefix.trim_end_matches('/'),
            self.name,
            self.endpoint()
        )
    }

    /// Check the fields required for publishing
    pub fn validate(&self) -> RegistrarResult<()> {
        if self.name.trim().is_empty() {
            return Err(RegistrarError::InvalidDescriptor(
                "service name must not be empty".to_string(),
            ));
        }
        if self.address.trim().is_empty() {
            return Err(RegistrarError::InvalidDescriptor(format!(
                "no address could be resolved for service {}",
                self.name
            )));
        }
        if self.port == 0 {
            return Err(RegistrarError::InvalidDescriptor(format!(
                "port must be non-zero for service {}",
                self.name
            )));
        }
        Ok(())
    }

    /// Attach the key for `prefix` and serialize the payload
    pub(crate) fn seal(&mut self, prefix: &str) -> RegistrarResult<String> {
        self.key = self.build_key(prefix);
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_and_payload() {
        let mut descriptor = ServiceDescriptor::new("order-svc", "10.0.0.5", 8080);
        let payload = descriptor.seal("").unwrap();

        assert_eq!(descriptor.key, "/order-svc/10.0.0.5:8080");
        assert_eq!(
            payload,
            r#"{"name":"order-svc","address":"10.0.0.5","port":8080,"key":"/order-svc/10.0.0.5:8080"}"#
        );
    }

    #[test]
    fn test_key_prefix() {
        let descriptor = ServiceDescriptor::new("order-svc", "10.0.0.5", 8080);
        assert_eq!(
            descriptor.build_key("/services/"),
            "/services/order-svc/10.0.0.5:8080"
        );
        assert_eq!(
            descriptor.build_key("/services"),
            "/services/order-svc/10.0.0.5:8080"
        );
    }

    #[test]
    fn test_ipv6_endpoint_is_bracketed() {
        let descriptor = ServiceDescriptor::new("order-svc", "fd00::5", 8080);
        assert_eq!(descriptor.build_key(""), "/order-svc/[fd00::5]:8080");
    }

    #[test]
    fn test_metadata_is_serialized_when_present() {
        let mut descriptor =
            ServiceDescriptor::new("order-svc", "10.0.0.5", 8080).with_metadata("zone", "eu-1");
        let payload = descriptor.seal("").unwrap();

        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["metadata"]["zone"], "eu-1");
        assert_eq!(value["key"], "/order-svc/10.0.0.5:8080");
    }

    #[test]
    fn test_validate() {
        assert!(ServiceDescriptor::new("svc", "10.0.0.5", 80).validate().is_ok());
        assert!(matches!(
            ServiceDescriptor::new("svc", "10.0.0.5", 0).validate(),
            Err(RegistrarError::InvalidDescriptor(_))
        ));
        assert!(ServiceDescriptor::new("svc", "", 80).validate().is_err());
        assert!(ServiceDescriptor::new("", "10.0.0.5", 80).validate().is_err());
    }
}
