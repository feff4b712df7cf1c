//! Service registrar - self-registration of service instances in etcd
//!
//! A [`Registrar`] publishes a [`ServiceDescriptor`] under
//! `<prefix>/<name>/<address>:<port>` with a TTL lease, re-publishes it on a
//! fixed interval from a background task, and deletes it on
//! [`Registrar::unregister`].

pub mod config;
pub mod error;
pub mod net;
pub mod registrar;
pub mod store;
pub mod types;

/// Registrar version
pub const REGISTRAR_VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-export main types for convenience
pub use config::RegistrarConfig;
pub use error::RegistrarError;
pub use registrar::Registrar;
pub use store::{CoordinationStore, EtcdStore, LeaseId, MemoryStore};
pub use types::ServiceDescriptor;

/// Result type for registrar operations
pub type RegistrarResult<T> = Result<T, RegistrarError>;

/// Default etcd endpoint
pub const DEFAULT_ENDPOINT: &str = "http://localhost:2379";

/// Default lease TTL in seconds
pub const DEFAULT_LEASE_TTL_SECS: u64 = 10;

/// Default renewal interval in seconds
pub const DEFAULT_RENEWAL_INTERVAL_SECS: u64 = 5;
