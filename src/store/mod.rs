//! Coordination store backends

pub mod trait_def;
pub mod etcd;
pub mod memory;

pub use trait_def::{CoordinationStore, LeaseId};
pub use etcd::EtcdStore;
pub use memory::MemoryStore;
