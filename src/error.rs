//! Error types for the service registrar

use thiserror::Error;

/// Error type for registrar operations
#[derive(Error, Debug)]
pub enum RegistrarError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("Already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Registration error: {0}")]
    RegistrationError(String),

    #[error("Renewal error: {0}")]
    RenewalError(String),

    #[error("Unregistration error: {0}")]
    UnregistrationError(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for RegistrarError {
    fn from(err: serde_json::Error) -> Self {
        RegistrarError::Serialization(err.to_string())
    }
}
