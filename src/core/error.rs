//! Error types for device, catalog, batch and poll operations

use super::network::NetworkError;
use thiserror::Error;

/// Result alias used throughout the core
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Unknown point name
    #[error("Unknown point name: {0}")]
    NotFound(String),

    /// Controller did not answer
    #[error("No response from controller: {0}")]
    Unreachable(String),

    /// Write rejected by the controller
    #[error("Write access denied: {0}")]
    AccessDenied(String),

    /// Poll re-configuration outside the defined transitions
    #[error("Polling configuration conflict: {0}")]
    ConfigurationConflict(String),

    /// Invalid argument (e.g. zero batch size)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Controller answered with something the core cannot interpret
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Negative response from the controller
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The point outlived the device it belongs to
    #[error("Point {0} is no longer attached to a device")]
    Detached(String),

    /// Polling needs a running tokio runtime
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl Error {
    /// Check whether the error only means the controller is currently offline
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

impl From<NetworkError> for Error {
    fn from(err: NetworkError) -> Self {
        match err {
            NetworkError::Unreachable(msg) => Self::Unreachable(msg),
            NetworkError::AccessDenied(msg) => Self::AccessDenied(msg),
            NetworkError::Protocol(msg) => Self::Protocol(msg),
        }
    }
}
