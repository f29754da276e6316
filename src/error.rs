//! Error types for the bootstrap agent

use thiserror::Error;

use crate::pki::PkiError;

/// Main error type for bootstrap operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// No local interface, address or route matched
    #[error("resolution error: {0}")]
    Resolution(String),

    /// Input could not be parsed (route table rows, PEM payloads)
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// An object the agent created is no longer present
    #[error("not found: {0}")]
    NotFound(String),

    /// An object with the same name already exists in the cluster
    #[error("conflict: {0}")]
    Conflict(String),

    /// A wait exceeded its deadline
    #[error("timeout: {0}")]
    Timeout(String),

    /// A wait was interrupted by shutdown
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Key or CSR generation failed
    #[error("pki error: {0}")]
    Pki(#[from] PkiError),

    /// Invalid runtime configuration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Issuance state moved backwards or out of a terminal state
    #[error("invalid issuance transition: {0}")]
    InvalidTransition(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a resolution error with the given message
    pub fn resolution(msg: impl Into<String>) -> Self {
        Self::Resolution(msg.into())
    }

    /// Create a malformed input error with the given message
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedInput(msg.into())
    }

    /// Create a not found error with the given message
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a conflict error with the given message
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create a timeout error with the given message
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a cancellation error with the given message
    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Create a configuration error with the given message
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Whether retrying the same call may succeed.
    ///
    /// Only name conflicts qualify: a concurrent run for the same host
    /// releases its request object when it finishes.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }
}

impl From<crate::retry::Cancelled> for Error {
    fn from(e: crate::retry::Cancelled) -> Self {
        Self::Cancelled(e.to_string())
    }
}
