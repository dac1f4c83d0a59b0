//! Error types for announcement parsing and SSDP search.

use thiserror::Error;

/// Error type for discovery operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    /// Socket creation, send or receive failed
    #[error("Network error: {0}")]
    Network(String),

    /// An SSDP datagram could not be interpreted
    #[error("Parse error: {0}")]
    Parse(String),

    /// The USN does not start with `uuid:` or has an empty identity
    #[error("Malformed USN: {0}")]
    MalformedUsn(String),
}

/// Convenience Result type alias for discovery operations.
pub type Result<T> = std::result::Result<T, DiscoveryError>;
