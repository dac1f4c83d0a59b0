//! Error types for the SOAP client

use thiserror::Error;

/// Errors that can occur during SOAP and GENA communication
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SoapError {
    /// Network or HTTP transport error other than a timeout
    #[error("Network/HTTP error: {0}")]
    Network(String),

    /// The request did not complete before its deadline
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// XML parsing error
    #[error("XML parsing error: {0}")]
    Parse(String),

    /// UPnP fault returned by the device
    #[error("SOAP fault {code}: {description}")]
    Fault {
        /// Remote UPnP error code
        code: u32,
        /// Remote human-readable description
        description: String,
    },

    /// Non-success HTTP status without a decodable fault body
    #[error("HTTP status {0}")]
    Status(u16),
}

impl SoapError {
    /// Whether this error is a deadline expiry rather than a hard failure
    pub fn is_timeout(&self) -> bool {
        matches!(self, SoapError::Timeout(_))
    }
}
