use soap_client::SoapError;
use thiserror::Error;
use upnp_discovery::DiscoveryError;

/// Errors raised by the control point
///
/// Each variant corresponds to one failure class with its own handling rule:
/// discovery parse errors are dropped by the listener, description failures
/// are surfaced while discovery continues, and validation failures never
/// reach the network.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ControlPointError {
    /// An announcement could not be interpreted
    #[error("Malformed announcement: {0}")]
    DiscoveryParse(#[from] DiscoveryError),

    /// No candidate URL yielded a usable description
    #[error("Could not resolve description from {urls:?}: {reason}")]
    DescriptionResolution { urls: Vec<String>, reason: String },

    /// An argument is undeclared or violates its state variable's constraints
    ///
    /// Raised before any network traffic.
    #[error("Invalid argument {argument} for {action}: {reason}")]
    ArgumentValidation {
        action: String,
        argument: String,
        reason: String,
    },

    /// The service does not declare the action
    #[error("Action {action} is not implemented by {service_type}")]
    ActionNotImplemented { service_type: String, action: String },

    /// The device answered with a UPnP fault
    #[error("UPnP fault {code}: {description}")]
    ControlFault { code: u32, description: String },

    /// The device did not answer in time
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Connection-level failure other than a timeout
    #[error("Network error: {0}")]
    Network(String),

    /// The device was verified off-network; the proxy is disposed
    #[error("Device {0} is gone")]
    DeviceGone(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Subscription error: {0}")]
    Subscription(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ControlPointError {
    /// Whether retrying later could succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Network(_))
    }

    pub fn is_device_gone(&self) -> bool {
        matches!(self, Self::DeviceGone(_))
    }

    pub(crate) fn resolution(urls: &[String], reason: impl Into<String>) -> Self {
        Self::DescriptionResolution {
            urls: urls.to_vec(),
            reason: reason.into(),
        }
    }
}

impl From<SoapError> for ControlPointError {
    fn from(error: SoapError) -> Self {
        match error {
            SoapError::Network(msg) => Self::Network(msg),
            SoapError::Timeout(msg) => Self::Timeout(msg),
            SoapError::Parse(msg) => Self::Parse(msg),
            SoapError::Fault { code, description } => Self::ControlFault { code, description },
            SoapError::Status(status) => Self::Network(format!("HTTP status {}", status)),
        }
    }
}

/// Type alias for results that can return a ControlPointError
pub type Result<T> = std::result::Result<T, ControlPointError>;
