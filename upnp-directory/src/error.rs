use thiserror::Error;
use upnp_control::ControlPointError;

/// Errors raised while browsing a content directory
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DirectoryError {
    /// Failure in the underlying action call
    #[error(transparent)]
    Control(#[from] ControlPointError),

    /// The `Result` payload is not usable DIDL-Lite
    #[error("Invalid DIDL-Lite: {0}")]
    Didl(String),

    /// An out-argument is missing or malformed
    #[error("Invalid {action} response: {reason}")]
    InvalidResponse { action: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl DirectoryError {
    /// Whether the server lacks the requested (optional) action
    pub fn is_not_implemented(&self) -> bool {
        matches!(
            self,
            Self::Control(ControlPointError::ActionNotImplemented { .. })
        )
    }

    pub fn is_device_gone(&self) -> bool {
        matches!(self, Self::Control(e) if e.is_device_gone())
    }

    pub(crate) fn response(action: &str, reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            action: action.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DirectoryError>;
