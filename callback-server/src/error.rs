use thiserror::Error;

/// Errors raised while starting or stopping the callback server
#[derive(Debug, Error)]
pub enum CallbackError {
    /// Every port in the configured range is taken
    #[error("No available port in range {start}..={end}")]
    NoAvailablePort { start: u16, end: u16 },

    /// The advertised address could not be determined
    #[error("Could not determine a local IP address for callbacks")]
    NoLocalAddress,

    /// The server task ended before signalling readiness
    #[error("Callback server failed to start")]
    StartupFailed,

    /// The server task did not shut down cleanly
    #[error("Callback server shutdown failed: {0}")]
    Shutdown(String),
}
