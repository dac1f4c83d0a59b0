//! Logging setup for applications embedding the control point
//!
//! The library only emits `tracing` events. Applications that want them
//! printed call [`init_logging`] once at startup.

use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Logging mode for different use cases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingMode {
    /// No subscriber is installed
    Silent,
    /// Compact stderr output
    Development,
    /// Verbose output with thread ids and source locations
    Debug,
    /// One JSON object per line, for log shippers
    Json,
}

/// Logging configuration error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),

    #[error("Invalid environment variable: {0}")]
    InvalidEnv(String),
}

/// Initialize logging with the specified mode
///
/// # Environment Variables
///
/// - `UPNP_LOG_LEVEL`: override the level (error, warn, info, debug, trace)
/// - `UPNP_LOG_TARGET`: restrict output to one target, e.g. `upnp_control::eventing`
///
/// `RUST_LOG` is honored when `UPNP_LOG_LEVEL` is unset.
///
/// ```rust,ignore
/// upnp_control::logging::init_logging(LoggingMode::Development)?;
/// ```
pub fn init_logging(mode: LoggingMode) -> Result<(), LoggingError> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    match mode {
        LoggingMode::Silent => Ok(()),
        LoggingMode::Development => {
            let filter = create_env_filter("info")?;
            Registry::default()
                .with(
                    fmt::layer()
                        .with_target(false)
                        .with_thread_ids(false)
                        .compact(),
                )
                .with(filter)
                .try_init()
                .map_err(|e| LoggingError::TracingInit(e.to_string()))
        }
        LoggingMode::Debug => {
            let filter = create_env_filter("debug")?;
            Registry::default()
                .with(
                    fmt::layer()
                        .pretty()
                        .with_thread_ids(true)
                        .with_file(true)
                        .with_line_number(true),
                )
                .with(filter)
                .try_init()
                .map_err(|e| LoggingError::TracingInit(e.to_string()))
        }
        LoggingMode::Json => {
            let filter = create_env_filter("info")?;
            Registry::default()
                .with(fmt::layer().json().with_current_span(false))
                .with(filter)
                .try_init()
                .map_err(|e| LoggingError::TracingInit(e.to_string()))
        }
    }
}

/// Initialize logging from `UPNP_LOG_MODE` (`silent`, `development`,
/// `debug`, `json`). Defaults to silent.
pub fn init_logging_from_env() -> Result<(), LoggingError> {
    let mode = match std::env::var("UPNP_LOG_MODE") {
        Ok(value) => parse_mode(&value)?,
        Err(_) => LoggingMode::Silent,
    };
    init_logging(mode)
}

fn parse_mode(value: &str) -> Result<LoggingMode, LoggingError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "silent" => Ok(LoggingMode::Silent),
        "development" | "dev" => Ok(LoggingMode::Development),
        "debug" => Ok(LoggingMode::Debug),
        "json" => Ok(LoggingMode::Json),
        other => Err(LoggingError::InvalidEnv(format!("UPNP_LOG_MODE={}", other))),
    }
}

fn create_env_filter(default_level: &str) -> Result<EnvFilter, LoggingError> {
    let level = std::env::var("UPNP_LOG_LEVEL").ok();
    let target = std::env::var("UPNP_LOG_TARGET").ok();
    filter_directive(level.as_deref(), target.as_deref(), default_level)
}

fn filter_directive(
    level: Option<&str>,
    target: Option<&str>,
    default_level: &str,
) -> Result<EnvFilter, LoggingError> {
    let directive = match (level, target) {
        (level, Some(target)) => format!("{}={}", target, level.unwrap_or(default_level)),
        (Some(level), None) => level.to_string(),
        (None, None) => match std::env::var("RUST_LOG") {
            Ok(rust_log) => rust_log,
            Err(_) => default_level.to_string(),
        },
    };
    EnvFilter::try_new(&directive)
        .map_err(|e| LoggingError::InvalidEnv(format!("{}: {}", directive, e)))
}

/// Check if a global subscriber has already been installed
pub fn is_initialized() -> bool {
    tracing::dispatcher::has_been_set()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_mode() {
        assert!(init_logging(LoggingMode::Silent).is_ok());
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode("JSON").unwrap(), LoggingMode::Json);
        assert_eq!(parse_mode("dev").unwrap(), LoggingMode::Development);
        assert!(matches!(parse_mode("loud"), Err(LoggingError::InvalidEnv(_))));
    }

    #[test]
    fn test_target_directive() {
        let filter = filter_directive(Some("trace"), Some("upnp_control::eventing"), "info").unwrap();
        assert_eq!(filter.to_string(), "upnp_control::eventing=trace");
    }

    #[test]
    fn test_invalid_level_is_rejected() {
        assert!(filter_directive(Some("upnp=verbose"), None, "info").is_err());
    }
}
