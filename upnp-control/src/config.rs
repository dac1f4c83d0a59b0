//! Configuration for the control point
//!
//! Settings can be built in code, loaded from a JSON file, or discovered at
//! startup with [`ControlPointConfig::load`]:
//!
//! 1. the file named by `UPNP_CONTROL_CONFIG`, if set
//! 2. `<config dir>/upnp-control/config.json`, if it exists
//! 3. built-in defaults
//!
//! Any field missing from a file keeps its default value.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ControlPointError, Result};

/// Environment variable naming an explicit configuration file
pub const CONFIG_ENV_VAR: &str = "UPNP_CONTROL_CONFIG";

/// Top-level control point configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlPointConfig {
    /// Default deadline for an action invocation
    /// Default: 30 seconds
    pub invoke_timeout_secs: u64,

    /// Deadline for fetching one description document
    /// Default: 10 seconds
    pub fetch_timeout_secs: u64,

    /// Lease requested in SUBSCRIBE
    /// Default: 1800 seconds (30 minutes)
    pub subscription_lease_secs: u64,

    /// Renew a lease once it is this close to expiry
    /// Default: 300 seconds
    pub renewal_margin_secs: u64,

    /// How often the renewal timer checks leases
    /// Default: 30 seconds
    pub renewal_check_interval_secs: u64,

    /// Port range for the callback server
    /// Default: (3400, 3500)
    pub callback_port_range: (u16, u16),

    /// Maximum number of cached directory objects
    /// Default: 1024
    pub object_cache_capacity: usize,

    /// Lifetime of a cached directory object
    /// Default: 300 seconds
    pub object_cache_ttl_secs: u64,
}

impl Default for ControlPointConfig {
    fn default() -> Self {
        Self {
            invoke_timeout_secs: 30,
            fetch_timeout_secs: 10,
            subscription_lease_secs: 1800,
            renewal_margin_secs: 300,
            renewal_check_interval_secs: 30,
            callback_port_range: (3400, 3500),
            object_cache_capacity: 1024,
            object_cache_ttl_secs: 300,
        }
    }
}

impl ControlPointConfig {
    /// Load configuration from the environment, the user config directory,
    /// or defaults, in that order
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            tracing::debug!(%path, "loading config from {}", CONFIG_ENV_VAR);
            return Self::from_json_file(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => Self::from_json_file(path),
            _ => Ok(Self::default()),
        }
    }

    /// `<config dir>/upnp-control/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("upnp-control").join("config.json"))
    }

    /// Read and validate a JSON configuration file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ControlPointError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| ControlPointError::Config(format!("Invalid config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that cannot work together
    pub fn validate(&self) -> Result<()> {
        let (start, end) = self.callback_port_range;
        if start > end {
            return Err(ControlPointError::Config(format!(
                "Empty callback port range {}..={}",
                start, end
            )));
        }
        if self.subscription_lease_secs == 0 {
            return Err(ControlPointError::Config("Subscription lease must be positive".into()));
        }
        if self.renewal_margin_secs >= self.subscription_lease_secs {
            return Err(ControlPointError::Config(format!(
                "Renewal margin {}s must be shorter than the lease {}s",
                self.renewal_margin_secs, self.subscription_lease_secs
            )));
        }
        if self.renewal_check_interval_secs == 0 {
            return Err(ControlPointError::Config("Renewal check interval must be positive".into()));
        }
        if self.invoke_timeout_secs == 0 || self.fetch_timeout_secs == 0 {
            return Err(ControlPointError::Config("Timeouts must be positive".into()));
        }
        Ok(())
    }

    pub fn invoke_timeout(&self) -> Duration {
        Duration::from_secs(self.invoke_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn object_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.object_cache_ttl_secs)
    }

    /// Eventing settings derived from this configuration
    pub fn subscription_config(&self) -> SubscriptionConfig {
        SubscriptionConfig {
            lease: Duration::from_secs(self.subscription_lease_secs),
            renewal_margin: Duration::from_secs(self.renewal_margin_secs),
            check_interval: Duration::from_secs(self.renewal_check_interval_secs),
            callback_port_range: self.callback_port_range,
        }
    }
}

/// Settings for the subscription manager and its renewal timer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionConfig {
    pub lease: Duration,
    pub renewal_margin: Duration,
    pub check_interval: Duration,
    pub callback_port_range: (u16, u16),
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        ControlPointConfig::default().subscription_config()
    }
}
