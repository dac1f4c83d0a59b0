//! Directory settings

use std::time::Duration;

use serde::{Deserialize, Serialize};
use upnp_control::ControlPointConfig;

use crate::error::{DirectoryError, Result};

/// Largest page a client may request
pub const MAX_PAGE_SIZE: u32 = 5000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Objects requested per Browse/Search call
    /// Default: 100
    pub page_size: u32,

    /// Property filter sent with every request
    /// Default: "*"
    pub filter: String,

    /// Default: "" (server order)
    pub sort_criteria: String,

    /// Default: 1024
    pub cache_capacity: usize,

    /// Default: 300 seconds
    pub cache_ttl_secs: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            filter: "*".to_string(),
            sort_criteria: String::new(),
            cache_capacity: 1024,
            cache_ttl_secs: 300,
        }
    }
}

impl DirectoryConfig {
    /// Take the cache settings from the control point configuration
    pub fn from_control_point(config: &ControlPointConfig) -> Self {
        Self {
            cache_capacity: config.object_cache_capacity,
            cache_ttl_secs: config.object_cache_ttl_secs,
            ..Self::default()
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(DirectoryError::Config(format!(
                "Page size {} outside 1..={}",
                self.page_size, MAX_PAGE_SIZE
            )));
        }
        if self.filter.trim().is_empty() {
            return Err(DirectoryError::Config("Filter must not be empty".into()));
        }
        if self.cache_capacity == 0 {
            return Err(DirectoryError::Config("Cache capacity must be positive".into()));
        }
        Ok(())
    }
}
