use std::time::Duration;

use crate::error::{ControlPointError, Result};

/// Source of description documents
///
/// The control point fetches over HTTP; tests substitute an in-memory map.
pub trait DescriptionFetcher: Send + Sync {
    /// Fetch the document at `url` as text
    fn fetch(&self, url: &str) -> Result<String>;
}

/// Blocking HTTP fetcher
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ControlPointError::Network(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl DescriptionFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<String> {
        tracing::debug!(url = %url, "fetching description");

        let response = self.client.get(url).send().map_err(classify)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ControlPointError::Network(format!(
                "GET {} returned HTTP {}",
                url,
                status.as_u16()
            )));
        }
        response.text().map_err(classify)
    }
}

fn classify(error: reqwest::Error) -> ControlPointError {
    if error.is_timeout() {
        ControlPointError::Timeout(error.to_string())
    } else {
        ControlPointError::Network(error.to_string())
    }
}
