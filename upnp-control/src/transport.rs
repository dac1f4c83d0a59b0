//! Network seams for action invocation and event subscription
//!
//! [`SoapClient`] implements both traits; tests plug in counting mocks.

use std::time::Duration;

use soap_client::{ActionCall, SoapClient};

use crate::error::Result;

/// One action call ready to go on the wire
#[derive(Debug, Clone)]
pub struct ActionRequest<'a> {
    pub control_url: &'a str,
    pub service_type: &'a str,
    pub action: &'a str,
    /// In-arguments in declaration order
    pub arguments: &'a [(String, String)],
    pub timeout: Option<Duration>,
}

pub trait ControlTransport: Send + Sync {
    /// Perform the call, returning out-arguments in document order
    fn invoke(&self, request: &ActionRequest<'_>) -> Result<Vec<(String, String)>>;
}

/// A granted subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub sid: String,
    pub duration: Duration,
}

pub trait EventTransport: Send + Sync {
    fn subscribe(&self, event_url: &str, callback_url: &str, lease: Duration) -> Result<Lease>;

    /// Renew `sid`, returning the newly granted lease
    fn renew(&self, event_url: &str, sid: &str, lease: Duration) -> Result<Duration>;

    fn unsubscribe(&self, event_url: &str, sid: &str) -> Result<()>;
}

impl ControlTransport for SoapClient {
    fn invoke(&self, request: &ActionRequest<'_>) -> Result<Vec<(String, String)>> {
        let call = ActionCall {
            control_url: request.control_url,
            service_type: request.service_type,
            action: request.action,
            arguments: request.arguments,
            timeout: request.timeout,
        };
        Ok(self.call_action(&call)?)
    }
}

impl EventTransport for SoapClient {
    fn subscribe(&self, event_url: &str, callback_url: &str, lease: Duration) -> Result<Lease> {
        let response = SoapClient::subscribe(self, event_url, callback_url, lease_seconds(lease))?;
        Ok(Lease {
            sid: response.sid,
            duration: Duration::from_secs(u64::from(response.timeout_seconds)),
        })
    }

    fn renew(&self, event_url: &str, sid: &str, lease: Duration) -> Result<Duration> {
        let granted = self.renew_subscription(event_url, sid, lease_seconds(lease))?;
        Ok(Duration::from_secs(u64::from(granted)))
    }

    fn unsubscribe(&self, event_url: &str, sid: &str) -> Result<()> {
        Ok(SoapClient::unsubscribe(self, event_url, sid)?)
    }
}

fn lease_seconds(lease: Duration) -> u32 {
    u32::try_from(lease.as_secs()).unwrap_or(u32::MAX).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_seconds_saturates() {
        assert_eq!(lease_seconds(Duration::from_secs(1800)), 1800);
        assert_eq!(lease_seconds(Duration::from_millis(10)), 1);
        assert_eq!(lease_seconds(Duration::from_secs(u64::MAX)), u32::MAX);
    }

    #[test]
    fn test_soap_client_subscribe_through_trait() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("SUBSCRIBE", "/evt")
            .match_header("TIMEOUT", "Second-600")
            .with_status(200)
            .with_header("SID", "uuid:sub-1")
            .with_header("TIMEOUT", "Second-300")
            .create();

        let client = SoapClient::new();
        let transport: &dyn EventTransport = &client;
        let lease = transport
            .subscribe(&format!("{}/evt", server.url()), "http://10.0.0.1:3400/", Duration::from_secs(600))
            .unwrap();
        assert_eq!(lease.sid, "uuid:sub-1");
        assert_eq!(lease.duration, Duration::from_secs(300));
        mock.assert();
    }
}
