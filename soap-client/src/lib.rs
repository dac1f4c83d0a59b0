//! Private SOAP client for UPnP device communication
//!
//! This crate provides a minimal SOAP client for invoking UPnP actions against
//! a service control URL. It also supports UPnP event subscriptions using the
//! GENA SUBSCRIBE/UNSUBSCRIBE methods.
//!
//! Transport failures are classified so that callers can tell a deadline
//! expiry ([`SoapError::Timeout`]) apart from every other network failure.

mod error;

pub use error::SoapError;

use std::time::Duration;
use xmltree::{Element, XMLNode};

/// Response from a UPnP subscription request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionResponse {
    /// Subscription ID returned by the device
    pub sid: String,
    /// Actual timeout granted by the device (in seconds)
    pub timeout_seconds: u32,
}

/// A single action invocation
#[derive(Debug, Clone)]
pub struct ActionCall<'a> {
    /// Absolute control URL of the service
    pub control_url: &'a str,
    /// Service type URN, e.g. `urn:schemas-upnp-org:service:ContentDirectory:1`
    pub service_type: &'a str,
    /// Action name
    pub action: &'a str,
    /// In-arguments in declaration order
    pub arguments: &'a [(String, String)],
    /// Per-call deadline overriding the agent default
    pub timeout: Option<Duration>,
}

/// A minimal SOAP client for UPnP device communication
#[derive(Debug, Clone)]
pub struct SoapClient {
    agent: ureq::Agent,
}

impl SoapClient {
    /// Create a new SOAP client with default configuration
    pub fn new() -> Self {
        Self::with_timeouts(Duration::from_secs(5), Duration::from_secs(30))
    }

    /// Create a client with explicit connect and read timeouts
    pub fn with_timeouts(connect: Duration, read: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout_connect(connect)
                .timeout_read(read)
                .build(),
        }
    }

    /// Invoke an action and return its out-arguments in document order
    pub fn call_action(&self, call: &ActionCall<'_>) -> Result<Vec<(String, String)>, SoapError> {
        let body = build_envelope(call.service_type, call.action, call.arguments);
        let soap_action = format!("\"{}#{}\"", call.service_type, call.action);

        tracing::debug!(
            control_url = call.control_url,
            action = call.action,
            "sending SOAP request"
        );

        let mut request = self
            .agent
            .post(call.control_url)
            .set("Content-Type", "text/xml; charset=\"utf-8\"")
            .set("SOAPACTION", &soap_action);
        if let Some(timeout) = call.timeout {
            request = request.timeout(timeout);
        }

        let xml_text = match request.send_string(&body) {
            Ok(response) => response.into_string().map_err(classify_io)?,
            Err(ureq::Error::Status(status, response)) => {
                // UPnP faults travel as HTTP 500 with a SOAP body
                let text = response.into_string().unwrap_or_default();
                return Err(match Element::parse(text.as_bytes()) {
                    Ok(xml) => match extract_fault(&xml) {
                        Some(fault) => fault,
                        None => SoapError::Status(status),
                    },
                    Err(_) => SoapError::Status(status),
                });
            }
            Err(ureq::Error::Transport(transport)) => return Err(classify_transport(&transport)),
        };

        let xml =
            Element::parse(xml_text.as_bytes()).map_err(|e| SoapError::Parse(e.to_string()))?;
        let response = extract_response(&xml, call.action)?;

        Ok(response
            .children
            .iter()
            .filter_map(XMLNode::as_element)
            .map(|arg| {
                (
                    arg.name.clone(),
                    arg.get_text().map(|t| t.into_owned()).unwrap_or_default(),
                )
            })
            .collect())
    }

    /// Subscribe to UPnP events for a service
    ///
    /// # Arguments
    /// * `event_url` - Absolute event subscription URL of the service
    /// * `callback_url` - URL where notifications should be sent
    /// * `timeout_seconds` - Requested subscription lease in seconds
    pub fn subscribe(
        &self,
        event_url: &str,
        callback_url: &str,
        timeout_seconds: u32,
    ) -> Result<SubscriptionResponse, SoapError> {
        let response = self
            .agent
            .request("SUBSCRIBE", event_url)
            .set("CALLBACK", &format!("<{}>", callback_url))
            .set("NT", "upnp:event")
            .set("TIMEOUT", &format!("Second-{}", timeout_seconds))
            .call()
            .map_err(classify)?;

        let sid = response
            .header("SID")
            .ok_or_else(|| SoapError::Parse("Missing SID header in SUBSCRIBE response".to_string()))?
            .to_string();

        let granted = response
            .header("TIMEOUT")
            .and_then(parse_timeout_header)
            .unwrap_or(timeout_seconds);

        Ok(SubscriptionResponse {
            sid,
            timeout_seconds: granted,
        })
    }

    /// Renew an existing subscription, returning the granted lease in seconds
    pub fn renew_subscription(
        &self,
        event_url: &str,
        sid: &str,
        timeout_seconds: u32,
    ) -> Result<u32, SoapError> {
        let response = self
            .agent
            .request("SUBSCRIBE", event_url)
            .set("SID", sid)
            .set("TIMEOUT", &format!("Second-{}", timeout_seconds))
            .call()
            .map_err(classify)?;

        Ok(response
            .header("TIMEOUT")
            .and_then(parse_timeout_header)
            .unwrap_or(timeout_seconds))
    }

    /// Cancel a subscription
    pub fn unsubscribe(&self, event_url: &str, sid: &str) -> Result<(), SoapError> {
        self.agent
            .request("UNSUBSCRIBE", event_url)
            .set("SID", sid)
            .call()
            .map_err(classify)?;
        Ok(())
    }
}

impl Default for SoapClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the SOAP envelope for an action call
pub fn build_envelope(service_type: &str, action: &str, arguments: &[(String, String)]) -> String {
    let mut payload = String::new();
    for (name, value) in arguments {
        payload.push_str(&format!("<{name}>{}</{name}>", escape_xml(value)));
    }

    format!(
        r#"<?xml version="1.0" encoding="utf-8"?><s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/"><s:Body><u:{action} xmlns:u="{service_type}">{payload}</u:{action}></s:Body></s:Envelope>"#
    )
}

/// Escape text content for inclusion in an XML element
pub fn escape_xml(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

/// Parse a `Second-N` header value; `infinite` maps to `u32::MAX`
fn parse_timeout_header(value: &str) -> Option<u32> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("infinite") || value.eq_ignore_ascii_case("Second-infinite") {
        return Some(u32::MAX);
    }
    value
        .get(..7)
        .filter(|prefix| prefix.eq_ignore_ascii_case("Second-"))
        .and_then(|_| value[7..].trim().parse::<u32>().ok())
}

fn classify(error: ureq::Error) -> SoapError {
    match error {
        ureq::Error::Status(status, _) => SoapError::Status(status),
        ureq::Error::Transport(transport) => classify_transport(&transport),
    }
}

fn classify_transport(transport: &ureq::Transport) -> SoapError {
    use std::error::Error as _;

    let timed_out = match transport
        .source()
        .and_then(|source| source.downcast_ref::<std::io::Error>())
    {
        Some(io) => is_timeout_kind(io.kind()),
        None => transport.to_string().to_ascii_lowercase().contains("timed out"),
    };

    if timed_out {
        SoapError::Timeout(transport.to_string())
    } else {
        SoapError::Network(transport.to_string())
    }
}

fn classify_io(error: std::io::Error) -> SoapError {
    if is_timeout_kind(error.kind()) {
        SoapError::Timeout(error.to_string())
    } else {
        SoapError::Network(error.to_string())
    }
}

fn is_timeout_kind(kind: std::io::ErrorKind) -> bool {
    matches!(
        kind,
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
    )
}

fn extract_fault(xml: &Element) -> Option<SoapError> {
    let fault = xml.get_child("Body")?.get_child("Fault")?;
    let upnp_error = fault
        .get_child("detail")
        .and_then(|d| d.get_child("UPnPError").or_else(|| d.get_child("UpnPError")));

    let code = upnp_error
        .and_then(|e| e.get_child("errorCode"))
        .and_then(|c| c.get_text())
        .and_then(|t| t.trim().parse::<u32>().ok())
        .unwrap_or(500);

    let description = upnp_error
        .and_then(|e| e.get_child("errorDescription"))
        .and_then(|d| d.get_text())
        .or_else(|| fault.get_child("faultstring").and_then(|f| f.get_text()))
        .map(|t| t.trim().to_string())
        .unwrap_or_default();

    Some(SoapError::Fault { code, description })
}

fn extract_response<'a>(xml: &'a Element, action: &str) -> Result<&'a Element, SoapError> {
    let body = xml
        .get_child("Body")
        .ok_or_else(|| SoapError::Parse("Missing SOAP Body".to_string()))?;

    if let Some(fault) = extract_fault(xml) {
        return Err(fault);
    }

    let response_name = format!("{}Response", action);
    body.get_child(response_name.as_str())
        .ok_or_else(|| SoapError::Parse(format!("Missing {} element", response_name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_build_envelope_orders_and_escapes_arguments() {
        let args = vec![
            ("ObjectID".to_string(), "0".to_string()),
            ("Filter".to_string(), "dc:title,<res>&".to_string()),
        ];
        let envelope = build_envelope("urn:schemas-upnp-org:service:ContentDirectory:1", "Browse", &args);

        assert!(envelope.contains(r#"<u:Browse xmlns:u="urn:schemas-upnp-org:service:ContentDirectory:1">"#));
        let object_pos = envelope.find("<ObjectID>0</ObjectID>").unwrap();
        let filter_pos = envelope.find("<Filter>dc:title,&lt;res&gt;&amp;</Filter>").unwrap();
        assert!(object_pos < filter_pos);
    }

    #[rstest]
    #[case("Second-1800", Some(1800))]
    #[case("second-300", Some(300))]
    #[case("infinite", Some(u32::MAX))]
    #[case("Second-abc", None)]
    #[case("1800", None)]
    fn test_parse_timeout_header(#[case] input: &str, #[case] expected: Option<u32>) {
        assert_eq!(parse_timeout_header(input), expected);
    }

    #[test]
    fn test_extract_response_with_valid_response() {
        let xml_str = r#"
            <s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
                <s:Body>
                    <u:GetVolumeResponse xmlns:u="urn:schemas-upnp-org:service:RenderingControl:1">
                        <CurrentVolume>25</CurrentVolume>
                    </u:GetVolumeResponse>
                </s:Body>
            </s:Envelope>
        "#;

        let xml = Element::parse(xml_str.as_bytes()).unwrap();
        let response = extract_response(&xml, "GetVolume").unwrap();
        assert_eq!(response.name, "GetVolumeResponse");
    }

    #[test]
    fn test_extract_response_with_upnp_fault() {
        let xml_str = r#"
            <s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
                <s:Body>
                    <s:Fault>
                        <faultcode>s:Client</faultcode>
                        <faultstring>UPnPError</faultstring>
                        <detail>
                            <UPnPError xmlns="urn:schemas-upnp-org:control-1-0">
                                <errorCode>701</errorCode>
                                <errorDescription>No such object</errorDescription>
                            </UPnPError>
                        </detail>
                    </s:Fault>
                </s:Body>
            </s:Envelope>
        "#;

        let xml = Element::parse(xml_str.as_bytes()).unwrap();
        match extract_response(&xml, "Browse").unwrap_err() {
            SoapError::Fault { code, description } => {
                assert_eq!(code, 701);
                assert_eq!(description, "No such object");
            }
            other => panic!("Expected SoapError::Fault, got {:?}", other),
        }
    }

    #[test]
    fn test_fault_without_detail_uses_default_code() {
        let xml_str = r#"
            <s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
                <s:Body>
                    <s:Fault>
                        <faultcode>s:Server</faultcode>
                        <faultstring>Internal Error</faultstring>
                    </s:Fault>
                </s:Body>
            </s:Envelope>
        "#;

        let xml = Element::parse(xml_str.as_bytes()).unwrap();
        assert_eq!(
            extract_fault(&xml),
            Some(SoapError::Fault {
                code: 500,
                description: "Internal Error".to_string()
            })
        );
    }

    #[test]
    fn test_extract_response_missing_body() {
        let xml_str = r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"></s:Envelope>"#;

        let xml = Element::parse(xml_str.as_bytes()).unwrap();
        match extract_response(&xml, "Play").unwrap_err() {
            SoapError::Parse(msg) => assert!(msg.contains("Missing SOAP Body")),
            other => panic!("Expected SoapError::Parse, got {:?}", other),
        }
    }

    #[test]
    fn test_extract_response_missing_action_response() {
        let xml_str = r#"
            <s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
                <s:Body></s:Body>
            </s:Envelope>
        "#;

        let xml = Element::parse(xml_str.as_bytes()).unwrap();
        match extract_response(&xml, "Play").unwrap_err() {
            SoapError::Parse(msg) => assert!(msg.contains("Missing PlayResponse element")),
            other => panic!("Expected SoapError::Parse, got {:?}", other),
        }
    }

    #[test]
    fn test_timeout_error_kinds() {
        assert!(is_timeout_kind(std::io::ErrorKind::TimedOut));
        assert!(is_timeout_kind(std::io::ErrorKind::WouldBlock));
        assert!(!is_timeout_kind(std::io::ErrorKind::ConnectionRefused));
        assert!(SoapError::Timeout("x".into()).is_timeout());
        assert!(!SoapError::Network("x".into()).is_timeout());
    }
}
