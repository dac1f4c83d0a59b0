//! HTTP-level tests for the SOAP and GENA client against a mock server.

use soap_client::{ActionCall, SoapClient, SoapError};
use std::net::TcpListener;
use std::time::Duration;

const RENDERING_CONTROL: &str = "urn:schemas-upnp-org:service:RenderingControl:1";

#[test]
fn test_call_action_returns_out_arguments_in_order() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/RenderingControl/Control")
        .match_header(
            "soapaction",
            "\"urn:schemas-upnp-org:service:RenderingControl:1#GetVolume\"",
        )
        .with_status(200)
        .with_header("content-type", "text/xml; charset=\"utf-8\"")
        .with_body(
            r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body>
                <u:GetVolumeResponse xmlns:u="urn:schemas-upnp-org:service:RenderingControl:1">
                    <CurrentVolume>42</CurrentVolume>
                    <Extra>x</Extra>
                </u:GetVolumeResponse>
            </s:Body></s:Envelope>"#,
        )
        .create();

    let client = SoapClient::new();
    let url = format!("{}/RenderingControl/Control", server.url());
    let args = vec![
        ("InstanceID".to_string(), "0".to_string()),
        ("Channel".to_string(), "Master".to_string()),
    ];
    let out = client
        .call_action(&ActionCall {
            control_url: &url,
            service_type: RENDERING_CONTROL,
            action: "GetVolume",
            arguments: &args,
            timeout: None,
        })
        .unwrap();

    mock.assert();
    assert_eq!(
        out,
        vec![
            ("CurrentVolume".to_string(), "42".to_string()),
            ("Extra".to_string(), "x".to_string())
        ]
    );
}

#[test]
fn test_http_500_fault_is_decoded() {
    let mut server = mockito::Server::new();
    let _mock = server
        .mock("POST", "/ctl")
        .with_status(500)
        .with_body(
            r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body><s:Fault>
                <faultcode>s:Client</faultcode><faultstring>UPnPError</faultstring>
                <detail><UPnPError xmlns="urn:schemas-upnp-org:control-1-0">
                    <errorCode>402</errorCode><errorDescription>Invalid Args</errorDescription>
                </UPnPError></detail>
            </s:Fault></s:Body></s:Envelope>"#,
        )
        .create();

    let client = SoapClient::new();
    let url = format!("{}/ctl", server.url());
    let err = client
        .call_action(&ActionCall {
            control_url: &url,
            service_type: RENDERING_CONTROL,
            action: "SetVolume",
            arguments: &[],
            timeout: None,
        })
        .unwrap_err();

    assert_eq!(
        err,
        SoapError::Fault {
            code: 402,
            description: "Invalid Args".to_string()
        }
    );
}

#[test]
fn test_http_error_without_fault_body() {
    let mut server = mockito::Server::new();
    let _mock = server.mock("POST", "/ctl").with_status(404).create();

    let client = SoapClient::new();
    let url = format!("{}/ctl", server.url());
    let err = client
        .call_action(&ActionCall {
            control_url: &url,
            service_type: RENDERING_CONTROL,
            action: "GetMute",
            arguments: &[],
            timeout: None,
        })
        .unwrap_err();

    assert_eq!(err, SoapError::Status(404));
}

#[test]
fn test_unresponsive_device_is_reported_as_timeout() {
    // Accepts connections via the backlog but never answers
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/ctl", listener.local_addr().unwrap());

    let client = SoapClient::new();
    let err = client
        .call_action(&ActionCall {
            control_url: &url,
            service_type: RENDERING_CONTROL,
            action: "GetVolume",
            arguments: &[],
            timeout: Some(Duration::from_millis(200)),
        })
        .unwrap_err();

    assert!(err.is_timeout(), "expected timeout, got {:?}", err);
    drop(listener);
}

#[test]
fn test_subscribe_renew_unsubscribe() {
    let mut server = mockito::Server::new();
    let subscribe = server
        .mock("SUBSCRIBE", "/evt")
        .match_header("nt", "upnp:event")
        .match_header("callback", "<http://10.0.0.2:3400/notify>")
        .with_status(200)
        .with_header("SID", "uuid:sub-1")
        .with_header("TIMEOUT", "Second-300")
        .create();
    let renew = server
        .mock("SUBSCRIBE", "/evt")
        .match_header("sid", "uuid:sub-1")
        .with_status(200)
        .with_header("TIMEOUT", "Second-600")
        .create();
    let unsubscribe = server
        .mock("UNSUBSCRIBE", "/evt")
        .match_header("sid", "uuid:sub-1")
        .with_status(200)
        .create();

    let client = SoapClient::new();
    let url = format!("{}/evt", server.url());

    let response = client
        .subscribe(&url, "http://10.0.0.2:3400/notify", 1800)
        .unwrap();
    assert_eq!(response.sid, "uuid:sub-1");
    assert_eq!(response.timeout_seconds, 300);

    assert_eq!(client.renew_subscription(&url, "uuid:sub-1", 1800).unwrap(), 600);
    client.unsubscribe(&url, "uuid:sub-1").unwrap();

    subscribe.assert();
    renew.assert();
    unsubscribe.assert();
}

#[test]
fn test_subscribe_without_sid_is_parse_error() {
    let mut server = mockito::Server::new();
    let _mock = server.mock("SUBSCRIBE", "/evt").with_status(200).create();

    let client = SoapClient::new();
    let url = format!("{}/evt", server.url());
    match client.subscribe(&url, "http://cb", 1800).unwrap_err() {
        SoapError::Parse(msg) => assert!(msg.contains("SID")),
        other => panic!("Expected SoapError::Parse, got {:?}", other),
    }
}
