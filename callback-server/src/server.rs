//! HTTP server for receiving GENA event notifications.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};
use std::sync::Arc;
use tokio::sync::mpsc;
use warp::http::StatusCode;
use warp::Filter;

use crate::error::CallbackError;
use crate::router::{EventRouter, NotificationPayload};

/// HTTP callback server for receiving GENA `NOTIFY` requests.
///
/// The server binds to the first free port of a range and accepts `NOTIFY`
/// on any path. Notifications are validated and routed through an
/// [`EventRouter`] to a channel.
///
/// # Example
///
/// ```no_run
/// use tokio::sync::mpsc;
/// use callback_server::{CallbackServer, NotificationPayload};
///
/// #[tokio::main]
/// async fn main() {
///     let (tx, mut rx) = mpsc::unbounded_channel::<NotificationPayload>();
///
///     let server = CallbackServer::new((3400, 3500), tx)
///         .await
///         .expect("Failed to create callback server");
///
///     println!("Server listening at: {}", server.base_url());
///
///     while let Some(notification) = rx.recv().await {
///         println!("Received event for subscription: {}", notification.subscription_id);
///     }
/// }
/// ```
pub struct CallbackServer {
    port: u16,
    base_url: String,
    event_router: Arc<EventRouter>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    server_handle: Option<tokio::task::JoinHandle<()>>,
}

impl CallbackServer {
    /// Create and start a callback server, advertising the local address used
    /// for outbound traffic.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn new(
        port_range: (u16, u16),
        event_sender: mpsc::UnboundedSender<NotificationPayload>,
    ) -> Result<Self, CallbackError> {
        let local_ip = Self::detect_local_ip().ok_or(CallbackError::NoLocalAddress)?;
        Self::with_address(port_range, local_ip, event_sender).await
    }

    /// Create and start a callback server that advertises `advertised_ip` in
    /// its base URL.
    pub async fn with_address(
        port_range: (u16, u16),
        advertised_ip: IpAddr,
        event_sender: mpsc::UnboundedSender<NotificationPayload>,
    ) -> Result<Self, CallbackError> {
        let (start, end) = port_range;
        let event_router = Arc::new(EventRouter::new(event_sender));

        // Another process can take a port between the probe and the bind, so
        // keep walking the range until warp itself binds.
        let mut next = Some(start);
        while let Some(port) = next.and_then(|from| Self::find_available_port(from, end)) {
            let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
            let routes = Self::routes(event_router.clone());
            let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);

            match warp::serve(routes).try_bind_with_graceful_shutdown(bind_addr, async move {
                shutdown_rx.recv().await;
            }) {
                Ok((addr, server)) => {
                    let server_handle = tokio::spawn(server);
                    tracing::info!(%addr, "callback server listening");
                    return Ok(Self {
                        port: addr.port(),
                        base_url: format!("http://{}:{}", advertised_ip, addr.port()),
                        event_router,
                        shutdown_tx: Some(shutdown_tx),
                        server_handle: Some(server_handle),
                    });
                }
                Err(e) => {
                    tracing::debug!(port, error = %e, "callback port taken, trying next");
                    next = port.checked_add(1).filter(|p| *p <= end);
                }
            }
        }

        Err(CallbackError::NoAvailablePort { start, end })
    }

    /// Base URL advertised in `CALLBACK` headers, `http://<ip>:<port>`.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the port the server is bound to.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Router used to register and unregister subscription IDs.
    pub fn router(&self) -> &Arc<EventRouter> {
        &self.event_router
    }

    /// Shutdown the callback server gracefully, waiting for in-flight requests.
    pub async fn shutdown(mut self) -> Result<(), CallbackError> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }

        if let Some(handle) = self.server_handle.take() {
            handle
                .await
                .map_err(|e| CallbackError::Shutdown(e.to_string()))?;
        }
        tracing::debug!(port = self.port, "callback server stopped");
        Ok(())
    }

    fn find_available_port(start: u16, end: u16) -> Option<u16> {
        (start..=end).find(|&port| Self::is_port_available(port))
    }

    fn is_port_available(port: u16) -> bool {
        TcpListener::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)).is_ok()
    }

    /// Detect the local IP address that outbound traffic would use.
    ///
    /// Connecting a UDP socket only selects a route; no data is sent.
    fn detect_local_ip() -> Option<IpAddr> {
        let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
        socket.connect("8.8.8.8:80").ok()?;
        let local_addr = socket.local_addr().ok()?;
        Some(local_addr.ip())
    }

    fn routes(
        event_router: Arc<EventRouter>,
    ) -> impl Filter<Extract = impl warp::Reply, Error = std::convert::Infallible> + Clone {
        warp::method()
            .and(warp::path::full())
            .and(warp::header::optional::<String>("sid"))
            .and(warp::header::optional::<String>("nt"))
            .and(warp::header::optional::<String>("nts"))
            .and(warp::header::optional::<String>("seq"))
            .and(warp::body::bytes())
            .and_then(
                move |method: warp::http::Method,
                      path: warp::path::FullPath,
                      sid: Option<String>,
                      nt: Option<String>,
                      nts: Option<String>,
                      seq: Option<String>,
                      body: bytes::Bytes| {
                    let router = event_router.clone();
                    async move {
                        if method.as_str() != "NOTIFY" {
                            return Err(warp::reject::not_found());
                        }

                        tracing::trace!(
                            path = path.as_str(),
                            bytes = body.len(),
                            sid = ?sid,
                            seq = ?seq,
                            "incoming NOTIFY"
                        );

                        let sid = match Self::validate_gena_headers(sid, &nt, &nts) {
                            Ok(sid) => sid,
                            Err(rejection) => return Err(warp::reject::custom(rejection)),
                        };

                        let seq = seq.and_then(|s| s.trim().parse::<u32>().ok());
                        let event_xml = String::from_utf8_lossy(&body).into_owned();

                        if router.route_event(sid.clone(), seq, event_xml) {
                            Ok(warp::reply::with_status("", StatusCode::OK))
                        } else {
                            tracing::debug!(%sid, "NOTIFY for unknown subscription");
                            Err(warp::reject::custom(GenaRejection::UnknownSubscription))
                        }
                    }
                },
            )
            .recover(handle_rejection)
    }

    /// Check the GENA notification headers.
    ///
    /// A missing `SID` means the request cannot be matched to a subscription
    /// (412). `NT` and `NTS` may be omitted, but when present they must be
    /// `upnp:event` and `upnp:propchange` (400).
    fn validate_gena_headers(
        sid: Option<String>,
        nt: &Option<String>,
        nts: &Option<String>,
    ) -> Result<String, GenaRejection> {
        let sid = sid
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(GenaRejection::MissingSid)?;

        if nt.as_deref().is_some_and(|v| v.trim() != "upnp:event") {
            return Err(GenaRejection::BadHeaders);
        }
        if nts.as_deref().is_some_and(|v| v.trim() != "upnp:propchange") {
            return Err(GenaRejection::BadHeaders);
        }

        Ok(sid)
    }
}

/// Reasons a `NOTIFY` is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GenaRejection {
    MissingSid,
    BadHeaders,
    UnknownSubscription,
}

impl warp::reject::Reject for GenaRejection {}

async fn handle_rejection(
    err: warp::Rejection,
) -> Result<impl warp::Reply, std::convert::Infallible> {
    let (code, message) = match err.find::<GenaRejection>() {
        Some(GenaRejection::BadHeaders) => (StatusCode::BAD_REQUEST, "Invalid GENA headers"),
        Some(GenaRejection::MissingSid) | Some(GenaRejection::UnknownSubscription) => {
            (StatusCode::PRECONDITION_FAILED, "Unknown subscription")
        }
        None if err.is_not_found() => (StatusCode::NOT_FOUND, "Not found"),
        None => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
    };

    Ok(warp::reply::with_status(message, code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_port_available() {
        let listener = TcpListener::bind("0.0.0.0:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(!CallbackServer::is_port_available(port));
        drop(listener);
    }

    #[test]
    fn test_find_available_port() {
        let port = CallbackServer::find_available_port(51000, 51100).unwrap();
        assert!((51000..=51100).contains(&port));
    }

    #[test]
    fn test_validate_gena_headers() {
        let sid = Some("uuid:123".to_string());
        let event = Some("upnp:event".to_string());
        let propchange = Some("upnp:propchange".to_string());

        assert_eq!(
            CallbackServer::validate_gena_headers(sid.clone(), &event, &propchange),
            Ok("uuid:123".to_string())
        );
        assert_eq!(
            CallbackServer::validate_gena_headers(sid.clone(), &None, &None),
            Ok("uuid:123".to_string())
        );
        assert_eq!(
            CallbackServer::validate_gena_headers(None, &event, &propchange),
            Err(GenaRejection::MissingSid)
        );
        assert_eq!(
            CallbackServer::validate_gena_headers(Some("  ".to_string()), &None, &None),
            Err(GenaRejection::MissingSid)
        );
        assert_eq!(
            CallbackServer::validate_gena_headers(sid.clone(), &Some("wrong".to_string()), &propchange),
            Err(GenaRejection::BadHeaders)
        );
        assert_eq!(
            CallbackServer::validate_gena_headers(sid, &event, &Some("wrong".to_string())),
            Err(GenaRejection::BadHeaders)
        );
    }

    #[tokio::test]
    async fn test_callback_server_creation() {
        let (tx, _rx) = mpsc::unbounded_channel();

        let server = CallbackServer::with_address((51100, 51200), IpAddr::V4(Ipv4Addr::LOCALHOST), tx)
            .await
            .unwrap();
        assert!((51100..=51200).contains(&server.port()));
        assert_eq!(server.base_url(), format!("http://127.0.0.1:{}", server.port()));

        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_exhausted_port_range() {
        let listener = TcpListener::bind("0.0.0.0:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, _rx) = mpsc::unbounded_channel();

        let result = CallbackServer::with_address((port, port), IpAddr::V4(Ipv4Addr::LOCALHOST), tx).await;
        assert!(matches!(
            result,
            Err(CallbackError::NoAvailablePort { start, end }) if start == port && end == port
        ));
    }
}
