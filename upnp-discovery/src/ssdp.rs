//! SSDP message parsing and M-SEARCH.
//!
//! Parsing covers the three datagrams a control point sees: `NOTIFY`
//! (`ssdp:alive`, `ssdp:update`, `ssdp:byebye`) and unicast search responses.
//! Multicast NOTIFY reception is left to the embedding application; it feeds
//! datagrams through [`parse_message`].

use std::collections::HashMap;
use std::net::UdpSocket;
use std::time::Duration;

use crate::announcement::{Announcement, AnnouncementEvent};
use crate::error::{DiscoveryError, Result};

pub const SSDP_MULTICAST_ADDR: &str = "239.255.255.250:1900";

/// Search target matching every root device.
pub const ROOT_DEVICE: &str = "upnp:rootdevice";

/// Parse one SSDP datagram.
///
/// Returns `None` for datagrams that are not announcements (M-SEARCH from
/// other control points, unknown `NTS`, missing required headers or a
/// malformed USN). Those are dropped without error.
pub fn parse_message(text: &str) -> Option<AnnouncementEvent> {
    let mut lines = text.lines();
    let start_line = lines.next()?.trim().to_ascii_uppercase();
    let headers = parse_headers(lines);

    let event = if start_line.starts_with("NOTIFY ") {
        parse_notify(&headers)
    } else if start_line.starts_with("HTTP/") && start_line.contains(" 200") {
        parse_search_response(&headers)
    } else {
        None
    };

    if event.is_none() {
        tracing::trace!(start_line, "ignoring SSDP datagram");
    }
    event
}

fn parse_notify(headers: &HashMap<String, String>) -> Option<AnnouncementEvent> {
    let nts = headers.get("NTS")?.to_ascii_lowercase();
    let nt = headers.get("NT")?;
    let usn = headers.get("USN")?;

    match nts.as_str() {
        "ssdp:alive" | "ssdp:update" => {
            announcement(usn, nt, headers).map(AnnouncementEvent::Alive)
        }
        "ssdp:byebye" => match crate::usn::Usn::parse(usn) {
            Ok(usn) => Some(AnnouncementEvent::ByeBye {
                usn,
                notification_type: nt.clone(),
            }),
            Err(e) => {
                tracing::debug!(error = %e, "dropping byebye");
                None
            }
        },
        other => {
            tracing::trace!(nts = other, "unknown NTS value");
            None
        }
    }
}

fn parse_search_response(headers: &HashMap<String, String>) -> Option<AnnouncementEvent> {
    let st = headers.get("ST")?;
    let usn = headers.get("USN")?;
    announcement(usn, st, headers).map(AnnouncementEvent::Alive)
}

fn announcement(
    usn: &str,
    notification_type: &str,
    headers: &HashMap<String, String>,
) -> Option<Announcement> {
    let locations = locations(headers);
    if locations.is_empty() {
        tracing::trace!(usn, "announcement without LOCATION");
        return None;
    }

    let mut announcement = match Announcement::new(usn, notification_type, locations) {
        Ok(a) => a,
        Err(e) => {
            tracing::debug!(error = %e, "dropping announcement");
            return None;
        }
    };
    if let Some(max_age) = headers.get("CACHE-CONTROL").and_then(|v| parse_max_age(v)) {
        announcement = announcement.with_max_age(max_age);
    }
    if let Some(server) = headers.get("SERVER") {
        announcement = announcement.with_server(server.clone());
    }
    Some(announcement)
}

/// `LOCATION` first, then any `AL: <url><url>` alternates.
fn locations(headers: &HashMap<String, String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    if let Some(location) = headers.get("LOCATION").filter(|l| !l.is_empty()) {
        out.push(location.clone());
    }
    if let Some(al) = headers.get("AL") {
        for url in al.split(['<', '>']).map(str::trim).filter(|s| !s.is_empty()) {
            if !out.iter().any(|u| u == url) {
                out.push(url.to_string());
            }
        }
    }
    out
}

/// Extract `max-age=N` from a `CACHE-CONTROL` value.
fn parse_max_age(value: &str) -> Option<Duration> {
    value.split(',').find_map(|directive| {
        let (name, secs) = directive.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("max-age") {
            secs.trim().parse::<u64>().ok().map(Duration::from_secs)
        } else {
            None
        }
    })
}

fn parse_headers<'a>(lines: impl Iterator<Item = &'a str>) -> HashMap<String, String> {
    lines
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_ascii_uppercase(), value.trim().to_string()))
        })
        .collect()
}

/// Build an M-SEARCH request for `search_target`.
pub fn search_request(search_target: &str, mx: u32) -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: {}\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: {}\r\n\
         ST: {}\r\n\
         USER-AGENT: upnp-control/0.3 UPnP/1.1\r\n\
         \r\n",
        SSDP_MULTICAST_ADDR,
        mx.max(1),
        search_target
    )
}

/// SSDP client that sends M-SEARCH and collects unicast responses.
pub struct SsdpClient {
    socket: UdpSocket,
    mx: u32,
}

impl SsdpClient {
    /// Create a client whose search iterators stop after `timeout` of silence.
    pub fn new(timeout: Duration) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .map_err(|e| DiscoveryError::Network(format!("Failed to bind UDP socket: {}", e)))?;
        socket
            .set_read_timeout(Some(timeout))
            .map_err(|e| DiscoveryError::Network(format!("Failed to set read timeout: {}", e)))?;
        socket
            .set_multicast_loop_v4(true)
            .map_err(|e| DiscoveryError::Network(format!("Failed to set multicast loop: {}", e)))?;

        let mx = timeout.as_secs().clamp(1, 5) as u32;
        Ok(Self { socket, mx })
    }

    /// Send an M-SEARCH and return an iterator over the announcements it
    /// provokes.
    pub fn search(&self, search_target: &str) -> Result<SearchResponses<'_>> {
        let request = search_request(search_target, self.mx);
        self.socket
            .send_to(request.as_bytes(), SSDP_MULTICAST_ADDR)
            .map_err(|e| DiscoveryError::Network(format!("Failed to send M-SEARCH: {}", e)))?;
        tracing::debug!(st = search_target, mx = self.mx, "M-SEARCH sent");

        Ok(SearchResponses {
            socket: &self.socket,
            buffer: [0; 4096],
            finished: false,
        })
    }
}

/// Iterator over search responses; ends at the first read timeout.
pub struct SearchResponses<'a> {
    socket: &'a UdpSocket,
    buffer: [u8; 4096],
    finished: bool,
}

impl Iterator for SearchResponses<'_> {
    type Item = Result<Announcement>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            match self.socket.recv_from(&mut self.buffer) {
                Ok((size, from)) => {
                    let Ok(text) = std::str::from_utf8(&self.buffer[..size]) else {
                        continue;
                    };
                    match parse_message(text) {
                        Some(AnnouncementEvent::Alive(a)) => return Some(Ok(a)),
                        _ => tracing::trace!(%from, "skipping non-response datagram"),
                    }
                }
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    self.finished = true;
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(DiscoveryError::Network(format!("Socket error: {}", e))));
                }
            }
        }
        None
    }
}
