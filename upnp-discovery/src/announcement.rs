//! Announcements as delivered by the discovery transport.

use std::time::{Duration, Instant};

use crate::error::Result;
use crate::usn::Usn;

/// Default lifetime for announcements that carry no `max-age`.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(1800);

/// A presence announcement for one USN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub usn: Usn,
    /// `NT` of a NOTIFY or `ST` of a search response
    pub notification_type: String,
    /// Candidate description URLs, in preference order
    pub locations: Vec<String>,
    /// Announced lifetime from `CACHE-CONTROL: max-age`
    pub max_age: Option<Duration>,
    pub server: Option<String>,
    pub received_at: Instant,
}

impl Announcement {
    /// Build an announcement from the raw `{usn, type, locations}` triple.
    pub fn new(usn: &str, notification_type: &str, locations: Vec<String>) -> Result<Self> {
        Ok(Self {
            usn: Usn::parse(usn)?,
            notification_type: notification_type.to_string(),
            locations,
            max_age: None,
            server: None,
            received_at: Instant::now(),
        })
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = Some(server.into());
        self
    }

    /// Identity key of the announcing device.
    pub fn key(&self) -> &str {
        self.usn.key()
    }

    /// Instant after which the announcement is no longer fresh
    pub fn expires_at(&self) -> Instant {
        self.received_at + self.max_age.unwrap_or(DEFAULT_MAX_AGE)
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at()
    }
}

/// Raw add/remove events from the multicast transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnouncementEvent {
    /// `ssdp:alive`, `ssdp:update` or a search response
    Alive(Announcement),
    /// `ssdp:byebye`
    ByeBye { usn: Usn, notification_type: String },
}

impl AnnouncementEvent {
    pub fn usn(&self) -> &Usn {
        match self {
            AnnouncementEvent::Alive(a) => &a.usn,
            AnnouncementEvent::ByeBye { usn, .. } => usn,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_uses_max_age() {
        let a = Announcement::new("uuid:abc", "upnp:rootdevice", vec![])
            .unwrap()
            .with_max_age(Duration::from_secs(10));
        assert!(!a.is_expired(a.received_at + Duration::from_secs(9)));
        assert!(a.is_expired(a.received_at + Duration::from_secs(10)));
    }

    #[test]
    fn test_expiry_defaults_without_max_age() {
        let a = Announcement::new("uuid:abc", "upnp:rootdevice", vec![]).unwrap();
        assert_eq!(a.expires_at(), a.received_at + DEFAULT_MAX_AGE);
    }

    #[test]
    fn test_malformed_usn_is_rejected() {
        assert!(Announcement::new("urn:foo", "upnp:rootdevice", vec![]).is_err());
    }
}
