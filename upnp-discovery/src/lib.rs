//! SSDP announcement handling for UPnP control points
//!
//! This crate turns raw SSDP traffic into typed announcements. It knows how to
//! read a USN, how to tell device, service and bare announcements apart, and
//! how to send an M-SEARCH. It does not fetch descriptions or keep any state
//! about devices; that lives in `upnp-control`.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use upnp_discovery::{SsdpClient, ROOT_DEVICE};
//!
//! let client = SsdpClient::new(Duration::from_secs(3))?;
//! for announcement in client.search(ROOT_DEVICE)? {
//!     let announcement = announcement?;
//!     println!("{} at {:?}", announcement.key(), announcement.locations);
//! }
//! # Ok::<(), upnp_discovery::DiscoveryError>(())
//! ```
//!
//! Datagrams received by an application-owned multicast socket go through
//! [`parse_message`]:
//!
//! ```
//! use upnp_discovery::{parse_message, AnnouncementEvent};
//!
//! let datagram = "NOTIFY * HTTP/1.1\r\n\
//!     NT: upnp:rootdevice\r\n\
//!     NTS: ssdp:byebye\r\n\
//!     USN: uuid:abc::upnp:rootdevice\r\n\r\n";
//! assert!(matches!(parse_message(datagram), Some(AnnouncementEvent::ByeBye { .. })));
//! ```

mod announcement;
mod error;
pub mod ssdp;
pub mod usn;

pub use announcement::{Announcement, AnnouncementEvent, DEFAULT_MAX_AGE};
pub use error::{DiscoveryError, Result};
pub use ssdp::{parse_message, SsdpClient, ROOT_DEVICE};
pub use usn::{TypeUrn, Usn, UsnKind};
