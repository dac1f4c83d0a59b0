//! # UPnP Control Point
//!
//! Discovers devices, resolves their descriptions, invokes their actions and
//! delivers their state-change events.
//!
//! ## Overview
//!
//! - **Identity**: every device (UDN) and service (UDN + type) has exactly one
//!   live proxy. Repeated announcements and descriptions update it in place,
//!   so references held by the application stay current.
//! - **Lazy descriptions**: descriptions are fetched on first use, trying
//!   each announced URL in turn, and cached by URL until the device goes away.
//! - **Validated invocation**: arguments are checked against the declared
//!   state variables before anything is sent. A timeout triggers a
//!   re-verification of the device, which disposes it if it no longer answers.
//! - **Ref-counted eventing**: the first listener on a service subscribes, the
//!   last one unsubscribes, and leases are renewed in the background.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use upnp_control::{ControlPoint, DiscoveryEvent};
//!
//! let control_point = ControlPoint::new()?;
//!
//! // Feed announcements from your SSDP transport
//! control_point.announce(
//!     "uuid:4d696e69-444c-164e-9d41-b827eb54e3d6::urn:schemas-upnp-org:service:ContentDirectory:1",
//!     "urn:schemas-upnp-org:service:ContentDirectory:1",
//!     vec!["http://192.168.1.20:8200/rootDesc.xml".to_string()],
//! );
//!
//! let device = control_point.device("uuid:4d696e69-444c-164e-9d41-b827eb54e3d6").unwrap();
//! let cds = device.service("ContentDirectory").unwrap();
//! let result = control_point.invoke(&cds, "GetSystemUpdateID", &[])?;
//!
//! let id = control_point.add_listener(&cds, "SystemUpdateID", |change| {
//!     println!("SystemUpdateID is now {}", change.value);
//! })?;
//! control_point.remove_listener(id)?;
//! ```
//!
//! ## Architecture
//!
//! 1. [`DiscoveryListener`] turns announcements into registry entries and
//!    [`DiscoveryEvent`]s, without touching the network
//! 2. [`DescriptionResolver`] fetches descriptions and merges them into the
//!    proxies held by the [`IdentityRegistry`]
//! 3. [`ActionInvoker`] validates and performs calls, handing timeouts to the
//!    [`LivenessMonitor`]
//! 4. [`SubscriptionManager`] keeps one GENA subscription per service while it
//!    has listeners; its [`RenewalTimer`] renews the leases and the
//!    [`EventWorker`] hosts the callback server

pub mod config;
mod control_point;
pub mod description;
mod error;
pub mod eventing;
mod events;
mod invoker;
mod listener;
mod liveness;
pub mod logging;
pub mod proxy;
mod registry;
pub mod transport;

pub use config::{ControlPointConfig, SubscriptionConfig};
pub use control_point::{ControlPoint, ControlPointBuilder};
pub use description::{DescriptionDocument, DescriptionFetcher, DescriptionResolver, HttpFetcher};
pub use error::{ControlPointError, Result};
pub use eventing::{
    EventWorker, ListenerId, NotificationSink, RenewalTimer, StateChange, SubscriptionManager,
};
pub use events::{DiscoveryEvent, DiscoveryEvents, EventHub};
pub use invoker::{ActionInvoker, ActionResult, InvokeOptions};
pub use listener::DiscoveryListener;
pub use liveness::LivenessMonitor;
pub use logging::{init_logging, LoggingMode};
pub use proxy::{
    Action, Argument, DeviceInfo, DeviceProxy, Direction, ServiceCatalog, ServiceKey,
    ServiceProxy, StateVariable,
};
pub use registry::IdentityRegistry;
pub use transport::{ActionRequest, ControlTransport, EventTransport, Lease};

// Re-export discovery types that appear in this crate's API
pub use upnp_discovery::{Announcement, AnnouncementEvent, Usn, UsnKind};
