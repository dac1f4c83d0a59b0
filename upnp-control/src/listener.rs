//! Announcement handling
//!
//! Turns raw alive/byebye events into registry updates and discovery
//! events. Nothing here touches the network, so the transport's receive
//! path is never blocked on a device.

use std::sync::Arc;

use upnp_discovery::{Announcement, AnnouncementEvent, Usn, UsnKind};

use crate::events::{DiscoveryEvent, EventHub};
use crate::liveness::LivenessMonitor;
use crate::proxy::{DeviceProxy, ServiceKey, ServiceProxy};
use crate::registry::IdentityRegistry;

pub struct DiscoveryListener {
    registry: Arc<IdentityRegistry>,
    liveness: Arc<LivenessMonitor>,
    hub: Arc<EventHub>,
}

impl DiscoveryListener {
    pub fn new(
        registry: Arc<IdentityRegistry>,
        liveness: Arc<LivenessMonitor>,
        hub: Arc<EventHub>,
    ) -> Self {
        Self {
            registry,
            liveness,
            hub,
        }
    }

    /// Apply one parsed announcement. Returns the events it caused.
    pub fn handle(&self, event: AnnouncementEvent) -> Vec<DiscoveryEvent> {
        match event {
            AnnouncementEvent::Alive(announcement) => self.alive(&announcement),
            AnnouncementEvent::ByeBye { usn, .. } => self.byebye(&usn),
        }
    }

    /// Raw alive entry point: `{usn, type, locations}` as delivered by the
    /// transport. Malformed USNs are dropped.
    pub fn announce(&self, usn: &str, notification_type: &str, locations: Vec<String>) -> Vec<DiscoveryEvent> {
        match Announcement::new(usn, notification_type, locations) {
            Ok(announcement) => self.alive(&announcement),
            Err(e) => {
                tracing::debug!(usn = %usn, error = %e, "dropping announcement");
                Vec::new()
            }
        }
    }

    /// Raw byebye entry point
    pub fn withdraw(&self, usn: &str, notification_type: &str) -> Vec<DiscoveryEvent> {
        match Usn::parse(usn) {
            Ok(usn) => self.byebye(&usn),
            Err(e) => {
                tracing::debug!(usn = %usn, nt = %notification_type, error = %e, "dropping withdrawal");
                Vec::new()
            }
        }
    }

    fn alive(&self, announcement: &Announcement) -> Vec<DiscoveryEvent> {
        let key = announcement.key();
        let mut events = Vec::new();

        let (device, created) = self
            .registry
            .get_or_create_device(key, || DeviceProxy::new(key));
        if created {
            tracing::debug!(udn = %key, "new device announced");
            events.push(DiscoveryEvent::DeviceAdded(Arc::clone(&device)));
        }
        device.add_locations(&announcement.locations);
        device.touch(announcement.received_at, announcement.max_age);

        match announcement.usn.kind() {
            UsnKind::Device(device_type) => {
                device.set_device_type(&device_type.urn);
            }
            UsnKind::Service(service_type) => {
                let service_key = ServiceKey::new(key, service_type.urn.as_str());
                let (service, created) = self.registry.get_or_create_service(&service_key, || {
                    ServiceProxy::new(service_key.clone(), Arc::downgrade(&device))
                });
                device.attach_service(&service);
                if created {
                    events.push(DiscoveryEvent::ServiceAdded(service));
                }
            }
            UsnKind::Bare | UsnKind::RootDevice => {}
        }

        self.hub.publish_all(&events);
        events
    }

    fn byebye(&self, usn: &Usn) -> Vec<DiscoveryEvent> {
        let Some(device) = self.registry.device(usn.key()) else {
            tracing::trace!(usn = %usn.as_str(), "byebye for unknown device");
            return Vec::new();
        };

        match usn.kind() {
            UsnKind::Service(service_type) => {
                let key = ServiceKey::new(usn.key(), service_type.urn.as_str());
                match self.registry.service(&key) {
                    Some(service) => self.liveness.withdraw_service(&service),
                    None => Vec::new(),
                }
            }
            _ => self.liveness.withdraw_device(&device),
        }
    }
}
