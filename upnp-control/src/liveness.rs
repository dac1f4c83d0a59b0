//! Withdrawal and liveness re-verification
//!
//! A device leaves the registry in one of three ways: a byebye, an expired
//! announcement, or a failed re-verification after a timeout. All three end
//! here, so the device subtree and its services are disposed, detached and
//! reported exactly once.

use std::sync::Arc;
use std::time::Instant;

use crate::description::DescriptionResolver;
use crate::events::{DiscoveryEvent, EventHub};
use crate::proxy::{DeviceProxy, ServiceProxy};
use crate::registry::IdentityRegistry;

pub struct LivenessMonitor {
    registry: Arc<IdentityRegistry>,
    resolver: Arc<DescriptionResolver>,
    hub: Arc<EventHub>,
}

impl LivenessMonitor {
    pub fn new(
        registry: Arc<IdentityRegistry>,
        resolver: Arc<DescriptionResolver>,
        hub: Arc<EventHub>,
    ) -> Self {
        Self {
            registry,
            resolver,
            hub,
        }
    }

    /// Dispose `device`, its embedded devices and all their services.
    ///
    /// Returns the Removed events, which are also published. Already
    /// disposed proxies produce no events.
    pub fn withdraw_device(&self, device: &Arc<DeviceProxy>) -> Vec<DiscoveryEvent> {
        let mut events = Vec::new();

        for member in device.subtree() {
            let mut services = member.services();
            for service in self.registry.services_of(member.udn()) {
                if !services.iter().any(|s| Arc::ptr_eq(s, &service)) {
                    services.push(service);
                }
            }
            for service in services {
                if service.dispose() {
                    self.registry.remove_service(&service);
                    events.push(DiscoveryEvent::ServiceRemoved(service));
                }
            }

            if member.dispose() {
                self.registry.remove_device(&member);
                self.resolver.invalidate(member.udn());
                tracing::info!(udn = %member.udn(), "device withdrawn");
                events.push(DiscoveryEvent::DeviceRemoved(member));
            }
        }

        if let Some(parent) = device.parent() {
            parent.detach_device(device);
        }

        self.hub.publish_all(&events);
        events
    }

    /// Dispose a single service, leaving its device in place
    pub fn withdraw_service(&self, service: &Arc<ServiceProxy>) -> Vec<DiscoveryEvent> {
        if !service.dispose() {
            return Vec::new();
        }
        self.registry.remove_service(service);
        if let Some(device) = service.device() {
            device.detach_service(service);
        }
        tracing::info!(service = %service.key(), "service withdrawn");

        let events = vec![DiscoveryEvent::ServiceRemoved(Arc::clone(service))];
        self.hub.publish_all(&events);
        events
    }

    /// Re-fetch the description of `device`'s root. On failure the whole
    /// tree is withdrawn and `false` is returned.
    pub fn reverify_or_dispose(&self, device: &Arc<DeviceProxy>) -> bool {
        let root = device.root();
        if root.is_disposed() {
            return false;
        }
        match self.resolver.reverify(&root) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(udn = %root.udn(), error = %e, "re-verification failed, disposing device");
                self.withdraw_device(&root);
                false
            }
        }
    }

    /// Withdraw every root device whose announcement has expired
    pub fn expire_stale(&self, now: Instant) -> Vec<DiscoveryEvent> {
        self.registry
            .devices()
            .into_iter()
            .filter(|d| d.parent().is_none() && d.is_expired(now))
            .flat_map(|d| {
                tracing::debug!(udn = %d.udn(), "announcement expired");
                self.withdraw_device(&d)
            })
            .collect()
    }
}
