//! Identity registry
//!
//! Maps each device UDN and each (UDN, service type) pair to the single
//! live proxy for that identity. All mutations go through one lock, so a
//! get-or-create racing another get-or-create for the same key always
//! yields the same instance.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::proxy::{DeviceProxy, ServiceKey, ServiceProxy};

#[derive(Default)]
struct Entries {
    devices: HashMap<String, Arc<DeviceProxy>>,
    services: HashMap<ServiceKey, Arc<ServiceProxy>>,
}

/// Registry of live proxies, shared by the listener, resolver and liveness
/// monitor.
#[derive(Default)]
pub struct IdentityRegistry {
    entries: Mutex<Entries>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the live device for `udn`, creating it with `factory` if there
    /// is none. The flag is `true` when the device was created by this call.
    ///
    /// A disposed entry is never handed out again; it is replaced.
    pub fn get_or_create_device<F>(&self, udn: &str, factory: F) -> (Arc<DeviceProxy>, bool)
    where
        F: FnOnce() -> DeviceProxy,
    {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.devices.get(udn) {
            if !existing.is_disposed() {
                return (Arc::clone(existing), false);
            }
        }
        let device = Arc::new(factory());
        entries.devices.insert(udn.to_string(), Arc::clone(&device));
        tracing::debug!(udn = %udn, "registered device");
        (device, true)
    }

    /// Service counterpart of [`get_or_create_device`](Self::get_or_create_device)
    pub fn get_or_create_service<F>(&self, key: &ServiceKey, factory: F) -> (Arc<ServiceProxy>, bool)
    where
        F: FnOnce() -> ServiceProxy,
    {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.services.get(key) {
            if !existing.is_disposed() {
                return (Arc::clone(existing), false);
            }
        }
        let service = Arc::new(factory());
        entries.services.insert(key.clone(), Arc::clone(&service));
        tracing::debug!(service = %key, "registered service");
        (service, true)
    }

    /// Detach `device` if it is still the registered instance for its UDN.
    pub fn remove_device(&self, device: &Arc<DeviceProxy>) -> bool {
        let mut entries = self.entries.lock();
        match entries.devices.get(device.udn()) {
            Some(current) if Arc::ptr_eq(current, device) => {
                entries.devices.remove(device.udn());
                true
            }
            _ => false,
        }
    }

    /// Detach `service` if it is still the registered instance for its key.
    pub fn remove_service(&self, service: &Arc<ServiceProxy>) -> bool {
        let mut entries = self.entries.lock();
        match entries.services.get(service.key()) {
            Some(current) if Arc::ptr_eq(current, service) => {
                entries.services.remove(service.key());
                true
            }
            _ => false,
        }
    }

    pub fn device(&self, udn: &str) -> Option<Arc<DeviceProxy>> {
        self.entries.lock().devices.get(udn).cloned()
    }

    pub fn service(&self, key: &ServiceKey) -> Option<Arc<ServiceProxy>> {
        self.entries.lock().services.get(key).cloned()
    }

    /// Every registered device, root and embedded
    pub fn devices(&self) -> Vec<Arc<DeviceProxy>> {
        self.entries.lock().devices.values().cloned().collect()
    }

    /// Registered services owned by `udn`
    pub fn services_of(&self, udn: &str) -> Vec<Arc<ServiceProxy>> {
        self.entries
            .lock()
            .services
            .values()
            .filter(|s| s.udn() == udn)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
