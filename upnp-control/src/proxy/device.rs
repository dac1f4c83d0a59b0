//! Device proxies

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use super::service::ServiceProxy;
use upnp_discovery::DEFAULT_MAX_AGE;

/// An icon advertised in a device description
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Icon {
    pub mime_type: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub depth: Option<u32>,
    pub url: String,
}

/// Descriptive fields of a device
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceInfo {
    pub friendly_name: Option<String>,
    pub manufacturer: Option<String>,
    pub manufacturer_url: Option<String>,
    pub model_name: Option<String>,
    pub model_number: Option<String>,
    pub model_description: Option<String>,
    pub model_url: Option<String>,
    pub serial_number: Option<String>,
    pub upc: Option<String>,
    pub presentation_url: Option<String>,
    pub icons: Vec<Icon>,
}

impl DeviceInfo {
    /// Copy every field present in `other` over this one
    pub fn merge_from(&mut self, other: &DeviceInfo) {
        fn take(slot: &mut Option<String>, value: &Option<String>) {
            if value.is_some() {
                slot.clone_from(value);
            }
        }
        take(&mut self.friendly_name, &other.friendly_name);
        take(&mut self.manufacturer, &other.manufacturer);
        take(&mut self.manufacturer_url, &other.manufacturer_url);
        take(&mut self.model_name, &other.model_name);
        take(&mut self.model_number, &other.model_number);
        take(&mut self.model_description, &other.model_description);
        take(&mut self.model_url, &other.model_url);
        take(&mut self.serial_number, &other.serial_number);
        take(&mut self.upc, &other.upc);
        take(&mut self.presentation_url, &other.presentation_url);
        if !other.icons.is_empty() {
            self.icons.clone_from(&other.icons);
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Freshness {
    last_seen: Instant,
    max_age: Duration,
}

/// The single live handle for one device identity (UDN).
///
/// Held by the registry and by any application code; later announcements
/// and descriptions update it in place.
#[derive(Debug)]
pub struct DeviceProxy {
    udn: String,
    device_type: OnceLock<String>,
    info: RwLock<DeviceInfo>,
    locations: RwLock<Vec<String>>,
    description_url: RwLock<Option<String>>,
    services: RwLock<Vec<Arc<ServiceProxy>>>,
    devices: RwLock<Vec<Arc<DeviceProxy>>>,
    parent: RwLock<Weak<DeviceProxy>>,
    disposed: AtomicBool,
    freshness: Mutex<Option<Freshness>>,
}

impl DeviceProxy {
    pub fn new(udn: impl Into<String>) -> Self {
        Self {
            udn: udn.into(),
            device_type: OnceLock::new(),
            info: RwLock::new(DeviceInfo::default()),
            locations: RwLock::new(Vec::new()),
            description_url: RwLock::new(None),
            services: RwLock::new(Vec::new()),
            devices: RwLock::new(Vec::new()),
            parent: RwLock::new(Weak::new()),
            disposed: AtomicBool::new(false),
            freshness: Mutex::new(None),
        }
    }

    pub fn udn(&self) -> &str {
        &self.udn
    }

    /// Device type URN, once known
    pub fn device_type(&self) -> Option<&str> {
        self.device_type.get().map(String::as_str)
    }

    /// Fix the device type. Returns `true` if this call set it.
    ///
    /// The type never changes once set; a conflicting value is logged and
    /// ignored.
    pub fn set_device_type(&self, device_type: &str) -> bool {
        let mut newly_set = false;
        let current = self.device_type.get_or_init(|| {
            newly_set = true;
            device_type.to_string()
        });
        if !newly_set && current != device_type {
            tracing::warn!(
                udn = %self.udn,
                current = %current,
                announced = %device_type,
                "ignoring conflicting device type"
            );
        }
        newly_set
    }

    pub fn info(&self) -> DeviceInfo {
        self.info.read().clone()
    }

    pub fn friendly_name(&self) -> Option<String> {
        self.info.read().friendly_name.clone()
    }

    pub(crate) fn merge_info(&self, info: &DeviceInfo) {
        self.info.write().merge_from(info);
    }

    /// Candidate description URLs, most recently announced first
    pub fn locations(&self) -> Vec<String> {
        self.locations.read().clone()
    }

    /// Record announced description URLs; returns `true` if any was new.
    pub(crate) fn add_locations(&self, urls: &[String]) -> bool {
        let mut locations = self.locations.write();
        let mut changed = false;
        for url in urls.iter().rev() {
            if let Some(pos) = locations.iter().position(|l| l == url) {
                if pos == 0 {
                    continue;
                }
                locations.remove(pos);
            } else {
                changed = true;
            }
            locations.insert(0, url.clone());
        }
        changed
    }

    /// URL the current description was loaded from
    pub fn description_url(&self) -> Option<String> {
        self.description_url.read().clone()
    }

    pub(crate) fn set_description_url(&self, url: &str) {
        *self.description_url.write() = Some(url.to_string());
    }

    pub fn services(&self) -> Vec<Arc<ServiceProxy>> {
        self.services.read().clone()
    }

    /// Look up a service by full type URN or by bare type name
    pub fn service(&self, service_type: &str) -> Option<Arc<ServiceProxy>> {
        self.services
            .read()
            .iter()
            .find(|s| s.service_type() == service_type || s.type_name() == service_type)
            .cloned()
    }

    pub(crate) fn attach_service(&self, service: &Arc<ServiceProxy>) -> bool {
        let mut services = self.services.write();
        if services.iter().any(|s| Arc::ptr_eq(s, service)) {
            return false;
        }
        services.retain(|s| s.key() != service.key());
        services.push(Arc::clone(service));
        true
    }

    pub(crate) fn detach_service(&self, service: &Arc<ServiceProxy>) {
        self.services.write().retain(|s| !Arc::ptr_eq(s, service));
    }

    /// Embedded devices
    pub fn devices(&self) -> Vec<Arc<DeviceProxy>> {
        self.devices.read().clone()
    }

    pub(crate) fn attach_device(self: &Arc<Self>, child: &Arc<DeviceProxy>) -> bool {
        *child.parent.write() = Arc::downgrade(self);
        let mut devices = self.devices.write();
        if devices.iter().any(|d| Arc::ptr_eq(d, child)) {
            return false;
        }
        devices.retain(|d| d.udn() != child.udn());
        devices.push(Arc::clone(child));
        true
    }

    pub(crate) fn detach_device(&self, child: &Arc<DeviceProxy>) {
        self.devices.write().retain(|d| !Arc::ptr_eq(d, child));
    }

    pub fn parent(&self) -> Option<Arc<DeviceProxy>> {
        self.parent.read().upgrade()
    }

    /// The root device of this device's tree
    pub fn root(self: &Arc<Self>) -> Arc<DeviceProxy> {
        let mut current = Arc::clone(self);
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// This device followed by every embedded device, depth first
    pub fn subtree(self: &Arc<Self>) -> Vec<Arc<DeviceProxy>> {
        let mut out = vec![Arc::clone(self)];
        let mut index = 0;
        while index < out.len() {
            let children = out[index].devices();
            out.extend(children);
            index += 1;
        }
        out
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Mark the device disposed. Returns `true` on the first call only.
    pub(crate) fn dispose(&self) -> bool {
        !self.disposed.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn touch(&self, now: Instant, max_age: Option<Duration>) {
        *self.freshness.lock() = Some(Freshness {
            last_seen: now,
            max_age: max_age.unwrap_or(DEFAULT_MAX_AGE),
        });
    }

    /// When the device was last announced
    pub fn last_seen(&self) -> Option<Instant> {
        self.freshness.lock().map(|f| f.last_seen)
    }

    /// Whether the last announcement has outlived its max-age.
    ///
    /// Devices never announced (known only from a description) do not expire.
    pub fn is_expired(&self, now: Instant) -> bool {
        match *self.freshness.lock() {
            Some(f) => now >= f.last_seen + f.max_age,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_type_is_immutable() {
        let device = DeviceProxy::new("uuid:a");
        assert_eq!(device.device_type(), None);
        assert!(device.set_device_type("urn:schemas-upnp-org:device:MediaServer:1"));
        assert!(!device.set_device_type("urn:schemas-upnp-org:device:MediaServer:1"));
        assert!(!device.set_device_type("urn:schemas-upnp-org:device:MediaRenderer:1"));
        assert_eq!(device.device_type(), Some("urn:schemas-upnp-org:device:MediaServer:1"));
    }

    #[test]
    fn test_locations_most_recent_first() {
        let device = DeviceProxy::new("uuid:a");
        assert!(device.add_locations(&["http://a/desc.xml".into()]));
        assert!(device.add_locations(&["http://b/desc.xml".into()]));
        assert!(!device.add_locations(&["http://a/desc.xml".into()]));
        assert_eq!(device.locations(), vec!["http://a/desc.xml", "http://b/desc.xml"]);
    }

    #[test]
    fn test_dispose_reports_first_transition_only() {
        let device = DeviceProxy::new("uuid:a");
        assert!(device.dispose());
        assert!(!device.dispose());
        assert!(device.is_disposed());
    }

    #[test]
    fn test_expiry_follows_max_age() {
        let device = DeviceProxy::new("uuid:a");
        let now = Instant::now();
        assert!(!device.is_expired(now + Duration::from_secs(100_000)));

        device.touch(now, Some(Duration::from_secs(60)));
        assert!(!device.is_expired(now + Duration::from_secs(59)));
        assert!(device.is_expired(now + Duration::from_secs(60)));
    }

    #[test]
    fn test_root_and_subtree() {
        let root = Arc::new(DeviceProxy::new("uuid:root"));
        let child = Arc::new(DeviceProxy::new("uuid:child"));
        let grandchild = Arc::new(DeviceProxy::new("uuid:grandchild"));
        root.attach_device(&child);
        child.attach_device(&grandchild);

        assert!(Arc::ptr_eq(&grandchild.root(), &root));
        let udns: Vec<_> = root.subtree().iter().map(|d| d.udn().to_string()).collect();
        assert_eq!(udns, vec!["uuid:root", "uuid:child", "uuid:grandchild"]);
    }

    #[test]
    fn test_merge_info_keeps_absent_fields() {
        let device = DeviceProxy::new("uuid:a");
        device.merge_info(&DeviceInfo {
            friendly_name: Some("Living Room".into()),
            serial_number: Some("123".into()),
            ..Default::default()
        });
        device.merge_info(&DeviceInfo {
            friendly_name: Some("Kitchen".into()),
            ..Default::default()
        });
        let info = device.info();
        assert_eq!(info.friendly_name.as_deref(), Some("Kitchen"));
        assert_eq!(info.serial_number.as_deref(), Some("123"));
    }
}
