//! Service proxies

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::RwLock;

use super::catalog::ServiceCatalog;
use super::device::DeviceProxy;

/// Identity of a service: owning device UDN plus service type URN
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceKey {
    pub udn: String,
    pub service_type: String,
}

impl ServiceKey {
    pub fn new(udn: impl Into<String>, service_type: impl Into<String>) -> Self {
        Self {
            udn: udn.into(),
            service_type: service_type.into(),
        }
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.udn, self.service_type)
    }
}

/// Absolute endpoint URLs from the device description
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceUrls {
    pub scpd: Option<String>,
    pub control: Option<String>,
    pub event_sub: Option<String>,
}

/// The single live handle for one service identity.
///
/// The catalog is loaded on first use and never changes afterwards.
#[derive(Debug)]
pub struct ServiceProxy {
    key: ServiceKey,
    service_id: RwLock<Option<String>>,
    urls: RwLock<ServiceUrls>,
    catalog: OnceLock<Arc<ServiceCatalog>>,
    device: Weak<DeviceProxy>,
    disposed: AtomicBool,
}

impl ServiceProxy {
    pub fn new(key: ServiceKey, device: Weak<DeviceProxy>) -> Self {
        Self {
            key,
            service_id: RwLock::new(None),
            urls: RwLock::new(ServiceUrls::default()),
            catalog: OnceLock::new(),
            device,
            disposed: AtomicBool::new(false),
        }
    }

    pub fn key(&self) -> &ServiceKey {
        &self.key
    }

    pub fn udn(&self) -> &str {
        &self.key.udn
    }

    pub fn service_type(&self) -> &str {
        &self.key.service_type
    }

    /// Bare type name, e.g. `ContentDirectory`
    pub fn type_name(&self) -> &str {
        let mut segments = self.key.service_type.split(':');
        let marker = segments.position(|s| s == "service");
        match marker.and_then(|_| segments.next()) {
            Some(name) => name,
            None => &self.key.service_type,
        }
    }

    pub fn service_id(&self) -> Option<String> {
        self.service_id.read().clone()
    }

    pub fn urls(&self) -> ServiceUrls {
        self.urls.read().clone()
    }

    pub fn control_url(&self) -> Option<String> {
        self.urls.read().control.clone()
    }

    pub fn event_sub_url(&self) -> Option<String> {
        self.urls.read().event_sub.clone()
    }

    pub(crate) fn merge_description(&self, service_id: Option<&str>, urls: &ServiceUrls) {
        if let Some(id) = service_id {
            *self.service_id.write() = Some(id.to_string());
        }
        let mut current = self.urls.write();
        if urls.scpd.is_some() {
            current.scpd.clone_from(&urls.scpd);
        }
        if urls.control.is_some() {
            current.control.clone_from(&urls.control);
        }
        if urls.event_sub.is_some() {
            current.event_sub.clone_from(&urls.event_sub);
        }
    }

    /// The catalog, if it has been loaded
    pub fn catalog(&self) -> Option<Arc<ServiceCatalog>> {
        self.catalog.get().cloned()
    }

    /// Install the catalog unless one is already present; returns the one
    /// in effect.
    pub(crate) fn set_catalog(&self, catalog: Arc<ServiceCatalog>) -> Arc<ServiceCatalog> {
        Arc::clone(self.catalog.get_or_init(|| catalog))
    }

    /// Owning device, while it is alive
    pub fn device(&self) -> Option<Arc<DeviceProxy>> {
        self.device.upgrade()
    }

    /// Disposed directly or through its owning device
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
            || self.device.upgrade().is_some_and(|d| d.is_disposed())
    }

    pub(crate) fn dispose(&self) -> bool {
        !self.disposed.swap(true, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CDS: &str = "urn:schemas-upnp-org:service:ContentDirectory:1";

    #[test]
    fn test_type_name() {
        let service = ServiceProxy::new(ServiceKey::new("uuid:a", CDS), Weak::new());
        assert_eq!(service.type_name(), "ContentDirectory");

        let odd = ServiceProxy::new(ServiceKey::new("uuid:a", "custom"), Weak::new());
        assert_eq!(odd.type_name(), "custom");
    }

    #[test]
    fn test_catalog_set_once() {
        let service = ServiceProxy::new(ServiceKey::new("uuid:a", CDS), Weak::new());
        let first = Arc::new(ServiceCatalog::default());
        let second = Arc::new(ServiceCatalog::default());
        assert!(Arc::ptr_eq(&service.set_catalog(Arc::clone(&first)), &first));
        assert!(Arc::ptr_eq(&service.set_catalog(second), &first));
    }

    #[test]
    fn test_disposed_through_device() {
        let device = Arc::new(DeviceProxy::new("uuid:a"));
        let service = ServiceProxy::new(ServiceKey::new("uuid:a", CDS), Arc::downgrade(&device));
        assert!(!service.is_disposed());
        device.dispose();
        assert!(service.is_disposed());
    }

    #[test]
    fn test_merge_description_keeps_known_urls() {
        let service = ServiceProxy::new(ServiceKey::new("uuid:a", CDS), Weak::new());
        service.merge_description(
            Some("urn:upnp-org:serviceId:ContentDirectory"),
            &ServiceUrls {
                scpd: Some("http://h/scpd.xml".into()),
                control: Some("http://h/control".into()),
                event_sub: None,
            },
        );
        service.merge_description(
            None,
            &ServiceUrls {
                event_sub: Some("http://h/event".into()),
                ..Default::default()
            },
        );
        let urls = service.urls();
        assert_eq!(urls.control.as_deref(), Some("http://h/control"));
        assert_eq!(urls.event_sub.as_deref(), Some("http://h/event"));
        assert_eq!(
            service.service_id().as_deref(),
            Some("urn:upnp-org:serviceId:ContentDirectory")
        );
    }
}
