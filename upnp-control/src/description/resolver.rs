//! Description resolution with URL fallback, caching and proxy merging

use std::sync::Arc;

use dashmap::DashMap;

use super::fetch::DescriptionFetcher;
use super::parse::{
    parse_device_description, parse_service_description, DescriptionDocument, DeviceDescription,
};
use crate::error::{ControlPointError, Result};
use crate::events::{DiscoveryEvent, EventHub};
use crate::proxy::{DeviceProxy, ServiceCatalog, ServiceKey, ServiceProxy};
use crate::registry::IdentityRegistry;

/// Fetches, parses and caches description documents, and folds their
/// contents into the proxies held by the registry.
///
/// Parsed documents are cached by source URL. A cached document is reused
/// until the device it describes is disposed.
pub struct DescriptionResolver {
    fetcher: Arc<dyn DescriptionFetcher>,
    registry: Arc<IdentityRegistry>,
    hub: Arc<EventHub>,
    documents: DashMap<String, Arc<DescriptionDocument>>,
    catalogs: DashMap<String, Arc<ServiceCatalog>>,
}

impl DescriptionResolver {
    pub fn new(
        fetcher: Arc<dyn DescriptionFetcher>,
        registry: Arc<IdentityRegistry>,
        hub: Arc<EventHub>,
    ) -> Self {
        Self {
            fetcher,
            registry,
            hub,
            documents: DashMap::new(),
            catalogs: DashMap::new(),
        }
    }

    /// Resolve the first usable description among `candidates`, in order.
    ///
    /// Proxies for every device and service in the document are created or
    /// updated in place.
    pub fn resolve(&self, candidates: &[String]) -> Result<Arc<DescriptionDocument>> {
        if candidates.is_empty() {
            return Err(ControlPointError::resolution(candidates, "no candidate URLs"));
        }

        let mut failures = Vec::new();
        for url in candidates {
            if let Some(doc) = self.cached(url) {
                tracing::trace!(url = %url, "description cache hit");
                self.merge(&doc);
                return Ok(doc);
            }
            match self.fetch_document(url) {
                Ok(doc) => {
                    self.documents.insert(url.clone(), Arc::clone(&doc));
                    self.merge(&doc);
                    return Ok(doc);
                }
                Err(e) => {
                    tracing::debug!(url = %url, error = %e, "description candidate failed");
                    failures.push(format!("{}: {}", url, e));
                }
            }
        }

        Err(ControlPointError::resolution(candidates, failures.join("; ")))
    }

    /// Resolve the description of `device` from its known locations
    pub fn resolve_device(&self, device: &Arc<DeviceProxy>) -> Result<Arc<DescriptionDocument>> {
        if device.is_disposed() {
            return Err(ControlPointError::DeviceGone(device.udn().to_string()));
        }
        self.resolve(&candidates_for(device))
    }

    /// Fetch `device`'s description again, ignoring the cache.
    ///
    /// Succeeds only if a candidate answers with a document that still
    /// describes the device's UDN.
    pub fn reverify(&self, device: &Arc<DeviceProxy>) -> Result<Arc<DescriptionDocument>> {
        let candidates = candidates_for(device);
        if candidates.is_empty() {
            return Err(ControlPointError::resolution(&candidates, "no candidate URLs"));
        }

        let mut failures = Vec::new();
        for url in &candidates {
            match self.fetch_document(url) {
                Ok(doc) if doc.contains_udn(device.udn()) => {
                    tracing::debug!(udn = %device.udn(), url = %url, "device re-verified");
                    self.documents.insert(url.clone(), Arc::clone(&doc));
                    self.merge(&doc);
                    return Ok(doc);
                }
                Ok(doc) => failures.push(format!(
                    "{}: now describes {} instead of {}",
                    url,
                    doc.root.udn,
                    device.udn()
                )),
                Err(e) => failures.push(format!("{}: {}", url, e)),
            }
        }

        Err(ControlPointError::resolution(&candidates, failures.join("; ")))
    }

    /// Make sure `service` has its action catalog, loading it on first use.
    pub fn ensure_catalog(&self, service: &Arc<ServiceProxy>) -> Result<Arc<ServiceCatalog>> {
        if let Some(catalog) = service.catalog() {
            return Ok(catalog);
        }
        if service.is_disposed() {
            return Err(ControlPointError::DeviceGone(service.udn().to_string()));
        }

        let scpd_url = match service.urls().scpd {
            Some(url) => url,
            None => {
                let device = service
                    .device()
                    .ok_or_else(|| ControlPointError::DeviceGone(service.udn().to_string()))?;
                self.resolve_device(&device)?;
                service.urls().scpd.ok_or_else(|| {
                    ControlPointError::resolution(
                        &device.locations(),
                        format!("{} is not listed in the device description", service.key()),
                    )
                })?
            }
        };

        if let Some(catalog) = self.catalogs.get(&scpd_url).map(|c| Arc::clone(&c)) {
            return Ok(service.set_catalog(catalog));
        }

        let urls = [scpd_url.clone()];
        // A timeout stays a timeout so the caller can re-verify the device
        let xml = self.fetcher.fetch(&scpd_url).map_err(|e| match e {
            ControlPointError::Timeout(_) => e,
            other => ControlPointError::resolution(&urls, other.to_string()),
        })?;
        let catalog = parse_service_description(&xml)
            .map_err(|e| ControlPointError::resolution(&urls, e.to_string()))?;

        tracing::debug!(
            service = %service.key(),
            actions = catalog.actions().len(),
            warnings = catalog.warnings.len(),
            "loaded service catalog"
        );

        let catalog = Arc::clone(
            self.catalogs
                .entry(scpd_url)
                .or_insert_with(|| Arc::new(catalog))
                .value(),
        );
        Ok(service.set_catalog(catalog))
    }

    /// Drop cached documents describing `udn`
    pub fn invalidate(&self, udn: &str) {
        self.documents.retain(|url, doc| {
            let keep = !doc.contains_udn(udn);
            if !keep {
                tracing::debug!(url = %url, udn = %udn, "invalidated cached description");
            }
            keep
        });
    }

    pub fn cached_document_count(&self) -> usize {
        self.documents.len()
    }

    fn cached(&self, url: &str) -> Option<Arc<DescriptionDocument>> {
        let doc = self.documents.get(url).map(|d| Arc::clone(&d))?;
        let disposed = self
            .registry
            .device(&doc.root.udn)
            .is_some_and(|d| d.is_disposed());
        if disposed {
            self.documents.remove(url);
            return None;
        }
        Some(doc)
    }

    fn fetch_document(&self, url: &str) -> Result<Arc<DescriptionDocument>> {
        let xml = self.fetcher.fetch(url)?;
        Ok(Arc::new(parse_device_description(url, &xml)?))
    }

    /// Fold a document into the registry and publish Added events for new
    /// identities.
    fn merge(&self, doc: &DescriptionDocument) -> Vec<DiscoveryEvent> {
        let mut events = Vec::new();
        let root = self.merge_device(&doc.root, None, &doc.url, &mut events);
        root.add_locations(std::slice::from_ref(&doc.url));
        self.hub.publish_all(&events);
        events
    }

    fn merge_device(
        &self,
        description: &DeviceDescription,
        parent: Option<&Arc<DeviceProxy>>,
        url: &str,
        events: &mut Vec<DiscoveryEvent>,
    ) -> Arc<DeviceProxy> {
        let udn = description.udn.as_str();
        let (device, created) = self
            .registry
            .get_or_create_device(udn, || DeviceProxy::new(udn));
        if created {
            events.push(DiscoveryEvent::DeviceAdded(Arc::clone(&device)));
        }

        device.set_device_type(&description.device_type);
        device.merge_info(&description.info);
        device.set_description_url(url);
        if let Some(parent) = parent {
            parent.attach_device(&device);
        }

        for entry in &description.services {
            let key = ServiceKey::new(udn, entry.service_type.as_str());
            let (service, created) = self.registry.get_or_create_service(&key, || {
                ServiceProxy::new(key.clone(), Arc::downgrade(&device))
            });
            service.merge_description(entry.service_id.as_deref(), &entry.urls);
            device.attach_service(&service);
            if created {
                events.push(DiscoveryEvent::ServiceAdded(service));
            }
        }

        for child in &description.devices {
            self.merge_device(child, Some(&device), url, events);
        }

        device
    }
}

/// Candidate URLs for a device: its own locations, then the URL its
/// description was last loaded from, then those of its root device.
fn candidates_for(device: &Arc<DeviceProxy>) -> Vec<String> {
    let mut candidates = device.locations();
    let mut push = |url: String| {
        if !candidates.contains(&url) {
            candidates.push(url);
        }
    };
    if let Some(url) = device.description_url() {
        push(url);
    }
    let root = device.root();
    if !Arc::ptr_eq(&root, device) {
        for url in root.locations() {
            push(url);
        }
    }
    candidates
}
