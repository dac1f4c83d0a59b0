//! Sync-first control point facade
//!
//! Wires the registry, listener, resolver, invoker and subscription manager
//! together. All methods block; the callback server and the lease renewal
//! timer run on background threads started by the first subscription.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use soap_client::SoapClient;
use upnp_discovery::{AnnouncementEvent, DiscoveryError, SsdpClient};

use crate::config::ControlPointConfig;
use crate::description::{DescriptionDocument, DescriptionFetcher, DescriptionResolver, HttpFetcher};
use crate::error::{ControlPointError, Result};
use crate::eventing::{EventWorker, ListenerId, NotificationSink, StateChange, SubscriptionManager};
use crate::events::{DiscoveryEvent, DiscoveryEvents, EventHub};
use crate::invoker::{ActionInvoker, ActionResult, InvokeOptions};
use crate::listener::DiscoveryListener;
use crate::liveness::LivenessMonitor;
use crate::proxy::{DeviceProxy, ServiceCatalog, ServiceProxy};
use crate::registry::IdentityRegistry;
use crate::transport::{ControlTransport, EventTransport};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// UPnP control point
///
/// # Example
///
/// ```rust,ignore
/// use upnp_control::{ControlPoint, DiscoveryEvent};
///
/// let control_point = ControlPoint::new()?;
/// let events = control_point.events();
/// control_point.search("ssdp:all", std::time::Duration::from_secs(3))?;
///
/// for event in events.try_iter() {
///     if let DiscoveryEvent::ServiceAdded(service) = event {
///         if service.type_name() == "ContentDirectory" {
///             let result = control_point.invoke(&service, "GetSystemUpdateID", &[])?;
///             println!("update id {:?}", result.get("Id"));
///         }
///     }
/// }
/// ```
pub struct ControlPoint {
    config: ControlPointConfig,
    registry: Arc<IdentityRegistry>,
    hub: Arc<EventHub>,
    resolver: Arc<DescriptionResolver>,
    liveness: Arc<LivenessMonitor>,
    listener: DiscoveryListener,
    invoker: ActionInvoker,
    subscriptions: Arc<SubscriptionManager>,
    worker: Option<Arc<EventWorker>>,
}

impl ControlPoint {
    /// Control point with default configuration and HTTP transports
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Control point configured through [`ControlPointConfig::load`]
    pub fn from_env() -> Result<Self> {
        Self::builder().config(ControlPointConfig::load()?).build()
    }

    pub fn builder() -> ControlPointBuilder {
        ControlPointBuilder::default()
    }

    pub fn config(&self) -> &ControlPointConfig {
        &self.config
    }

    /// Apply one announcement from the discovery transport
    pub fn handle_announcement(&self, event: AnnouncementEvent) -> Vec<DiscoveryEvent> {
        self.listener.handle(event)
    }

    /// Apply a raw alive announcement; malformed USNs are dropped
    pub fn announce(&self, usn: &str, notification_type: &str, locations: Vec<String>) -> Vec<DiscoveryEvent> {
        self.listener.announce(usn, notification_type, locations)
    }

    /// Apply a raw byebye
    pub fn withdraw(&self, usn: &str, notification_type: &str) -> Vec<DiscoveryEvent> {
        self.listener.withdraw(usn, notification_type)
    }

    /// Send an M-SEARCH for `target` and apply every response received
    /// within `timeout`.
    pub fn search(&self, target: &str, timeout: Duration) -> Result<Vec<DiscoveryEvent>> {
        let client = SsdpClient::new(timeout).map_err(search_error)?;
        let mut events = Vec::new();
        for response in client.search(target).map_err(search_error)? {
            match response {
                Ok(announcement) => {
                    events.extend(self.listener.handle(AnnouncementEvent::Alive(announcement)))
                }
                Err(e) => tracing::debug!(error = %e, "search response dropped"),
            }
        }
        Ok(events)
    }

    /// Every known device, root and embedded
    pub fn devices(&self) -> Vec<Arc<DeviceProxy>> {
        self.registry.devices()
    }

    pub fn root_devices(&self) -> Vec<Arc<DeviceProxy>> {
        self.registry
            .devices()
            .into_iter()
            .filter(|d| d.parent().is_none())
            .collect()
    }

    pub fn device(&self, udn: &str) -> Option<Arc<DeviceProxy>> {
        self.registry.device(udn)
    }

    /// Resolve the device's description and merge it into the proxies
    pub fn describe(&self, device: &Arc<DeviceProxy>) -> Result<Arc<DescriptionDocument>> {
        self.resolver.resolve_device(device)
    }

    /// Resolve a description from explicit candidate URLs
    pub fn resolve(&self, candidates: &[String]) -> Result<Arc<DescriptionDocument>> {
        self.resolver.resolve(candidates)
    }

    pub fn service_catalog(&self, service: &Arc<ServiceProxy>) -> Result<Arc<ServiceCatalog>> {
        if service.is_disposed() {
            return Err(ControlPointError::DeviceGone(service.udn().to_string()));
        }
        self.resolver.ensure_catalog(service)
    }

    pub fn invoke(
        &self,
        service: &Arc<ServiceProxy>,
        action: &str,
        arguments: &[(&str, &str)],
    ) -> Result<ActionResult> {
        self.invoker.invoke(service, action, arguments)
    }

    pub fn invoke_with(
        &self,
        service: &Arc<ServiceProxy>,
        action: &str,
        arguments: &[(&str, &str)],
        options: InvokeOptions,
    ) -> Result<ActionResult> {
        self.invoker.invoke_with(service, action, arguments, options)
    }

    /// Call `listener` whenever `variable` of `service` is evented
    pub fn add_listener<F>(&self, service: &Arc<ServiceProxy>, variable: &str, listener: F) -> Result<ListenerId>
    where
        F: Fn(&StateChange) + Send + Sync + 'static,
    {
        self.subscriptions.add_listener(service, variable, Arc::new(listener))
    }

    pub fn remove_listener(&self, id: ListenerId) -> Result<bool> {
        self.subscriptions.remove_listener(id)
    }

    /// New stream of discovery events
    pub fn events(&self) -> DiscoveryEvents {
        self.hub.subscribe()
    }

    /// Withdraw devices whose announcements have outlived their max-age
    pub fn expire_stale(&self, now: Instant) -> Vec<DiscoveryEvent> {
        self.liveness.expire_stale(now)
    }

    /// Invoker handle for consumers built on top of the control point
    pub fn invoker(&self) -> ActionInvoker {
        self.invoker.clone()
    }

    pub fn registry(&self) -> &Arc<IdentityRegistry> {
        &self.registry
    }

    pub fn subscriptions(&self) -> &Arc<SubscriptionManager> {
        &self.subscriptions
    }

    /// Stop lease renewal, cancel subscriptions and stop the event worker
    pub fn shutdown(&self) {
        self.subscriptions.renewal().shutdown();
        self.subscriptions.unsubscribe_all();
        if let Some(worker) = &self.worker {
            worker.shutdown();
        }
    }
}

impl Drop for ControlPoint {
    fn drop(&mut self) {
        tracing::debug!(devices = self.registry.len(), "control point dropping");
    }
}

fn search_error(error: DiscoveryError) -> ControlPointError {
    match error {
        DiscoveryError::Network(reason) => ControlPointError::Network(reason),
        other => ControlPointError::DiscoveryParse(other),
    }
}

/// Builder for [`ControlPoint`]; every collaborator defaults to its HTTP
/// implementation.
#[derive(Default)]
pub struct ControlPointBuilder {
    config: ControlPointConfig,
    fetcher: Option<Arc<dyn DescriptionFetcher>>,
    control: Option<Arc<dyn ControlTransport>>,
    events: Option<Arc<dyn EventTransport>>,
    sink: Option<Arc<dyn NotificationSink>>,
    bind_address: Option<IpAddr>,
}

impl ControlPointBuilder {
    pub fn config(mut self, config: ControlPointConfig) -> Self {
        self.config = config;
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn DescriptionFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn control_transport(mut self, transport: Arc<dyn ControlTransport>) -> Self {
        self.control = Some(transport);
        self
    }

    pub fn event_transport(mut self, transport: Arc<dyn EventTransport>) -> Self {
        self.events = Some(transport);
        self
    }

    /// Replace the built-in callback server. Leases are still renewed by
    /// the control point.
    pub fn notification_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Address advertised in callback URLs instead of the detected one
    pub fn bind_address(mut self, address: IpAddr) -> Self {
        self.bind_address = Some(address);
        self
    }

    pub fn build(self) -> Result<ControlPoint> {
        let config = self.config;
        config.validate()?;

        let soap = Arc::new(SoapClient::with_timeouts(CONNECT_TIMEOUT, config.invoke_timeout()));
        let fetcher: Arc<dyn DescriptionFetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpFetcher::new(config.fetch_timeout())?),
        };
        let control: Arc<dyn ControlTransport> = match self.control {
            Some(control) => control,
            None => soap.clone(),
        };
        let event_transport: Arc<dyn EventTransport> = match self.events {
            Some(events) => events,
            None => soap,
        };

        let registry = Arc::new(IdentityRegistry::new());
        let hub = Arc::new(EventHub::new());
        let resolver = Arc::new(DescriptionResolver::new(
            fetcher,
            Arc::clone(&registry),
            Arc::clone(&hub),
        ));
        let liveness = Arc::new(LivenessMonitor::new(
            Arc::clone(&registry),
            Arc::clone(&resolver),
            Arc::clone(&hub),
        ));
        let listener = DiscoveryListener::new(
            Arc::clone(&registry),
            Arc::clone(&liveness),
            Arc::clone(&hub),
        );
        let invoker = ActionInvoker::new(
            control,
            Arc::clone(&resolver),
            Arc::clone(&liveness),
            config.invoke_timeout(),
        );

        let subscription_config = config.subscription_config();
        let (sink, worker): (Arc<dyn NotificationSink>, Option<Arc<EventWorker>>) = match self.sink {
            Some(sink) => (sink, None),
            None => {
                let mut worker = EventWorker::new(subscription_config.clone());
                if let Some(address) = self.bind_address {
                    worker = worker.with_bind_address(address);
                }
                let worker = Arc::new(worker);
                let sink: Arc<dyn NotificationSink> = worker.clone();
                (sink, Some(worker))
            }
        };

        let subscriptions = SubscriptionManager::new(
            event_transport,
            sink,
            Arc::clone(&resolver),
            Arc::clone(&liveness),
            subscription_config,
        );
        if let Some(worker) = &worker {
            worker.attach(&subscriptions);
        }

        Ok(ControlPoint {
            config,
            registry,
            hub,
            resolver,
            liveness,
            listener,
            invoker,
            subscriptions,
            worker,
        })
    }
}
