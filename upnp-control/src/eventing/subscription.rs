//! Reference-counted event subscriptions
//!
//! One slot per service. The slot's mutex is held across SUBSCRIBE and
//! UNSUBSCRIBE, which serializes listener changes on one service without
//! blocking any other service.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use xmltree::{Element, XMLNode};

use super::renewal::RenewalTimer;
use crate::config::SubscriptionConfig;
use crate::description::DescriptionResolver;
use crate::error::{ControlPointError, Result};
use crate::liveness::LivenessMonitor;
use crate::proxy::{ServiceKey, ServiceProxy};
use crate::transport::EventTransport;

/// Handle returned by [`SubscriptionManager::add_listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// One evented state variable value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub service: ServiceKey,
    pub variable: String,
    pub value: String,
    pub seq: Option<u32>,
}

pub type StateListener = Arc<dyn Fn(&StateChange) + Send + Sync>;

/// Where devices send notifications
pub trait NotificationSink: Send + Sync {
    /// Callback URL to hand to devices in SUBSCRIBE
    fn callback_url(&self) -> Result<String>;

    /// Start accepting notifications for `sid`
    fn register(&self, sid: &str);

    fn unregister(&self, sid: &str);
}

struct ActiveLease {
    sid: String,
    event_url: String,
    expires_at: Instant,
    last_seq: Option<u32>,
}

struct Registration {
    id: ListenerId,
    variable: String,
    listener: StateListener,
}

struct Slot {
    service: Weak<ServiceProxy>,
    registrations: Vec<Registration>,
    lease: Option<ActiveLease>,
    /// Drained and on its way out of the map; never reused
    retired: bool,
}

/// Outcome of one renewal pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenewalReport {
    pub renewed: usize,
    pub resubscribed: usize,
    pub dropped: usize,
    pub released: usize,
}

pub struct SubscriptionManager {
    transport: Arc<dyn EventTransport>,
    sink: Arc<dyn NotificationSink>,
    resolver: Arc<DescriptionResolver>,
    liveness: Arc<LivenessMonitor>,
    config: SubscriptionConfig,
    slots: DashMap<ServiceKey, Arc<Mutex<Slot>>>,
    by_sid: DashMap<String, ServiceKey>,
    listeners: DashMap<ListenerId, ServiceKey>,
    next_id: AtomicU64,
    renewal: RenewalTimer,
}

impl SubscriptionManager {
    pub fn new(
        transport: Arc<dyn EventTransport>,
        sink: Arc<dyn NotificationSink>,
        resolver: Arc<DescriptionResolver>,
        liveness: Arc<LivenessMonitor>,
        config: SubscriptionConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|manager| Self {
            transport,
            sink,
            resolver,
            liveness,
            renewal: RenewalTimer::new(config.check_interval, manager.clone()),
            config,
            slots: DashMap::new(),
            by_sid: DashMap::new(),
            listeners: DashMap::new(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &SubscriptionConfig {
        &self.config
    }

    /// Timer driving [`renew_due`](Self::renew_due), armed by the first
    /// subscription
    pub fn renewal(&self) -> &RenewalTimer {
        &self.renewal
    }

    /// Listen for changes of `variable` on `service`.
    ///
    /// The first listener on a service subscribes remotely; if that fails
    /// the listener is not added.
    pub fn add_listener(
        &self,
        service: &Arc<ServiceProxy>,
        variable: &str,
        listener: StateListener,
    ) -> Result<ListenerId> {
        if service.is_disposed() {
            return Err(ControlPointError::DeviceGone(service.udn().to_string()));
        }

        let key = service.key().clone();
        let slot = self.slot_for(service);
        let mut guard = slot.lock();
        if guard.retired {
            // A renewal pass released this slot after we looked it up
            drop(guard);
            self.evict(&key, &slot);
            return self.add_listener(service, variable, listener);
        }

        if guard.registrations.is_empty() && guard.lease.is_none() {
            let lease = match self.subscribe(service) {
                Ok(lease) => lease,
                Err(e) => {
                    drop(guard);
                    self.handle_timeout(service, &e);
                    return Err(e);
                }
            };
            guard.lease = Some(lease);
        }

        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        guard.registrations.push(Registration {
            id,
            variable: variable.to_string(),
            listener,
        });
        self.listeners.insert(id, key.clone());

        tracing::debug!(
            service = %key,
            variable = %variable,
            listener = %id,
            ref_count = guard.registrations.len(),
            "listener added"
        );
        Ok(id)
    }

    /// Remove a listener; the last one on a service unsubscribes.
    ///
    /// Returns `false` for an unknown id.
    pub fn remove_listener(&self, id: ListenerId) -> Result<bool> {
        let Some((_, key)) = self.listeners.remove(&id) else {
            return Ok(false);
        };
        let Some(slot) = self.slots.get(&key).map(|s| Arc::clone(&s)) else {
            return Ok(false);
        };

        let mut guard = slot.lock();
        let before = guard.registrations.len();
        guard.registrations.retain(|r| r.id != id);
        if guard.registrations.len() == before {
            return Ok(false);
        }

        tracing::debug!(service = %key, listener = %id, ref_count = guard.registrations.len(), "listener removed");

        if guard.registrations.is_empty() {
            if let Some(lease) = guard.lease.take() {
                self.forget_sid(&lease.sid);
                let service_alive = guard
                    .service
                    .upgrade()
                    .is_some_and(|s| !s.is_disposed());
                if service_alive {
                    if let Err(e) = self.transport.unsubscribe(&lease.event_url, &lease.sid) {
                        tracing::warn!(service = %key, sid = %lease.sid, error = %e, "UNSUBSCRIBE failed");
                    }
                }
            }
        }
        Ok(true)
    }

    /// Number of listeners currently registered on `key`
    pub fn ref_count(&self, key: &ServiceKey) -> usize {
        self.slots
            .get(key)
            .map(|s| s.lock().registrations.len())
            .unwrap_or(0)
    }

    /// Whether a remote subscription is active for `key`
    pub fn is_subscribed(&self, key: &ServiceKey) -> bool {
        self.slots
            .get(key)
            .is_some_and(|s| s.lock().lease.is_some())
    }

    /// Dispatch one notification body to the listeners of its subscription.
    ///
    /// Unknown SIDs and unknown variable names are ignored.
    pub fn deliver(&self, sid: &str, seq: Option<u32>, body: &str) -> usize {
        let Some(key) = self.by_sid.get(sid).map(|k| k.clone()) else {
            tracing::debug!(sid = %sid, "notification for unknown subscription");
            return 0;
        };
        let Some(slot) = self.slots.get(&key).map(|s| Arc::clone(&s)) else {
            return 0;
        };

        let properties = match parse_propertyset(body) {
            Ok(properties) => properties,
            Err(e) => {
                tracing::warn!(service = %key, sid = %sid, error = %e, "unparseable notification");
                return 0;
            }
        };

        let pending: Vec<(StateListener, StateChange)> = {
            let mut guard = slot.lock();
            match guard.lease.as_mut() {
                Some(lease) if lease.sid == sid => {
                    if let (Some(previous), Some(current)) = (lease.last_seq, seq) {
                        let expected = if previous == u32::MAX { 1 } else { previous + 1 };
                        if current != expected && current != 0 {
                            tracing::warn!(
                                service = %key,
                                expected,
                                received = current,
                                "event sequence gap"
                            );
                        }
                    }
                    if seq.is_some() {
                        lease.last_seq = seq;
                    }
                }
                _ => return 0,
            }

            properties
                .into_iter()
                .flat_map(|(variable, value)| {
                    guard
                        .registrations
                        .iter()
                        .filter(|r| r.variable == variable)
                        .map(|r| {
                            (
                                Arc::clone(&r.listener),
                                StateChange {
                                    service: key.clone(),
                                    variable: variable.clone(),
                                    value: value.clone(),
                                    seq,
                                },
                            )
                        })
                        .collect::<Vec<_>>()
                })
                .collect()
        };

        for (listener, change) in &pending {
            listener(change);
        }
        pending.len()
    }

    /// Renew leases close to expiry and resubscribe services that lost
    /// theirs. Called periodically by the renewal timer.
    pub fn renew_due(&self, now: Instant) -> RenewalReport {
        let mut report = RenewalReport::default();
        let slots: Vec<(ServiceKey, Arc<Mutex<Slot>>)> = self
            .slots
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        for (key, slot) in slots {
            let mut guard = slot.lock();
            if guard.retired {
                continue;
            }

            let Some(service) = guard.service.upgrade().filter(|s| !s.is_disposed()) else {
                if let Some(lease) = guard.lease.take() {
                    self.forget_sid(&lease.sid);
                }
                for registration in guard.registrations.drain(..) {
                    self.listeners.remove(&registration.id);
                }
                guard.retired = true;
                drop(guard);
                self.evict(&key, &slot);
                tracing::debug!(service = %key, "released subscriptions of disposed service");
                report.released += 1;
                continue;
            };

            if guard.registrations.is_empty() {
                continue;
            }

            let remaining = guard
                .lease
                .as_ref()
                .map(|lease| lease.expires_at.saturating_duration_since(now));
            if remaining.is_some_and(|r| r > self.config.renewal_margin) {
                continue;
            }

            let outcome = match guard.lease.as_mut() {
                Some(lease) => self
                    .transport
                    .renew(&lease.event_url, &lease.sid, self.config.lease)
                    .map(|granted| {
                        lease.expires_at = now + granted;
                        tracing::debug!(
                            service = %key,
                            sid = %lease.sid,
                            granted_secs = granted.as_secs(),
                            "lease renewed"
                        );
                        report.renewed += 1;
                    }),
                None => self.subscribe(&service).map(|lease| {
                    guard.lease = Some(lease);
                    report.resubscribed += 1;
                }),
            };

            let Err(error) = outcome else {
                continue;
            };

            if let Some(lease) = guard.lease.take() {
                self.forget_sid(&lease.sid);
                report.dropped += 1;
            }
            drop(guard);

            tracing::warn!(service = %key, error = %error, "subscription maintenance failed");
            self.handle_timeout(&service, &error);
        }

        report
    }

    /// Cancel every active subscription. Listeners stay registered.
    pub fn unsubscribe_all(&self) {
        let slots: Vec<Arc<Mutex<Slot>>> = self.slots.iter().map(|e| Arc::clone(e.value())).collect();
        for slot in slots {
            let mut guard = slot.lock();
            if let Some(lease) = guard.lease.take() {
                self.forget_sid(&lease.sid);
                if let Err(e) = self.transport.unsubscribe(&lease.event_url, &lease.sid) {
                    tracing::debug!(sid = %lease.sid, error = %e, "UNSUBSCRIBE during shutdown failed");
                }
            }
        }
    }

    fn slot_for(&self, service: &Arc<ServiceProxy>) -> Arc<Mutex<Slot>> {
        let entry = self.slots.entry(service.key().clone()).or_insert_with(|| {
            Arc::new(Mutex::new(Slot {
                service: Arc::downgrade(service),
                registrations: Vec::new(),
                lease: None,
                retired: false,
            }))
        });
        let slot = Arc::clone(entry.value());
        drop(entry);

        // A slot left behind by an earlier, now disposed proxy is rebound
        let mut guard = slot.lock();
        let stale = guard
            .service
            .upgrade()
            .map_or(true, |s| !Arc::ptr_eq(&s, service));
        if stale && !guard.retired {
            if let Some(lease) = guard.lease.take() {
                self.forget_sid(&lease.sid);
            }
            for registration in guard.registrations.drain(..) {
                self.listeners.remove(&registration.id);
            }
            guard.service = Arc::downgrade(service);
        }
        drop(guard);
        slot
    }

    /// Drop `slot` from the map unless a fresh slot already replaced it
    fn evict(&self, key: &ServiceKey, slot: &Arc<Mutex<Slot>>) {
        self.slots.remove_if(key, |_, current| Arc::ptr_eq(current, slot));
    }

    fn subscribe(&self, service: &Arc<ServiceProxy>) -> Result<ActiveLease> {
        let event_url = match service.event_sub_url() {
            Some(url) => url,
            None => {
                let device = service
                    .device()
                    .ok_or_else(|| ControlPointError::DeviceGone(service.udn().to_string()))?;
                self.resolver.resolve_device(&device)?;
                service.event_sub_url().ok_or_else(|| {
                    ControlPointError::Subscription(format!("{} has no event URL", service.key()))
                })?
            }
        };

        let callback_url = self.sink.callback_url()?;
        let lease = self
            .transport
            .subscribe(&event_url, &callback_url, self.config.lease)?;

        self.by_sid.insert(lease.sid.clone(), service.key().clone());
        self.sink.register(&lease.sid);
        self.renewal.arm();
        tracing::info!(
            service = %service.key(),
            sid = %lease.sid,
            lease_secs = lease.duration.as_secs(),
            "subscribed"
        );

        Ok(ActiveLease {
            sid: lease.sid,
            event_url,
            expires_at: Instant::now() + lease.duration,
            last_seq: None,
        })
    }

    fn forget_sid(&self, sid: &str) {
        self.by_sid.remove(sid);
        self.sink.unregister(sid);
    }

    fn handle_timeout(&self, service: &Arc<ServiceProxy>, error: &ControlPointError) {
        if !matches!(error, ControlPointError::Timeout(_)) {
            return;
        }
        if let Some(device) = service.device() {
            self.liveness.reverify_or_dispose(&device);
        }
    }
}

/// Lease remaining before `renewal_margin` is reached, for scheduling
pub fn renewal_due_in(expires_at: Instant, now: Instant, margin: Duration) -> Duration {
    expires_at
        .saturating_duration_since(now)
        .saturating_sub(margin)
}

/// Parse a GENA `propertyset` body into `(name, value)` pairs in document
/// order.
pub fn parse_propertyset(body: &str) -> Result<Vec<(String, String)>> {
    let root = Element::parse(body.as_bytes())
        .map_err(|e| ControlPointError::Parse(format!("Invalid propertyset: {}", e)))?;
    if root.name != "propertyset" {
        return Err(ControlPointError::Parse(format!(
            "Expected propertyset, found {}",
            root.name
        )));
    }

    Ok(root
        .children
        .iter()
        .filter_map(XMLNode::as_element)
        .filter(|e| e.name == "property")
        .flat_map(|property| property.children.iter().filter_map(XMLNode::as_element))
        .map(|variable| {
            (
                variable.name.clone(),
                variable.get_text().map(|t| t.into_owned()).unwrap_or_default(),
            )
        })
        .collect())
}
