//! Discovery events and the blocking iterator that delivers them
//!
//! Every subscriber gets its own channel, so a slow consumer never blocks
//! the announcement path or other consumers.

use std::fmt;
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use crate::proxy::{DeviceProxy, ServiceProxy};

/// Identity changes reported by the control point
#[derive(Clone)]
pub enum DiscoveryEvent {
    DeviceAdded(Arc<DeviceProxy>),
    DeviceRemoved(Arc<DeviceProxy>),
    ServiceAdded(Arc<ServiceProxy>),
    ServiceRemoved(Arc<ServiceProxy>),
}

impl DiscoveryEvent {
    /// UDN of the device the event concerns
    pub fn udn(&self) -> &str {
        match self {
            DiscoveryEvent::DeviceAdded(d) | DiscoveryEvent::DeviceRemoved(d) => d.udn(),
            DiscoveryEvent::ServiceAdded(s) | DiscoveryEvent::ServiceRemoved(s) => s.udn(),
        }
    }

    pub fn is_added(&self) -> bool {
        matches!(self, DiscoveryEvent::DeviceAdded(_) | DiscoveryEvent::ServiceAdded(_))
    }
}

impl fmt::Debug for DiscoveryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryEvent::DeviceAdded(d) => write!(f, "DeviceAdded({})", d.udn()),
            DiscoveryEvent::DeviceRemoved(d) => write!(f, "DeviceRemoved({})", d.udn()),
            DiscoveryEvent::ServiceAdded(s) => write!(f, "ServiceAdded({})", s.key()),
            DiscoveryEvent::ServiceRemoved(s) => write!(f, "ServiceRemoved({})", s.key()),
        }
    }
}

/// Fan-out of discovery events to any number of subscribers
#[derive(Default)]
pub struct EventHub {
    senders: parking_lot::Mutex<Vec<mpsc::Sender<DiscoveryEvent>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new event stream. Only events published after this call are
    /// delivered.
    pub fn subscribe(&self) -> DiscoveryEvents {
        let (tx, rx) = mpsc::channel();
        self.senders.lock().push(tx);
        DiscoveryEvents::new(Arc::new(Mutex::new(rx)))
    }

    pub fn publish(&self, event: DiscoveryEvent) {
        tracing::trace!(?event, "publishing discovery event");
        self.senders.lock().retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn publish_all(&self, events: &[DiscoveryEvent]) {
        for event in events {
            self.publish(event.clone());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.senders.lock().len()
    }
}

/// Blocking iterator over discovery events
///
/// `next()` blocks until an event arrives or the control point is dropped.
/// Use `try_recv()` or `try_iter()` to poll.
pub struct DiscoveryEvents {
    rx: Arc<Mutex<mpsc::Receiver<DiscoveryEvent>>>,
}

impl DiscoveryEvents {
    pub(crate) fn new(rx: Arc<Mutex<mpsc::Receiver<DiscoveryEvent>>>) -> Self {
        Self { rx }
    }

    /// Block until an event is available
    ///
    /// Returns `None` if the channel is closed.
    pub fn recv(&self) -> Option<DiscoveryEvent> {
        self.rx.lock().ok()?.recv().ok()
    }

    pub fn try_recv(&self) -> Option<DiscoveryEvent> {
        self.rx.lock().ok()?.try_recv().ok()
    }

    /// Returns `None` if the timeout expires or the channel is closed.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<DiscoveryEvent> {
        self.rx.lock().ok()?.recv_timeout(timeout).ok()
    }

    /// Non-blocking iterator over currently queued events
    pub fn try_iter(&self) -> TryIter<'_> {
        TryIter { inner: self }
    }
}

impl Iterator for DiscoveryEvents {
    type Item = DiscoveryEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv()
    }
}

impl Clone for DiscoveryEvents {
    fn clone(&self) -> Self {
        Self {
            rx: Arc::clone(&self.rx),
        }
    }
}

pub struct TryIter<'a> {
    inner: &'a DiscoveryEvents,
}

impl<'a> Iterator for TryIter<'a> {
    type Item = DiscoveryEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.try_recv()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_subscriber_receives_events() {
        let hub = EventHub::new();
        let first = hub.subscribe();
        let second = hub.subscribe();

        let device = Arc::new(DeviceProxy::new("uuid:a"));
        hub.publish(DiscoveryEvent::DeviceAdded(device));

        assert_eq!(first.try_recv().map(|e| e.udn().to_string()).as_deref(), Some("uuid:a"));
        assert!(second.try_recv().is_some_and(|e| e.is_added()));
        assert!(first.try_recv().is_none());
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let hub = EventHub::new();
        let kept = hub.subscribe();
        drop(hub.subscribe());
        assert_eq!(hub.subscriber_count(), 2);

        hub.publish(DiscoveryEvent::DeviceRemoved(Arc::new(DeviceProxy::new("uuid:a"))));
        assert_eq!(hub.subscriber_count(), 1);
        assert_eq!(kept.try_iter().count(), 1);
    }

    #[test]
    fn test_recv_timeout_empty() {
        let hub = EventHub::new();
        let events = hub.subscribe();
        let start = std::time::Instant::now();
        assert!(events.recv_timeout(Duration::from_millis(50)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(45));
    }
}
