//! Event routing for HTTP callback notifications.
//!
//! The `EventRouter` maintains the set of active subscription IDs and forwards
//! incoming GENA notifications for those IDs to a channel.

use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Unparsed notification received via HTTP callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationPayload {
    /// The subscription ID from the `SID` header
    pub subscription_id: String,
    /// Event key from the `SEQ` header, when present and numeric
    pub seq: Option<u32>,
    /// The raw property-set XML body
    pub event_xml: String,
}

/// Routes notifications from HTTP callbacks to a channel.
#[derive(Clone)]
pub struct EventRouter {
    subscriptions: Arc<RwLock<HashSet<String>>>,
    event_sender: mpsc::UnboundedSender<NotificationPayload>,
}

impl EventRouter {
    /// Create a new event router.
    ///
    /// ```
    /// use tokio::sync::mpsc;
    /// use callback_server::router::{EventRouter, NotificationPayload};
    ///
    /// let (tx, _rx) = mpsc::unbounded_channel::<NotificationPayload>();
    /// let router = EventRouter::new(tx);
    /// ```
    pub fn new(event_sender: mpsc::UnboundedSender<NotificationPayload>) -> Self {
        Self {
            subscriptions: Arc::new(RwLock::new(HashSet::new())),
            event_sender,
        }
    }

    /// Register a subscription ID for event routing.
    ///
    /// Registration is synchronous so a subscriber can make the SID routable
    /// immediately after the SUBSCRIBE response, before the initial event
    /// arrives.
    pub fn register(&self, subscription_id: String) {
        tracing::debug!(sid = %subscription_id, "registering subscription for routing");
        self.subscriptions.write().insert(subscription_id);
    }

    /// Unregister a subscription ID.
    pub fn unregister(&self, subscription_id: &str) {
        self.subscriptions.write().remove(subscription_id);
    }

    /// Whether a subscription ID is currently routed
    pub fn is_registered(&self, subscription_id: &str) -> bool {
        self.subscriptions.read().contains(subscription_id)
    }

    /// Route an incoming notification to the channel.
    ///
    /// Returns `false` if the subscription ID is not registered; the payload is
    /// dropped in that case.
    pub fn route_event(&self, subscription_id: String, seq: Option<u32>, event_xml: String) -> bool {
        if !self.is_registered(&subscription_id) {
            return false;
        }

        let payload = NotificationPayload {
            subscription_id,
            seq,
            event_xml,
        };
        if self.event_sender.send(payload).is_err() {
            tracing::warn!("notification receiver dropped; event discarded");
        }
        true
    }
}
