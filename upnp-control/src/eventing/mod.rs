//! GENA event subscriptions and notification delivery

mod renewal;
mod subscription;
mod worker;

pub use renewal::{Command, RenewalTimer};
pub use subscription::{
    parse_propertyset, renewal_due_in, ListenerId, NotificationSink, RenewalReport, StateChange,
    StateListener, SubscriptionManager,
};
pub use worker::EventWorker;
