//! Generic UPnP callback server for receiving event notifications.
//!
//! This crate provides a lightweight HTTP server for handling GENA `NOTIFY`
//! requests. It has no knowledge of devices or services; it only knows
//! subscription IDs.
//!
//! # Overview
//!
//! - [`CallbackServer`]: binds to a local port in a configured range and
//!   accepts `NOTIFY` requests on any path.
//! - [`EventRouter`]: keeps the set of registered subscription IDs and forwards
//!   matching notifications to a channel.
//! - [`NotificationPayload`]: subscription ID, event sequence number and raw
//!   property-set XML of one notification.
//!
//! Notifications for unknown subscription IDs are answered with
//! `412 Precondition Failed`, which tells the device to drop the subscription.
//!
//! # Example
//!
//! ```no_run
//! use callback_server::{CallbackServer, NotificationPayload};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), callback_server::CallbackError> {
//!     let (tx, mut rx) = mpsc::unbounded_channel::<NotificationPayload>();
//!     let server = CallbackServer::new((3400, 3500), tx).await?;
//!
//!     server.router().register("uuid:subscription-123".to_string());
//!
//!     while let Some(notification) = rx.recv().await {
//!         println!("{}: {}", notification.subscription_id, notification.event_xml);
//!     }
//!     server.shutdown().await
//! }
//! ```

mod error;
pub mod router;
mod server;

pub use error::CallbackError;
pub use router::{EventRouter, NotificationPayload};
pub use server::CallbackServer;
