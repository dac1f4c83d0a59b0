//! Background worker for eventing
//!
//! Spawns a thread with its own tokio runtime that hosts the callback
//! server, while the subscription manager keeps a blocking API.
//! Notifications are handed to a separate dispatch thread so listener
//! callbacks never stall the HTTP server and arrive in order.

use std::net::IpAddr;
use std::sync::{mpsc, Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use callback_server::{CallbackServer, EventRouter, NotificationPayload};
use parking_lot::Mutex;

use super::subscription::{NotificationSink, SubscriptionManager};
use crate::config::SubscriptionConfig;
use crate::error::{ControlPointError, Result};

const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(20);

struct Running {
    router: Arc<EventRouter>,
    callback_url: String,
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// Notification sink backed by the worker's callback server.
///
/// The worker starts on the first request for a callback URL, so a control
/// point that never subscribes never opens a port.
pub struct EventWorker {
    config: SubscriptionConfig,
    bind_address: Option<IpAddr>,
    manager: Mutex<Weak<SubscriptionManager>>,
    running: Mutex<Option<Running>>,
}

impl EventWorker {
    pub fn new(config: SubscriptionConfig) -> Self {
        Self {
            config,
            bind_address: None,
            manager: Mutex::new(Weak::new()),
            running: Mutex::new(None),
        }
    }

    /// Bind the callback server to `address` instead of the detected LAN
    /// address
    pub fn with_bind_address(mut self, address: IpAddr) -> Self {
        self.bind_address = Some(address);
        self
    }

    /// Connect the manager that receives notifications
    pub fn attach(&self, manager: &Arc<SubscriptionManager>) {
        *self.manager.lock() = Arc::downgrade(manager);
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Stop the worker and wait for it to exit
    pub fn shutdown(&self) {
        let Some(running) = self.running.lock().take() else {
            return;
        };
        let _ = running.shutdown_tx.send(());
        if running.handle.join().is_err() {
            tracing::error!("event worker panicked");
        }
    }

    fn ensure_started(&self) -> Result<String> {
        let mut running = self.running.lock();
        if let Some(r) = running.as_ref() {
            return Ok(r.callback_url.clone());
        }

        let (shutdown_tx, shutdown_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let handle = spawn_event_worker(
            self.config.clone(),
            self.bind_address,
            self.manager.lock().clone(),
            shutdown_rx,
            ready_tx,
        );

        let (router, callback_url) = match ready_rx.recv_timeout(STARTUP_TIMEOUT) {
            Ok(Ok(ready)) => ready,
            Ok(Err(reason)) => return Err(ControlPointError::Subscription(reason)),
            Err(_) => {
                let _ = shutdown_tx.send(());
                return Err(ControlPointError::Subscription(
                    "Event worker did not start in time".to_string(),
                ));
            }
        };

        tracing::info!(callback_url = %callback_url, "event worker started");
        *running = Some(Running {
            router,
            callback_url: callback_url.clone(),
            shutdown_tx,
            handle,
        });
        Ok(callback_url)
    }
}

impl NotificationSink for EventWorker {
    fn callback_url(&self) -> Result<String> {
        self.ensure_started()
    }

    fn register(&self, sid: &str) {
        if let Some(running) = self.running.lock().as_ref() {
            running.router.register(sid.to_string());
        }
    }

    fn unregister(&self, sid: &str) {
        if let Some(running) = self.running.lock().as_ref() {
            running.router.unregister(sid);
        }
    }
}

impl Drop for EventWorker {
    fn drop(&mut self) {
        // The last reference may be released on a worker thread, so no join
        if let Some(running) = self.running.get_mut().take() {
            let _ = running.shutdown_tx.send(());
        }
    }
}

type Ready = std::result::Result<(Arc<EventRouter>, String), String>;

fn spawn_event_worker(
    config: SubscriptionConfig,
    bind_address: Option<IpAddr>,
    manager: Weak<SubscriptionManager>,
    shutdown_rx: mpsc::Receiver<()>,
    ready_tx: mpsc::Sender<Ready>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let rt = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                let _ = ready_tx.send(Err(format!("Failed to create tokio runtime: {}", e)));
                return;
            }
        };

        rt.block_on(run_event_loop(config, bind_address, manager, shutdown_rx, ready_tx));
    })
}

async fn run_event_loop(
    config: SubscriptionConfig,
    bind_address: Option<IpAddr>,
    manager: Weak<SubscriptionManager>,
    shutdown_rx: mpsc::Receiver<()>,
    ready_tx: mpsc::Sender<Ready>,
) {
    let (notify_tx, mut notify_rx) = tokio::sync::mpsc::unbounded_channel();
    let started = match bind_address {
        Some(address) => {
            CallbackServer::with_address(config.callback_port_range, address, notify_tx).await
        }
        None => CallbackServer::new(config.callback_port_range, notify_tx).await,
    };
    let server = match started {
        Ok(server) => server,
        Err(e) => {
            let _ = ready_tx.send(Err(format!("Failed to start callback server: {}", e)));
            return;
        }
    };
    if ready_tx
        .send(Ok((Arc::clone(server.router()), format!("{}/notify", server.base_url()))))
        .is_err()
    {
        return;
    }

    let dispatch_tx = spawn_dispatcher(manager);

    loop {
        tokio::select! {
            notification = notify_rx.recv() => {
                let Some(notification) = notification else {
                    break;
                };
                if dispatch_tx.send(notification).is_err() {
                    tracing::debug!("dispatcher gone, shutting down worker");
                    break;
                }
            }

            _ = tokio::time::sleep(SHUTDOWN_POLL_INTERVAL) => {
                match shutdown_rx.try_recv() {
                    Ok(()) | Err(mpsc::TryRecvError::Disconnected) => {
                        tracing::info!("event worker received shutdown");
                        break;
                    }
                    Err(mpsc::TryRecvError::Empty) => {}
                }
            }
        }
    }

    if let Err(e) = server.shutdown().await {
        tracing::warn!("callback server shutdown failed: {}", e);
    }
    tracing::info!("event worker shut down");
}

fn spawn_dispatcher(manager: Weak<SubscriptionManager>) -> mpsc::Sender<NotificationPayload> {
    let (tx, rx) = mpsc::channel::<NotificationPayload>();
    thread::spawn(move || {
        for notification in rx {
            let Some(manager) = manager.upgrade() else {
                break;
            };
            manager.deliver(
                &notification.subscription_id,
                notification.seq,
                &notification.event_xml,
            );
        }
    });
    tx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_starts_lazily_and_shuts_down() {
        let config = SubscriptionConfig {
            callback_port_range: (53000, 53100),
            ..Default::default()
        };
        let worker = EventWorker::new(config).with_bind_address(IpAddr::from([127, 0, 0, 1]));
        assert!(!worker.is_running());

        let url = worker.callback_url().unwrap();
        assert!(url.starts_with("http://127.0.0.1:"));
        assert!(worker.is_running());
        assert_eq!(worker.callback_url().unwrap(), url);

        worker.shutdown();
        assert!(!worker.is_running());
    }
}
