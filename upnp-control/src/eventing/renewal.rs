//! Lease renewal timer
//!
//! A plain thread that wakes every check interval and runs a renewal pass.
//! It is armed by the first successful SUBSCRIBE and runs whatever sink
//! receives the notifications.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::subscription::SubscriptionManager;

/// Commands sent to the renewal thread
#[derive(Debug)]
pub enum Command {
    /// Run a renewal pass now instead of waiting for the next tick
    CheckLeases,
    /// Exit the thread
    Shutdown,
}

struct Running {
    command_tx: mpsc::Sender<Command>,
    handle: JoinHandle<()>,
}

pub struct RenewalTimer {
    interval: Duration,
    manager: Weak<SubscriptionManager>,
    running: Mutex<Option<Running>>,
}

impl RenewalTimer {
    pub(crate) fn new(interval: Duration, manager: Weak<SubscriptionManager>) -> Self {
        Self {
            interval,
            manager,
            running: Mutex::new(None),
        }
    }

    pub fn is_armed(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Start the timer thread if it is not running yet
    pub fn arm(&self) {
        let mut running = self.running.lock();
        if running.is_some() {
            return;
        }

        let (command_tx, command_rx) = mpsc::channel();
        let interval = self.interval;
        let manager = self.manager.clone();
        let spawned = thread::Builder::new()
            .name("upnp-renewal".to_string())
            .spawn(move || run_renewal_loop(interval, manager, command_rx));

        match spawned {
            Ok(handle) => {
                tracing::debug!(interval_secs = interval.as_secs(), "renewal timer armed");
                *running = Some(Running { command_tx, handle });
            }
            Err(e) => tracing::error!(error = %e, "failed to spawn renewal thread"),
        }
    }

    /// Ask for an immediate renewal pass
    pub fn check_leases(&self) {
        if let Some(running) = self.running.lock().as_ref() {
            let _ = running.command_tx.send(Command::CheckLeases);
        }
    }

    /// Stop the timer thread and wait for it to exit
    pub fn shutdown(&self) {
        let Some(running) = self.running.lock().take() else {
            return;
        };
        let _ = running.command_tx.send(Command::Shutdown);
        if running.handle.thread().id() == thread::current().id() {
            return;
        }
        if running.handle.join().is_err() {
            tracing::error!("renewal thread panicked");
        }
    }
}

impl Drop for RenewalTimer {
    fn drop(&mut self) {
        // The manager may be released on the timer thread itself, so no join
        if let Some(running) = self.running.get_mut().take() {
            let _ = running.command_tx.send(Command::Shutdown);
        }
    }
}

fn run_renewal_loop(
    interval: Duration,
    manager: Weak<SubscriptionManager>,
    command_rx: mpsc::Receiver<Command>,
) {
    loop {
        match command_rx.recv_timeout(interval) {
            Ok(Command::CheckLeases) | Err(RecvTimeoutError::Timeout) => {}
            Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
        }

        let Some(manager) = manager.upgrade() else {
            break;
        };
        renewal_pass(&manager);
    }
    tracing::debug!("renewal timer stopped");
}

fn renewal_pass(manager: &Arc<SubscriptionManager>) {
    let report = manager.renew_due(Instant::now());
    if report != Default::default() {
        tracing::debug!(?report, "renewal pass");
    }
}
