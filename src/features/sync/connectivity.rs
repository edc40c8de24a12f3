//! Network status tracking.
//!
//! A [`ConnectivityMonitor`] keeps the current "is connected" state and
//! broadcasts every notification it receives, redundant ones included.
//! Reconnect listeners run the notifications through an [`EdgeDetector`] so
//! they only fire on a false to true transition.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use super::remote::RemoteStore;

const CHANNEL_CAPACITY: usize = 64;

/// Source of connectivity notifications.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    state: Arc<AtomicBool>,
    tx: broadcast::Sender<bool>,
}

impl ConnectivityMonitor {
    /// Create a monitor with a known initial state.
    #[must_use]
    pub fn new(connected: bool) -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            state: Arc::new(AtomicBool::new(connected)),
            tx,
        }
    }

    /// Publish a notification.
    pub fn set_connected(&self, connected: bool) {
        self.state.store(connected, Ordering::SeqCst);
        // No subscribers is fine; the state above is still updated.
        let _ = self.tx.send(connected);
    }

    /// Latest published state.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.load(Ordering::SeqCst)
    }

    /// Receive future notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}

/// Turns level notifications into "became connected" edges.
#[derive(Debug, Clone, Copy)]
pub struct EdgeDetector {
    connected: bool,
}

impl EdgeDetector {
    /// Start from the last known state.
    #[must_use]
    pub const fn new(connected: bool) -> Self {
        Self { connected }
    }

    /// Record a notification; true only on a false to true transition.
    pub fn observe(&mut self, connected: bool) -> bool {
        let rising = connected && !self.connected;
        self.connected = connected;
        rising
    }
}

/// Run `on_reconnect` on every false to true transition of `monitor`.
///
/// The handler is awaited before the next notification is looked at. The task
/// ends once every clone of the monitor is dropped; aborting the handle
/// unsubscribes early.
pub fn spawn_reconnect_listener<F, Fut>(
    monitor: &ConnectivityMonitor,
    mut on_reconnect: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let mut rx = monitor.subscribe();
    let state = Arc::clone(&monitor.state);
    let mut edges = EdgeDetector::new(state.load(Ordering::SeqCst));

    tokio::spawn(async move {
        loop {
            let connected = match rx.recv().await {
                Ok(connected) => connected,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Missed {skipped} connectivity notification(s)");
                    state.load(Ordering::SeqCst)
                }
                Err(RecvError::Closed) => break,
            };

            if edges.observe(connected) {
                tracing::info!("Connectivity restored");
                on_reconnect().await;
            }
        }
    })
}

/// Poll `remote.ping()` every `interval` and publish the result.
///
/// Aborting the returned handle stops the probe.
pub fn spawn_probe(
    monitor: ConnectivityMonitor,
    remote: Arc<dyn RemoteStore>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let connected = remote.ping().await;
            if connected != monitor.is_connected() {
                tracing::info!(
                    "Connectivity changed: {}",
                    if connected { "online" } else { "offline" }
                );
            }
            monitor.set_connected(connected);
        }
    })
}
