//! Durable queue of writes waiting for the remote store.
//!
//! The whole queue is serialized as one JSON array under [`SYNC_QUEUE_KEY`]
//! and rewritten after every change. A drain pass moves the queued operations
//! into an in-flight batch and replays it one operation at a time; failures go
//! back to the tail. At most one drain pass runs at any moment.
//!
//! The persisted array is the in-flight batch followed by the queue, so an
//! operation leaves durable storage only once the remote store has confirmed
//! it or it has been re-queued. A pass that is cancelled or crashes leaves its
//! unconfirmed operations in place and the next pass starts with them.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use super::connectivity::{self, ConnectivityMonitor};
use super::executor::{self, DrainReport};
use super::operation::{Collection, Payload, PendingOperation};
use super::remote::RemoteStore;
use super::retry::RetryPolicy;
use crate::error::RallyError;
use crate::storage::KeyValueStore;

/// Key of the persisted queue.
pub const SYNC_QUEUE_KEY: &str = "syncQueue";

#[derive(Debug, Default)]
struct QueueState {
    /// Taken by the current (or an interrupted) pass, not yet confirmed.
    in_flight: VecDeque<PendingOperation>,
    ops: Vec<PendingOperation>,
    last_enqueued_at: Option<DateTime<Utc>>,
}

impl QueueState {
    fn len(&self) -> usize {
        self.in_flight.len() + self.ops.len()
    }

    /// Every unconfirmed operation, in replay order.
    fn all(&self) -> Vec<PendingOperation> {
        self.in_flight.iter().chain(&self.ops).cloned().collect()
    }
}

struct Inner {
    state: Mutex<QueueState>,
    drain_lock: tokio::sync::Mutex<()>,
    drain_requested: AtomicBool,
    background: Mutex<Vec<JoinHandle<DrainReport>>>,
    store: Arc<dyn KeyValueStore>,
    remote: Arc<dyn RemoteStore>,
    connectivity: ConnectivityMonitor,
    policy: RetryPolicy,
}

/// Sync queue for offline writes. Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct SyncQueue {
    inner: Arc<Inner>,
}

impl SyncQueue {
    /// Open the queue, loading whatever was persisted by a previous run.
    ///
    /// A persisted queue that cannot be read or parsed is logged and treated
    /// as empty.
    #[must_use]
    pub fn open(
        store: Arc<dyn KeyValueStore>,
        remote: Arc<dyn RemoteStore>,
        connectivity: ConnectivityMonitor,
        policy: RetryPolicy,
    ) -> Self {
        let ops = load(store.as_ref());
        let last_enqueued_at = ops.iter().map(|op| op.enqueued_at).max();

        if !ops.is_empty() {
            tracing::info!("Loaded {} pending operation(s)", ops.len());
        }

        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState {
                    in_flight: VecDeque::new(),
                    ops,
                    last_enqueued_at,
                }),
                drain_lock: tokio::sync::Mutex::new(()),
                drain_requested: AtomicBool::new(false),
                background: Mutex::new(Vec::new()),
                store,
                remote,
                connectivity,
                policy,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, state: &QueueState) -> Result<(), RallyError> {
        let json = serde_json::to_string(&state.all())?;
        self.inner
            .store
            .set_item(SYNC_QUEUE_KEY, &json)
            .map_err(|e| RallyError::Persistence(e.to_string()))
    }

    fn persist_or_log(&self, state: &QueueState) {
        if let Err(e) = self.persist(state) {
            tracing::warn!("Error saving sync queue: {e}");
        }
    }

    /// Whether the connectivity monitor currently reports a connection.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.inner.connectivity.is_connected()
    }

    /// Append a write and persist the queue.
    ///
    /// When online, a drain is started in the background; this call does not
    /// wait for it. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `RallyError::Persistence` if the queue could not be saved. The
    /// operation is still queued in memory and will be replayed by this
    /// process, but would be lost on restart.
    pub async fn enqueue(
        &self,
        collection: Collection,
        payload: Payload,
    ) -> Result<PendingOperation, RallyError> {
        let op = {
            let mut state = self.state();
            let mut op = PendingOperation::new(collection, payload);
            if let Some(last) = state.last_enqueued_at {
                op.enqueued_at = op.enqueued_at.max(last);
            }
            state.last_enqueued_at = Some(op.enqueued_at);
            state.ops.push(op.clone());
            self.persist(&state)?;
            op
        };

        tracing::debug!("Queued {}", op.describe());

        if self.is_online() {
            let queue = self.clone();
            let handle = tokio::spawn(async move { queue.drain().await });
            let mut background = self
                .inner
                .background
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            background.retain(|h| !h.is_finished());
            background.push(handle);
        }

        Ok(op)
    }

    /// Wait for drains started by [`Self::enqueue`] and merge their reports.
    pub async fn settle(&self) -> DrainReport {
        let handles = std::mem::take(
            &mut *self
                .inner
                .background
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );

        let mut report = DrainReport::default();
        for handle in handles {
            match handle.await {
                Ok(pass) => {
                    report.merge(pass);
                }
                Err(e) => tracing::warn!("Background drain did not finish: {e}"),
            }
        }
        report
    }

    /// Replay every queued operation against the remote store.
    ///
    /// Passes never overlap. A call made while a pass is running returns at
    /// once with `coalesced` set, and the running drain performs one more
    /// pass when it finishes. Errors are contained: failed operations are
    /// re-queued at the tail and logged.
    pub async fn drain(&self) -> DrainReport {
        let mut report = DrainReport::default();
        let mut passes = 0;
        self.inner.drain_requested.store(true, Ordering::SeqCst);

        loop {
            let Ok(guard) = self.inner.drain_lock.try_lock() else {
                report.coalesced = passes == 0;
                return report;
            };

            while self.inner.drain_requested.swap(false, Ordering::SeqCst) {
                report.merge(self.drain_pass().await);
                passes += 1;
            }
            drop(guard);

            // A request that lost the race for the lock after our last check
            // is picked up here.
            if !self.inner.drain_requested.load(Ordering::SeqCst) {
                return report;
            }
        }
    }

    async fn drain_pass(&self) -> DrainReport {
        let mut report = DrainReport::default();

        if !self.is_online() {
            report.offline = true;
            return report;
        }

        // The persisted order is already in-flight then queued, so moving the
        // queue behind the in-flight batch needs no write.
        let batch = {
            let mut state = self.state();
            let queued = std::mem::take(&mut state.ops);
            state.in_flight.extend(queued);
            state.in_flight.len()
        };
        if batch == 0 {
            return report;
        }

        tracing::info!("Syncing {batch} queued operation(s)");

        loop {
            let Some(op) = self.state().in_flight.front().cloned() else {
                break;
            };

            let outcome =
                executor::replay(self.inner.remote.as_ref(), self.inner.policy, &op).await;

            let mut state = self.state();
            // A clear() while the call was out leaves nothing to settle.
            if state.in_flight.front() != Some(&op) {
                break;
            }
            state.in_flight.pop_front();

            match outcome {
                Ok(()) => {
                    tracing::debug!("Applied {}", op.describe());
                    report.add(executor::execution_result(&op, None));
                }
                Err(e) => {
                    tracing::warn!("Error syncing {}: {e}; re-queued", op.describe());
                    report.add(executor::execution_result(&op, Some(&e)));
                    state.ops.push(op);
                }
            }
            self.persist_or_log(&state);
        }

        tracing::info!(
            "Sync pass finished: {} applied, {} re-queued",
            report.applied,
            report.requeued
        );
        report
    }

    /// Number of operations not yet confirmed by the remote store.
    ///
    /// Operations a running pass has taken but not settled still count.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state().len()
    }

    /// Copy of the unconfirmed operations, in replay order.
    #[must_use]
    pub fn pending(&self) -> Vec<PendingOperation> {
        self.state().all()
    }

    /// Enqueue time of the oldest unconfirmed operation.
    #[must_use]
    pub fn oldest_pending(&self) -> Option<DateTime<Utc>> {
        let state = self.state();
        state
            .in_flight
            .iter()
            .chain(&state.ops)
            .map(|op| op.enqueued_at)
            .min()
    }

    /// Drop every waiting operation.
    ///
    /// # Errors
    ///
    /// Returns an error if the emptied queue cannot be persisted.
    pub fn clear(&self) -> Result<usize, RallyError> {
        let mut state = self.state();
        let count = state.len();
        state.in_flight.clear();
        state.ops.clear();
        self.persist(&state)?;

        tracing::info!("Cleared {count} pending operation(s)");
        Ok(count)
    }

    /// Wait for a running drain pass to finish and keep new passes from
    /// starting while the guard is held.
    pub async fn quiesce(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.inner.drain_lock.lock().await
    }

    /// Drain on every reconnect reported by `monitor`.
    ///
    /// Aborting the returned handle unsubscribes. Aborting it mid-pass loses
    /// nothing: unconfirmed operations stay queued.
    pub fn spawn_reconnect_listener(&self, monitor: &ConnectivityMonitor) -> JoinHandle<()> {
        let queue = self.clone();
        connectivity::spawn_reconnect_listener(monitor, move || {
            let queue = queue.clone();
            async move {
                queue.drain().await;
            }
        })
    }
}

fn load(store: &dyn KeyValueStore) -> Vec<PendingOperation> {
    let raw = match store.get_item(SYNC_QUEUE_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(e) => {
            tracing::error!("Error loading sync queue: {e}");
            return Vec::new();
        }
    };

    match serde_json::from_str(&raw) {
        Ok(ops) => ops,
        Err(e) => {
            tracing::error!("Discarding corrupt sync queue ({e}): {raw}");
            Vec::new()
        }
    }
}
