//! Offline writes and cached reads.
//!
//! Writes made while the backend is unreachable are queued durably and
//! replayed in order once connectivity returns. Reads are served from the
//! last snapshot fetched for each collection.
//!
//! Features:
//! - Durable queue of insert/update/delete operations
//! - Drain on startup, on reconnect, and after enqueue while online
//! - Retry with capped exponential backoff per replayed operation
//! - Per-collection cache with a last-sync marker

pub mod cache;
pub mod connectivity;
pub mod executor;
pub mod operation;
pub mod queue;
pub mod remote;
pub mod retry;
pub mod service;

pub use cache::{CacheEntry, CacheStore};
pub use connectivity::{ConnectivityMonitor, EdgeDetector};
pub use executor::{format_drain_report, DrainReport, ExecutionResult};
pub use operation::{collections, Collection, OperationKind, Payload, PendingOperation, Record};
pub use queue::SyncQueue;
pub use remote::{FetchQuery, RemoteStore, RestRemoteStore, Unconfigured};
pub use retry::{with_retry, RetryPolicy};
pub use service::OfflineSync;
