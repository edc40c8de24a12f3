//! Application-facing entry point for offline sync.
//!
//! [`OfflineSync`] is constructed once at startup and passed to whatever needs
//! it. It owns the queue, the cache, the connectivity monitor and the
//! background tasks that keep them moving.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::task::JoinHandle;

use super::cache::{CacheEntry, CacheStore};
use super::connectivity::{self, ConnectivityMonitor};
use super::executor::DrainReport;
use super::operation::{Collection, Payload, PendingOperation};
use super::queue::SyncQueue;
use super::remote::{FetchQuery, RemoteStore, RestRemoteStore, Unconfigured};
use super::retry::RetryPolicy;
use crate::config::{Config, Paths};
use crate::error::RallyError;
use crate::storage::{Database, KeyValueStore, SqliteStore};

/// Offline sync facade.
pub struct OfflineSync {
    queue: SyncQueue,
    cache: CacheStore,
    connectivity: ConnectivityMonitor,
    remote: Arc<dyn RemoteStore>,
    probe_interval: Option<Duration>,
    tasks: Vec<JoinHandle<()>>,
}

impl OfflineSync {
    /// Assemble from explicit parts. Starts offline until told otherwise.
    #[must_use]
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        remote: Arc<dyn RemoteStore>,
        connectivity: ConnectivityMonitor,
        policy: RetryPolicy,
    ) -> Self {
        let queue = SyncQueue::open(
            Arc::clone(&store),
            Arc::clone(&remote),
            connectivity.clone(),
            policy,
        );

        Self {
            queue,
            cache: CacheStore::new(store),
            connectivity,
            remote,
            probe_interval: None,
            tasks: Vec::new(),
        }
    }

    /// Open the on-disk store and the configured backend.
    ///
    /// Without a configured URL the remote is [`Unconfigured`] and the system
    /// stays offline.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the HTTP client
    /// cannot be built.
    pub fn open(config: &Config, paths: &Paths) -> Result<Self, RallyError> {
        paths.ensure_dirs()?;
        let store: Arc<dyn KeyValueStore> =
            Arc::new(SqliteStore::new(Database::open_at(&paths.database)?));

        let remote: Arc<dyn RemoteStore> = if config.remote.is_configured() {
            Arc::new(RestRemoteStore::from_config(&config.remote)?)
        } else {
            tracing::debug!("No remote configured; running offline");
            Arc::new(Unconfigured)
        };

        let mut sync = Self::new(
            store,
            remote,
            ConnectivityMonitor::new(false),
            config.sync.retry_policy(),
        );
        sync.probe_interval = Some(config.sync.probe_interval());
        Ok(sync)
    }

    /// Poll the remote every `interval` once started.
    #[must_use]
    pub fn with_probe(mut self, interval: Duration) -> Self {
        self.probe_interval = Some(interval);
        self
    }

    /// Check reachability now and publish the result.
    pub async fn probe(&self) -> bool {
        let online = self.remote.ping().await;
        self.connectivity.set_connected(online);
        online
    }

    /// Start background work: reconnect listener, probe loop, startup drain.
    ///
    /// The listener is installed before the startup drain so a reconnect in
    /// between is not missed.
    pub async fn start(&mut self) -> DrainReport {
        self.shutdown().await;

        if self.probe_interval.is_some() {
            self.probe().await;
        }

        self.tasks
            .push(self.queue.spawn_reconnect_listener(&self.connectivity));

        if let Some(interval) = self.probe_interval {
            self.tasks.push(connectivity::spawn_probe(
                self.connectivity.clone(),
                Arc::clone(&self.remote),
                interval,
            ));
        }

        self.queue.drain().await
    }

    /// Stop every background task.
    ///
    /// A drain pass already running is allowed to finish first.
    pub async fn shutdown(&mut self) {
        if self.tasks.is_empty() {
            return;
        }
        let _idle = self.queue.quiesce().await;
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    fn abort_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    /// Queue a write. See [`SyncQueue::enqueue`].
    ///
    /// # Errors
    ///
    /// Returns an error if the queue could not be persisted.
    pub async fn enqueue(
        &self,
        collection: Collection,
        payload: Payload,
    ) -> Result<PendingOperation, RallyError> {
        self.queue.enqueue(collection, payload).await
    }

    /// Replay queued writes now.
    pub async fn drain(&self) -> DrainReport {
        self.queue.drain().await
    }

    /// Wait for drains that [`Self::enqueue`] started in the background.
    pub async fn settle(&self) -> DrainReport {
        self.queue.settle().await
    }

    /// Number of writes waiting for the remote.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.queue.pending_count()
    }

    /// The waiting writes, in replay order.
    #[must_use]
    pub fn pending(&self) -> Vec<PendingOperation> {
        self.queue.pending()
    }

    #[must_use]
    pub fn oldest_pending(&self) -> Option<DateTime<Utc>> {
        self.queue.oldest_pending()
    }

    /// Drop every waiting write.
    ///
    /// # Errors
    ///
    /// Returns an error if the emptied queue cannot be persisted.
    pub fn clear_queue(&self) -> Result<usize, RallyError> {
        self.queue.clear()
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.connectivity.is_connected()
    }

    #[must_use]
    pub const fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    #[must_use]
    pub fn cache_get(&self, collection: &Collection) -> Option<CacheEntry> {
        self.cache.get(collection)
    }

    /// Replace the cached snapshot of `collection`.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be persisted.
    pub fn cache_put(&self, collection: &Collection, data: Value) -> Result<CacheEntry, RallyError> {
        self.cache.put(collection, data)
    }

    /// Drop every cached snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache keys cannot be removed.
    pub fn clear_cache(&self) -> Result<usize, RallyError> {
        self.cache.clear()
    }

    /// Collections with a cached snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the store keys cannot be listed.
    pub fn cached_collections(&self) -> Result<Vec<String>, RallyError> {
        self.cache.collections()
    }

    #[must_use]
    pub fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        self.cache.last_sync_time()
    }

    /// Fetch `collection` from the remote and cache the result.
    ///
    /// Only a query that returns the whole table replaces the cached
    /// snapshot; a narrowing query (row filters or a limit) is answered
    /// without touching the cache. When offline, or when the fetch fails, the
    /// snapshot is served with the query's filters applied to it.
    ///
    /// # Errors
    ///
    /// Returns the fetch error (or `NotFound` when offline) if there is no
    /// snapshot to fall back to.
    pub async fn refresh(
        &self,
        collection: &Collection,
        query: &FetchQuery,
    ) -> Result<CacheEntry, RallyError> {
        if !self.is_online() {
            return self.cached(collection, query).ok_or_else(|| {
                RallyError::NotFound(format!("Offline and no cached data for {collection}"))
            });
        }

        match self.remote.fetch(collection, query).await {
            Ok(data) if query.narrows_rows() => Ok(CacheEntry {
                collection: collection.clone(),
                data,
                synced_at: Utc::now(),
            }),
            Ok(data) => self.cache.put(collection, data),
            Err(e) => {
                tracing::warn!("Error fetching {collection}, using cache: {e}");
                self.cached(collection, query).ok_or(e)
            }
        }
    }

    fn cached(&self, collection: &Collection, query: &FetchQuery) -> Option<CacheEntry> {
        let mut entry = self.cache.get(collection)?;
        entry.data = query.filter_rows(&entry.data);
        Some(entry)
    }
}

impl Drop for OfflineSync {
    fn drop(&mut self) {
        // Cannot wait here; an interrupted pass leaves its operations queued.
        self.abort_tasks();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::sync::operation::{OperationKind, Record};
    use crate::features::sync::queue::SYNC_QUEUE_KEY;
    use crate::features::sync::remote::MockRemoteStore;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Accepts every write after a fixed delay.
    struct SlowRemote {
        delay: Duration,
        applied: AtomicUsize,
    }

    impl SlowRemote {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                applied: AtomicUsize::new(0),
            }
        }

        async fn accept(&self) -> Result<(), RallyError> {
            tokio::time::sleep(self.delay).await;
            self.applied.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl RemoteStore for SlowRemote {
        async fn insert(&self, _: &Collection, _: &Record) -> Result<(), RallyError> {
            self.accept().await
        }

        async fn update(&self, _: &Collection, _: &str, _: &Record) -> Result<(), RallyError> {
            self.accept().await
        }

        async fn delete(&self, _: &Collection, _: &str) -> Result<(), RallyError> {
            self.accept().await
        }

        async fn fetch(&self, _: &Collection, _: &FetchQuery) -> Result<Value, RallyError> {
            Ok(json!([]))
        }

        async fn ping(&self) -> bool {
            true
        }
    }

    fn insert(title: &str) -> Payload {
        Payload::from_record(OperationKind::Insert, json!({ "title": title })).unwrap()
    }

    fn persisted_len(store: &MemoryStore) -> usize {
        let raw = store.get_item(SYNC_QUEUE_KEY).unwrap().unwrap();
        serde_json::from_str::<Vec<PendingOperation>>(&raw).unwrap().len()
    }

    fn events() -> Collection {
        Collection::new("events").unwrap()
    }

    fn service(remote: MockRemoteStore, online: bool) -> OfflineSync {
        OfflineSync::new(
            Arc::new(MemoryStore::new()),
            Arc::new(remote),
            ConnectivityMonitor::new(online),
            RetryPolicy::none(),
        )
    }

    async fn wait_for_empty(sync: &OfflineSync) {
        for _ in 0..100 {
            if sync.pending_count() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_practice_insert_scenario() {
        let mut remote = MockRemoteStore::new();
        remote
            .expect_insert()
            .withf(|c, r| c.as_str() == "events" && r["title"] == "Practice")
            .times(1)
            .returning(|_, _| Ok(()));
        remote
            .expect_fetch()
            .returning(|_, _| Ok(json!([{"id": 1, "title": "Practice"}])));

        let mut sync = service(remote, false);
        sync.start().await;

        let payload =
            Payload::from_record(OperationKind::Insert, json!({"title": "Practice"})).unwrap();
        sync.enqueue(events(), payload).await.unwrap();
        assert_eq!(sync.pending_count(), 1);

        sync.connectivity().set_connected(true);
        wait_for_empty(&sync).await;
        assert_eq!(sync.pending_count(), 0);

        let entry = sync.refresh(&events(), &FetchQuery::all()).await.unwrap();
        assert_eq!(entry.data, json!([{"id": 1, "title": "Practice"}]));
        assert!(sync.last_sync_time().is_some());

        sync.shutdown().await;
    }

    #[tokio::test]
    async fn test_refresh_falls_back_to_cache() {
        let mut remote = MockRemoteStore::new();
        remote
            .expect_fetch()
            .returning(|_, _| Err(RallyError::transport("timed out")));

        let sync = service(remote, true);
        sync.cache_put(&events(), json!([{"id": 7}])).unwrap();

        let entry = sync.refresh(&events(), &FetchQuery::all()).await.unwrap();
        assert_eq!(entry.data, json!([{"id": 7}]));

        sync.clear_cache().unwrap();
        assert!(sync.refresh(&events(), &FetchQuery::all()).await.is_err());
    }

    #[tokio::test]
    async fn test_filtered_refresh_leaves_snapshot_alone() {
        let mut remote = MockRemoteStore::new();
        remote
            .expect_fetch()
            .withf(|_, q| q.narrows_rows())
            .returning(|_, _| Ok(json!([{"id": 2, "team": "b"}])));
        remote
            .expect_fetch()
            .withf(|_, q| !q.narrows_rows())
            .returning(|_, _| Ok(json!([{"id": 1, "team": "a"}, {"id": 2, "team": "b"}])));

        let sync = service(remote, true);
        sync.refresh(&events(), &FetchQuery::all()).await.unwrap();

        let filtered = sync
            .refresh(&events(), &FetchQuery::all().eq("team", "b"))
            .await
            .unwrap();
        assert_eq!(filtered.data, json!([{"id": 2, "team": "b"}]));

        let snapshot = sync.cache_get(&events()).unwrap();
        assert_eq!(snapshot.data, json!([{"id": 1, "team": "a"}, {"id": 2, "team": "b"}]));
    }

    #[tokio::test]
    async fn test_offline_refresh_filters_snapshot() {
        let mut remote = MockRemoteStore::new();
        remote.expect_fetch().never();

        let sync = service(remote, false);
        sync.cache_put(
            &events(),
            json!([{"id": 1, "team": "a"}, {"id": 2, "team": "b"}, {"id": 3, "team": "b"}]),
        )
        .unwrap();

        let entry = sync
            .refresh(&events(), &FetchQuery::all().eq("team", "b").limit(1))
            .await
            .unwrap();
        assert_eq!(entry.data, json!([{"id": 2, "team": "b"}]));

        let whole = sync.refresh(&events(), &FetchQuery::all()).await.unwrap();
        assert_eq!(whole.data.as_array().map(Vec::len), Some(3));
    }

    #[tokio::test]
    async fn test_refresh_offline_without_cache() {
        let mut remote = MockRemoteStore::new();
        remote.expect_fetch().never();

        let sync = service(remote, false);
        let err = sync.refresh(&events(), &FetchQuery::all()).await.unwrap_err();
        assert!(matches!(err, RallyError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_start_probes_and_drains() {
        let mut remote = MockRemoteStore::new();
        remote.expect_ping().returning(|| true);
        remote.expect_delete().times(1).returning(|_, _| Ok(()));

        let store = Arc::new(MemoryStore::new());
        {
            let offline = OfflineSync::new(
                store.clone(),
                Arc::new(Unconfigured),
                ConnectivityMonitor::new(false),
                RetryPolicy::none(),
            );
            offline
                .enqueue(events(), Payload::Delete { id: "3".to_string() })
                .await
                .unwrap();
        }

        let mut sync = OfflineSync::new(
            store,
            Arc::new(remote),
            ConnectivityMonitor::new(false),
            RetryPolicy::none(),
        )
        .with_probe(Duration::from_secs(60));

        let report = sync.start().await;
        assert!(sync.is_online());
        assert_eq!(report.applied, 1);
        assert_eq!(sync.pending_count(), 0);
    }

    #[test]
    fn test_open_without_remote_is_offline() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let paths = Paths::with_root(temp_dir.path().join(".rallysync"));

        let sync = OfflineSync::open(&Config::default(), &paths).unwrap();
        assert!(!sync.is_online());
        assert!(paths.database.exists());
    }

    #[tokio::test]
    async fn test_shutdown_mid_drain_finishes_the_pass() {
        let remote = Arc::new(SlowRemote::new(Duration::from_millis(50)));
        let store = Arc::new(MemoryStore::new());
        let mut sync = OfflineSync::new(
            store.clone(),
            remote.clone(),
            ConnectivityMonitor::new(false),
            RetryPolicy::none(),
        );
        sync.start().await;

        for title in ["a", "b", "c", "d"] {
            sync.enqueue(events(), insert(title)).await.unwrap();
        }
        sync.connectivity().set_connected(true);
        tokio::time::sleep(Duration::from_millis(75)).await;

        sync.shutdown().await;

        assert_eq!(remote.applied.load(Ordering::SeqCst), 4);
        assert_eq!(sync.pending_count(), 0);
        assert_eq!(persisted_len(&store), 0);
    }

    #[tokio::test]
    async fn test_drop_mid_drain_keeps_unconfirmed_writes() {
        let remote = Arc::new(SlowRemote::new(Duration::from_millis(50)));
        let store = Arc::new(MemoryStore::new());
        let mut sync = OfflineSync::new(
            store.clone(),
            remote.clone(),
            ConnectivityMonitor::new(false),
            RetryPolicy::none(),
        );
        sync.start().await;

        for title in ["a", "b", "c", "d"] {
            sync.enqueue(events(), insert(title)).await.unwrap();
        }
        sync.connectivity().set_connected(true);
        tokio::time::sleep(Duration::from_millis(75)).await;

        drop(sync);

        let applied = remote.applied.load(Ordering::SeqCst);
        assert_eq!(applied, 1);
        assert_eq!(persisted_len(&store), 4 - applied);

        let restarted = OfflineSync::new(
            store,
            Arc::new(Unconfigured),
            ConnectivityMonitor::new(false),
            RetryPolicy::none(),
        );
        assert_eq!(restarted.pending_count(), 3);
    }
}
