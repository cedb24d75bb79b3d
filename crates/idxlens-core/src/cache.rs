//! Bounded in-memory cache for terminal responses.
//!
//! Entries are serialized response bodies keyed by query shape plus the
//! canonical argument string. The store holds at most `capacity` entries;
//! inserting into a full store evicts the entry closest to expiry.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::data_source::{
    Dataset, DatasetRequest, Endpoint, FieldTable, SeriesRequest, SeriesTable, SnapshotRequest,
    SourceFuture, TerminalSource,
};
use crate::SourceId;

/// Defines how [`CachedSource`] consults the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Serve a live entry when present; otherwise fetch and store. (Default)
    #[default]
    Use,
    /// Always fetch; never read or write the store.
    Bypass,
}

/// Query identity used as the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    endpoint: Endpoint,
    args: String,
}

impl CacheKey {
    pub fn new(endpoint: Endpoint, args: impl Into<String>) -> Self {
        Self {
            endpoint,
            args: args.into(),
        }
    }

    pub fn snapshot(req: &SnapshotRequest) -> Self {
        Self::new(Endpoint::Snapshot, req.cache_args())
    }

    pub fn series(req: &SeriesRequest) -> Self {
        Self::new(Endpoint::Series, req.cache_args())
    }

    pub fn dataset(req: &DatasetRequest) -> Self {
        Self::new(Endpoint::Dataset, req.cache_args())
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.endpoint, self.args)
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    body: String,
    expires_at: Instant,
}

#[derive(Debug)]
struct CacheInner {
    map: HashMap<CacheKey, CacheEntry>,
    default_ttl: Duration,
    capacity: usize,
}

impl CacheInner {
    fn get(&self, key: &CacheKey) -> Option<String> {
        self.map.get(key).and_then(|entry| {
            if Instant::now() <= entry.expires_at {
                Some(entry.body.clone())
            } else {
                None
            }
        })
    }

    fn put(&mut self, key: CacheKey, body: String, ttl_override: Option<Duration>) {
        let ttl = ttl_override.unwrap_or(self.default_ttl);
        let expires_at = Instant::now() + ttl;

        if !self.map.contains_key(&key) && self.map.len() >= self.capacity {
            self.clear_expired();
        }
        if !self.map.contains_key(&key) && self.map.len() >= self.capacity {
            let victim = self
                .map
                .iter()
                .min_by_key(|(_, entry)| entry.expires_at)
                .map(|(key, _)| key.clone());
            if let Some(victim) = victim {
                self.map.remove(&victim);
            }
        }

        self.map.insert(key, CacheEntry { body, expires_at });
    }

    fn clear_expired(&mut self) {
        let now = Instant::now();
        self.map.retain(|_, entry| entry.expires_at > now);
    }
}

/// Thread-safe, bounded response cache.
#[derive(Debug, Clone)]
pub struct CacheStore {
    inner: Arc<tokio::sync::RwLock<CacheInner>>,
}

impl CacheStore {
    pub const DEFAULT_CAPACITY: usize = 256;

    pub fn new(default_ttl: Duration, capacity: usize) -> Self {
        Self {
            inner: Arc::new(tokio::sync::RwLock::new(CacheInner {
                map: HashMap::new(),
                default_ttl,
                capacity: capacity.max(1),
            })),
        }
    }

    /// Cache with a 5 minute TTL and the default capacity.
    pub fn with_default_ttl() -> Self {
        Self::new(Duration::from_secs(300), Self::DEFAULT_CAPACITY)
    }

    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, 1)
    }

    /// Live entry for `key`; expired entries are never returned.
    pub async fn get(&self, key: &CacheKey) -> Option<String> {
        let store = self.inner.read().await;
        store.get(key)
    }

    /// Stores `body`; a no-op when the cache is disabled.
    pub async fn put(&self, key: CacheKey, body: String, ttl_override: Option<Duration>) {
        let mut store = self.inner.write().await;
        if store.default_ttl == Duration::ZERO {
            return;
        }
        store.put(key, body, ttl_override);
    }

    pub async fn clear_expired(&self) {
        let mut store = self.inner.write().await;
        store.clear_expired();
    }

    pub async fn clear(&self) {
        let mut store = self.inner.write().await;
        store.map.clear();
    }

    /// Number of entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.inner.read().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn is_disabled(&self) -> bool {
        self.inner.read().await.default_ttl == Duration::ZERO
    }
}

/// Wraps any terminal source with a [`CacheStore`].
///
/// Only successful responses with batch status `0` are stored.
#[derive(Clone)]
pub struct CachedSource {
    inner: Arc<dyn TerminalSource>,
    cache: CacheStore,
    mode: CacheMode,
    hits: Arc<AtomicUsize>,
}

impl CachedSource {
    pub fn new(inner: Arc<dyn TerminalSource>, cache: CacheStore) -> Self {
        Self {
            inner,
            cache,
            mode: CacheMode::Use,
            hits: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_mode(mut self, mode: CacheMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Responses served from the store so far.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    async fn lookup<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        if self.mode == CacheMode::Bypass {
            return None;
        }
        let body = self.cache.get(key).await?;
        match serde_json::from_str(&body) {
            Ok(value) => {
                self.hits.fetch_add(1, Ordering::SeqCst);
                tracing::debug!(key = %key, "cache hit");
                Some(value)
            }
            Err(error) => {
                tracing::debug!(key = %key, %error, "discarding unreadable cache entry");
                None
            }
        }
    }

    async fn store<T: Serialize>(&self, key: CacheKey, value: &T) {
        if self.mode == CacheMode::Bypass {
            return;
        }
        if let Ok(body) = serde_json::to_string(value) {
            self.cache.put(key, body, None).await;
        }
    }
}

impl TerminalSource for CachedSource {
    fn id(&self) -> SourceId {
        self.inner.id()
    }

    fn snapshot<'a>(&'a self, req: SnapshotRequest) -> SourceFuture<'a, FieldTable> {
        Box::pin(async move {
            let key = CacheKey::snapshot(&req);
            if let Some(table) = self.lookup::<FieldTable>(&key).await {
                return Ok(table);
            }
            let table = self.inner.snapshot(req).await?;
            if table.is_ok() {
                self.store(key, &table).await;
            }
            Ok(table)
        })
    }

    fn series<'a>(&'a self, req: SeriesRequest) -> SourceFuture<'a, SeriesTable> {
        Box::pin(async move {
            let key = CacheKey::series(&req);
            if let Some(table) = self.lookup::<SeriesTable>(&key).await {
                return Ok(table);
            }
            let table = self.inner.series(req).await?;
            if table.is_ok() {
                self.store(key, &table).await;
            }
            Ok(table)
        })
    }

    fn dataset<'a>(&'a self, req: DatasetRequest) -> SourceFuture<'a, Dataset> {
        Box::pin(async move {
            let key = CacheKey::dataset(&req);
            if let Some(dataset) = self.lookup::<Dataset>(&key).await {
                return Ok(dataset);
            }
            let dataset = self.inner.dataset(req).await?;
            if dataset.is_ok() {
                self.store(key, &dataset).await;
            }
            Ok(dataset)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FixtureSource, InstrumentCode};

    fn key(args: &str) -> CacheKey {
        CacheKey::new(Endpoint::Snapshot, args)
    }

    #[tokio::test]
    async fn basic_put_and_get() {
        let cache = CacheStore::new(Duration::from_secs(1), 8);

        assert!(cache.get(&key("a")).await.is_none());

        cache.put(key("a"), "value1".to_string(), None).await;
        assert_eq!(cache.get(&key("a")).await, Some("value1".to_string()));

        cache.put(key("a"), "value2".to_string(), None).await;
        assert_eq!(cache.get(&key("a")).await, Some("value2".to_string()));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn expired_entries_are_not_returned() {
        let cache = CacheStore::new(Duration::from_millis(50), 8);

        cache.put(key("a"), "value1".to_string(), None).await;
        assert!(cache.get(&key("a")).await.is_some());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(cache.get(&key("a")).await.is_none());

        cache.clear_expired().await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn capacity_evicts_entry_closest_to_expiry() {
        let cache = CacheStore::new(Duration::from_secs(60), 2);

        cache
            .put(key("short"), "1".to_string(), Some(Duration::from_secs(5)))
            .await;
        cache.put(key("long"), "2".to_string(), None).await;
        cache.put(key("new"), "3".to_string(), None).await;

        assert_eq!(cache.len().await, 2);
        assert!(cache.get(&key("short")).await.is_none());
        assert!(cache.get(&key("long")).await.is_some());
        assert!(cache.get(&key("new")).await.is_some());
    }

    #[tokio::test]
    async fn zero_ttl_disables_the_store() {
        let cache = CacheStore::disabled();

        assert!(cache.is_disabled().await);
        cache.put(key("a"), "value1".to_string(), None).await;
        assert!(cache.get(&key("a")).await.is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn cached_source_serves_repeat_queries_from_store() {
        let fixture = FixtureSource::new().with_value("000300.SH", "sec_name", "沪深300");
        let cached = CachedSource::new(Arc::new(fixture.clone()), CacheStore::with_default_ttl());
        let code = InstrumentCode::parse("000300.SH").expect("valid");
        let request = SnapshotRequest::new(vec![code.clone()], ["sec_name"]).expect("valid");

        let first = cached.snapshot(request.clone()).await.expect("ok");
        let second = cached.snapshot(request).await.expect("ok");

        assert_eq!(first, second);
        assert_eq!(fixture.call_count(), 1);
        assert_eq!(cached.hits(), 1);
    }

    #[tokio::test]
    async fn failed_batches_are_not_cached() {
        let fixture = FixtureSource::new().with_status(-1);
        let cached = CachedSource::new(Arc::new(fixture.clone()), CacheStore::with_default_ttl());
        let code = InstrumentCode::parse("000300.SH").expect("valid");
        let request = SnapshotRequest::new(vec![code], ["sec_type"]).expect("valid");

        cached.snapshot(request.clone()).await.expect("transport ok");
        cached.snapshot(request).await.expect("transport ok");

        assert_eq!(fixture.call_count(), 2);
        assert!(cached.cache().is_empty().await);
    }

    #[tokio::test]
    async fn bypass_mode_never_touches_the_store() {
        let fixture = FixtureSource::new().with_value("000300.SH", "sec_name", "沪深300");
        let cached = CachedSource::new(Arc::new(fixture.clone()), CacheStore::with_default_ttl())
            .with_mode(CacheMode::Bypass);
        let code = InstrumentCode::parse("000300.SH").expect("valid");
        let request = SnapshotRequest::new(vec![code], ["sec_name"]).expect("valid");

        cached.snapshot(request.clone()).await.expect("ok");
        cached.snapshot(request).await.expect("ok");

        assert_eq!(fixture.call_count(), 2);
        assert!(cached.cache().is_empty().await);
    }
}
