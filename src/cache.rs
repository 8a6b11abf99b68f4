use std::{collections::HashMap, sync::Arc, time::Duration};

use log::debug;
use tokio::{sync::Mutex, task::JoinHandle, time::Instant};

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
    /// Monotonic use counter; the smallest value is the least recently used.
    last_used: u64,
}

struct CacheInner<V> {
    map: HashMap<String, CacheEntry<V>>,
    tick: u64,
}

/// Fixed-capacity cache with per-entry expiry and least-recently-used
/// eviction.
///
/// Reads never return a lapsed entry: an expired hit is removed on the spot
/// and reported as a miss, independent of the periodic sweep. Capacity is a
/// hard bound on entries held between sweeps, live or dead.
pub struct BoundedTtlCache<V> {
    name: &'static str,
    capacity: usize,
    inner: Mutex<CacheInner<V>>,
}

impl<V: Clone + Send + 'static> BoundedTtlCache<V> {
    pub fn new(name: &'static str, capacity: usize) -> Arc<Self> {
        assert!(capacity > 0, "cache capacity must be non-zero");
        Arc::new(BoundedTtlCache {
            name,
            capacity,
            inner: Mutex::new(CacheInner {
                map: HashMap::new(),
                tick: 0,
            }),
        })
    }

    /// Fetch a live entry, refreshing its recency. An expired entry is
    /// evicted and treated as a miss.
    pub async fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.lock().await;

        let expired = match inner.map.get(key) {
            Some(entry) => Instant::now() >= entry.expires_at,
            None => return None,
        };

        if expired {
            inner.map.remove(key);
            debug!("[{}] expired: {}", self.name, key);
            return None;
        }

        inner.tick += 1;
        let tick = inner.tick;
        let entry = inner.map.get_mut(key)?;
        entry.last_used = tick;
        debug!(
            "[{}] hit: {} ({}s remaining)",
            self.name,
            key,
            entry
                .expires_at
                .saturating_duration_since(Instant::now())
                .as_secs()
        );
        Some(entry.value.clone())
    }

    /// Insert or overwrite an entry. Inserting a new key at capacity evicts
    /// the least recently used entry first.
    pub async fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let mut inner = self.inner.lock().await;

        if !inner.map.contains_key(&key) && inner.map.len() >= self.capacity {
            if let Some(lru_key) = inner
                .map
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(k, _)| k.clone())
            {
                debug!("[{}] evicting lru: {}", self.name, lru_key);
                inner.map.remove(&lru_key);
            }
        }

        inner.tick += 1;
        let tick = inner.tick;
        debug!("[{}] set: {} (ttl {}s)", self.name, key, ttl.as_secs());
        inner.map.insert(
            key,
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
                last_used: tick,
            },
        );
    }

    /// Drop every expired entry, returning how many were removed. Bounds the
    /// memory held by dead entries between reads.
    pub async fn sweep(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        let before = inner.map.len();
        inner.map.retain(|_, entry| now < entry.expires_at);
        let removed = before - inner.map.len();
        if removed > 0 {
            debug!("[{}] swept {} expired entries", self.name, removed);
        }
        removed
    }

    pub async fn delete(&self, key: &str) {
        let mut inner = self.inner.lock().await;
        if inner.map.remove(key).is_some() {
            debug!("[{}] deleted: {}", self.name, key);
        }
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.map.clear();
        debug!("[{}] cleared", self.name);
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Start the periodic sweep task. The caller owns the handle and aborts
    /// it at shutdown.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::task::spawn(async move {
            let mut interval = tokio::time::interval(every);
            // the first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                cache.sweep().await;
            }
        })
    }
}
