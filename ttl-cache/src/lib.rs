//! # TTL cache
//!
//! Namespaced in-memory cache with per-namespace default TTLs, lazy expiry on
//! read, a fewest-hits eviction policy at capacity, and a background sweep
//! task. Used to memoize persona and upstream-API lookups.
//!
//! ## Keys
//!
//! Entries are keyed `"namespace:id"`. Three namespace tiers carry their own
//! default TTL (persona, conversation, api-response); explicit TTLs override.
//!
//! ## Eviction
//!
//! At capacity the entry with the fewest recorded accesses goes first — the
//! hit counter increments on every successful `get` and resets on `set`.
//! Ties break on iteration order, which a `BTreeMap` keeps deterministic for
//! a given insertion sequence.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Well-known cache namespaces.
pub mod namespaces {
    pub const PERSONA: &str = "persona";
    pub const CONVERSATION: &str = "conversation";
    pub const API: &str = "api";
}

/// Default TTL per namespace tier.
#[derive(Debug, Clone)]
pub struct CacheTtlConfig {
    pub persona_ttl: Duration,
    pub conversation_ttl: Duration,
    pub api_ttl: Duration,
}

impl Default for CacheTtlConfig {
    fn default() -> Self {
        Self {
            persona_ttl: Duration::from_secs(3600),
            conversation_ttl: Duration::from_secs(600),
            api_ttl: Duration::from_secs(300),
        }
    }
}

impl CacheTtlConfig {
    /// TTL applied when `set` is called without an explicit one. Unknown
    /// namespaces get the API tier.
    pub fn default_ttl(&self, namespace: &str) -> Duration {
        match namespace {
            namespaces::PERSONA => self.persona_ttl,
            namespaces::CONVERSATION => self.conversation_ttl,
            _ => self.api_ttl,
        }
    }
}

struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
    ttl: Duration,
    hits: u64,
}

impl<V> CacheEntry<V> {
    fn expired(&self, now: Instant) -> bool {
        now.duration_since(self.stored_at) > self.ttl
    }
}

/// Per-namespace entry counts, for the cache report command.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub per_namespace: HashMap<String, usize>,
}

/// Namespaced TTL cache. Cloning shares the underlying map.
#[derive(Clone)]
pub struct TtlCache<V> {
    entries: Arc<RwLock<BTreeMap<String, CacheEntry<V>>>>,
    capacity: usize,
    ttl_config: CacheTtlConfig,
}

impl<V: Clone + Send + Sync + 'static> TtlCache<V> {
    pub fn new(capacity: usize, ttl_config: CacheTtlConfig) -> Self {
        Self {
            entries: Arc::new(RwLock::new(BTreeMap::new())),
            capacity,
            ttl_config,
        }
    }

    fn cache_key(namespace: &str, id: &str) -> String {
        format!("{}:{}", namespace, id)
    }

    /// Inserts a value, using the namespace default TTL unless one is given.
    /// Resets the entry's hit counter. At capacity, expired entries are
    /// dropped first; if the cache is still full, the fewest-hits entry is
    /// evicted.
    pub async fn set(&self, namespace: &str, id: &str, value: V, ttl: Option<Duration>) {
        let key = Self::cache_key(namespace, id);
        let ttl = ttl.unwrap_or_else(|| self.ttl_config.default_ttl(namespace));
        let mut entries = self.entries.write().await;

        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            let now = Instant::now();
            entries.retain(|_, entry| !entry.expired(now));
            if entries.len() >= self.capacity {
                let victim = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.hits)
                    .map(|(k, _)| k.clone());
                if let Some(victim) = victim {
                    debug!(key = %victim, "Cache full, evicting fewest-hits entry");
                    entries.remove(&victim);
                }
            }
        }

        entries.insert(
            key,
            CacheEntry {
                value,
                stored_at: Instant::now(),
                ttl,
                hits: 0,
            },
        );
    }

    /// Looks up a value. Expired entries are purged on the spot and report
    /// as absent; a hit increments the entry's access counter.
    pub async fn get(&self, namespace: &str, id: &str) -> Option<V> {
        let key = Self::cache_key(namespace, id);
        let mut entries = self.entries.write().await;
        match entries.get_mut(&key) {
            Some(entry) => {
                if entry.expired(Instant::now()) {
                    entries.remove(&key);
                    debug!(key = %key, "Cache entry expired on read");
                    None
                } else {
                    entry.hits += 1;
                    Some(entry.value.clone())
                }
            }
            None => None,
        }
    }

    pub async fn delete(&self, namespace: &str, id: &str) -> bool {
        let key = Self::cache_key(namespace, id);
        self.entries.write().await.remove(&key).is_some()
    }

    /// Drops every entry in one namespace; returns how many were removed.
    pub async fn clear_namespace(&self, namespace: &str) -> usize {
        let prefix = format!("{}:", namespace);
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(&prefix));
        before - entries.len()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drops every TTL-expired entry; returns how many were removed.
    /// Operates on a key snapshot so request traffic can interleave.
    pub async fn purge_expired(&self) -> usize {
        let candidates: Vec<String> = {
            let entries = self.entries.read().await;
            let now = Instant::now();
            entries
                .iter()
                .filter(|(_, entry)| entry.expired(now))
                .map(|(key, _)| key.clone())
                .collect()
        };

        if candidates.is_empty() {
            return 0;
        }

        let mut removed = 0usize;
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        for key in candidates {
            if entries.get(&key).is_some_and(|entry| entry.expired(now)) {
                entries.remove(&key);
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, "Cache sweep purged expired entries");
        }
        removed
    }

    /// Entry counts, total and per namespace.
    pub async fn stats(&self) -> CacheStats {
        let entries = self.entries.read().await;
        let mut per_namespace: HashMap<String, usize> = HashMap::new();
        for key in entries.keys() {
            let namespace = key.split(':').next().unwrap_or_default();
            *per_namespace.entry(namespace.to_string()).or_default() += 1;
        }
        CacheStats {
            entries: entries.len(),
            per_namespace,
        }
    }

    /// Spawns the periodic TTL sweep. The task runs until aborted.
    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                cache.purge_expired().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(capacity: usize) -> TtlCache<String> {
        TtlCache::new(capacity, CacheTtlConfig::default())
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let cache = cache(10);
        cache.set("api", "k", "v".to_string(), None).await;
        assert_eq!(cache.get("api", "k").await.as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let cache = cache(10);
        assert!(cache.get("api", "nope").await.is_none());
    }

    #[tokio::test]
    async fn test_ttl_expiry_on_read() {
        let cache = cache(10);
        cache
            .set("api", "k", "v".to_string(), Some(Duration::from_millis(40)))
            .await;
        assert!(cache.get("api", "k").await.is_some());

        tokio::time::sleep(Duration::from_millis(70)).await;
        assert!(cache.get("api", "k").await.is_none());
        // The expired entry was purged, not just hidden.
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_namespace_default_ttls() {
        let config = CacheTtlConfig {
            persona_ttl: Duration::from_secs(3600),
            conversation_ttl: Duration::from_millis(30),
            api_ttl: Duration::from_secs(3600),
        };
        let cache: TtlCache<String> = TtlCache::new(10, config);
        cache.set("persona", "p", "v".to_string(), None).await;
        cache.set("conversation", "c", "v".to_string(), None).await;

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(cache.get("persona", "p").await.is_some());
        assert!(cache.get("conversation", "c").await.is_none());
    }

    #[tokio::test]
    async fn test_delete_and_clear_namespace() {
        let cache = cache(10);
        cache.set("persona", "a", "1".to_string(), None).await;
        cache.set("persona", "b", "2".to_string(), None).await;
        cache.set("api", "c", "3".to_string(), None).await;

        assert!(cache.delete("persona", "a").await);
        assert!(!cache.delete("persona", "a").await);

        assert_eq!(cache.clear_namespace("persona").await, 1);
        assert_eq!(cache.len().await, 1);
        assert!(cache.get("api", "c").await.is_some());
    }

    #[tokio::test]
    async fn test_eviction_prefers_fewest_hits() {
        let cache = cache(2);
        cache.set("api", "a", "1".to_string(), None).await;
        cache.set("api", "b", "2".to_string(), None).await;
        cache.get("api", "a").await; // a: 1 hit, b: 0 hits

        cache.set("api", "c", "3".to_string(), None).await;
        assert!(cache.get("api", "a").await.is_some());
        assert!(cache.get("api", "b").await.is_none());
        assert!(cache.get("api", "c").await.is_some());
    }

    #[tokio::test]
    async fn test_eviction_tie_breaks_deterministically() {
        let cache = cache(2);
        cache.set("api", "a", "1".to_string(), None).await;
        cache.set("api", "b", "2".to_string(), None).await;

        // Both at 0 hits: iteration order decides, so "api:a" goes first.
        cache.set("api", "c", "3".to_string(), None).await;
        assert!(cache.get("api", "a").await.is_none());
        assert!(cache.get("api", "b").await.is_some());
    }

    #[tokio::test]
    async fn test_set_resets_hit_counter() {
        let cache = cache(2);
        cache.set("api", "a", "1".to_string(), None).await;
        cache.set("api", "b", "2".to_string(), None).await;
        for _ in 0..5 {
            cache.get("api", "a").await;
        }
        cache.get("api", "b").await; // a: 5 hits, b: 1 hit

        // Re-set drops a's counter back to zero, making it the next victim.
        cache.set("api", "a", "1b".to_string(), None).await;
        cache.set("api", "c", "3".to_string(), None).await;
        assert!(cache.get("api", "a").await.is_none());
        assert!(cache.get("api", "b").await.is_some());
    }

    #[tokio::test]
    async fn test_overwrite_at_capacity_does_not_evict() {
        let cache = cache(2);
        cache.set("api", "a", "1".to_string(), None).await;
        cache.set("api", "b", "2".to_string(), None).await;

        cache.set("api", "a", "1b".to_string(), None).await;
        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get("api", "a").await.as_deref(), Some("1b"));
        assert!(cache.get("api", "b").await.is_some());
    }

    #[tokio::test]
    async fn test_purge_expired_counts() {
        let cache = cache(10);
        cache
            .set("api", "a", "1".to_string(), Some(Duration::from_millis(20)))
            .await;
        cache
            .set("api", "b", "2".to_string(), Some(Duration::from_secs(60)))
            .await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.purge_expired().await, 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_background_sweeper_purges() {
        let cache = cache(10);
        cache
            .set("api", "a", "1".to_string(), Some(Duration::from_millis(20)))
            .await;
        let handle = cache.spawn_sweeper(Duration::from_millis(25));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(cache.len().await, 0);
        handle.abort();
    }

    #[tokio::test]
    async fn test_stats_per_namespace() {
        let cache = cache(10);
        cache.set("persona", "a", "1".to_string(), None).await;
        cache.set("persona", "b", "2".to_string(), None).await;
        cache.set("api", "c", "3".to_string(), None).await;

        let stats = cache.stats().await;
        assert_eq!(stats.entries, 3);
        assert_eq!(stats.per_namespace.get("persona"), Some(&2));
        assert_eq!(stats.per_namespace.get("api"), Some(&1));
    }
}
