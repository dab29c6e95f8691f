//! Sharded TTL cache of user snapshots.
//!
//! Reads take a shard read lock only. The hit counter and hot flag of an entry are atomics, so
//! concurrent readers never block one another. Hotness is a classification used when the
//! entry is next written: hot entries get the short TTL so frequently changing balances are
//! re-read from the store sooner.

use hrc_types::casino::{UserId, UserSnapshot};
use std::{
    collections::{hash_map::Entry as Slot, HashMap},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, RwLock,
    },
    time::Duration,
};
use tokio::time::Instant;
use tracing::debug;

use crate::{config::CacheConfig, metrics::Metrics, read, write};

struct Entry {
    snapshot: Arc<UserSnapshot>,
    expires_at: Instant,
    hits: AtomicU64,
    hot: AtomicBool,
}

impl Entry {
    fn new(snapshot: UserSnapshot, expires_at: Instant, hits: u64, hot: bool) -> Self {
        Self {
            snapshot: Arc::new(snapshot),
            expires_at,
            hits: AtomicU64::new(hits),
            hot: AtomicBool::new(hot),
        }
    }

    fn expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

pub struct UserCache {
    shards: Box<[RwLock<HashMap<UserId, Entry>>]>,
    enabled: bool,
    ttl: Duration,
    hot_ttl: Duration,
    hot_threshold: u64,
    metrics: Metrics,
}

impl UserCache {
    pub fn new(config: &CacheConfig, metrics: Metrics) -> Self {
        let shards = (0..config.shards.max(1))
            .map(|_| RwLock::new(HashMap::new()))
            .collect();
        Self {
            shards,
            enabled: config.enabled,
            ttl: config.ttl(),
            hot_ttl: config.hot_ttl(),
            hot_threshold: config.hot_threshold,
            metrics,
        }
    }

    fn shard(&self, user: UserId) -> &RwLock<HashMap<UserId, Entry>> {
        &self.shards[(user % self.shards.len() as u64) as usize]
    }

    fn ttl_for(&self, hot: bool) -> Duration {
        if hot {
            self.hot_ttl
        } else {
            self.ttl
        }
    }

    /// Shared handle to the cached snapshot, if present and unexpired.
    pub fn get(&self, user: UserId) -> Option<Arc<UserSnapshot>> {
        if !self.enabled {
            return None;
        }
        let shard = read(self.shard(user));
        let Some(entry) = shard.get(&user).filter(|entry| !entry.expired(Instant::now())) else {
            self.metrics.cache_misses.inc();
            return None;
        };
        let hits = entry.hits.fetch_add(1, Ordering::Relaxed) + 1;
        if hits >= self.hot_threshold && !entry.hot.swap(true, Ordering::Relaxed) {
            debug!(user, hits, "cache entry promoted to hot");
        }
        self.metrics.cache_hits.inc();
        Some(entry.snapshot.clone())
    }

    /// Owned copy of the cached snapshot, for callers that intend to modify it.
    pub fn get_copy(&self, user: UserId) -> Option<UserSnapshot> {
        self.get(user).map(|snapshot| snapshot.as_ref().clone())
    }

    /// Replace the entry for `user`, keeping its hot classification.
    pub fn set(&self, user: UserId, snapshot: UserSnapshot) {
        if !self.enabled {
            return;
        }
        let mut shard = write(self.shard(user));
        let (hits, hot) = shard
            .get(&user)
            .map(|entry| {
                (
                    entry.hits.load(Ordering::Relaxed),
                    entry.hot.load(Ordering::Relaxed),
                )
            })
            .unwrap_or((0, false));
        let expires_at = Instant::now() + self.ttl_for(hot);
        if shard
            .insert(user, Entry::new(snapshot, expires_at, hits, hot))
            .is_none()
        {
            self.metrics.cache_entries.inc();
        }
    }

    /// Refresh the entry after a store write. Returns whether an entry already existed.
    pub fn update(&self, user: UserId, snapshot: UserSnapshot) -> bool {
        if !self.enabled {
            return false;
        }
        let now = Instant::now();
        let mut shard = write(self.shard(user));
        match shard.entry(user) {
            Slot::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                let hot = entry.hot.load(Ordering::Relaxed);
                entry.snapshot = Arc::new(snapshot);
                entry.expires_at = now + self.ttl_for(hot);
                true
            }
            Slot::Vacant(vacant) => {
                vacant.insert(Entry::new(snapshot, now + self.ttl, 0, false));
                self.metrics.cache_entries.inc();
                false
            }
        }
    }

    pub fn delete(&self, user: UserId) -> bool {
        let removed = write(self.shard(user)).remove(&user).is_some();
        if removed {
            self.metrics.cache_entries.dec();
        }
        removed
    }

    /// Whether `user` is currently classified hot.
    pub fn is_hot(&self, user: UserId) -> bool {
        read(self.shard(user))
            .get(&user)
            .is_some_and(|entry| entry.hot.load(Ordering::Relaxed))
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| read(shard).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired entries, returning how many were removed.
    ///
    /// Each shard is scanned under its read lock and only locked for writing if it holds
    /// expired keys, which are re-checked since a writer may have refreshed them in between.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        for shard in self.shards.iter() {
            let expired: Vec<UserId> = read(shard)
                .iter()
                .filter(|(_, entry)| entry.expired(now))
                .map(|(user, _)| *user)
                .collect();
            if expired.is_empty() {
                continue;
            }
            let mut shard = write(shard);
            for user in expired {
                if shard.get(&user).is_some_and(|entry| entry.expired(now)) {
                    shard.remove(&user);
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            self.metrics.cache_entries.set(self.len() as i64);
            debug!(removed, "swept user cache");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CacheConfig {
        CacheConfig {
            enabled: true,
            ttl_secs: 300,
            hot_ttl_secs: 30,
            hot_threshold: 3,
            shards: 4,
            sweep_interval_secs: 60,
        }
    }

    fn snapshot(user: UserId, chips: i64) -> UserSnapshot {
        let mut snapshot = UserSnapshot::new(user, 0);
        snapshot.chips = chips;
        snapshot
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_after_write_until_ttl() {
        let cache = UserCache::new(&config(), Metrics::default());
        cache.set(1, snapshot(1, 500));
        assert_eq!(cache.get(1).unwrap().chips, 500);

        tokio::time::advance(Duration::from_secs(300) - Duration::from_millis(1)).await;
        assert!(cache.get(1).is_some());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(cache.get(1).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hot_after_threshold_reads() {
        let cache = UserCache::new(&config(), Metrics::default());
        cache.set(1, snapshot(1, 500));
        cache.get(1);
        cache.get(1);
        assert!(!cache.is_hot(1));
        cache.get(1);
        assert!(cache.is_hot(1));

        // Promotion takes effect on the next write
        cache.update(1, snapshot(1, 600));
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(cache.get(1).is_none());

        // Classification survives a replace
        cache.set(1, snapshot(1, 700));
        assert!(cache.is_hot(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cold_entries_keep_long_ttl() {
        let cache = UserCache::new(&config(), Metrics::default());
        cache.set(1, snapshot(1, 500));
        cache.get(1);
        cache.update(1, snapshot(1, 600));
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(cache.get(1).unwrap().chips, 600);
    }

    #[tokio::test(start_paused = true)]
    async fn test_copy_is_independent() {
        let cache = UserCache::new(&config(), Metrics::default());
        cache.set(1, snapshot(1, 500));
        let mut copy = cache.get_copy(1).unwrap();
        copy.chips = 0;
        assert_eq!(cache.get(1).unwrap().chips, 500);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_only_expired() {
        let metrics = Metrics::default();
        let cache = UserCache::new(&config(), metrics.clone());
        cache.set(1, snapshot(1, 1));
        tokio::time::advance(Duration::from_secs(200)).await;
        cache.set(2, snapshot(2, 2));
        tokio::time::advance(Duration::from_secs(100)).await;

        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(2).is_some());
        assert_eq!(metrics.cache_entries.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_and_disabled() {
        let cache = UserCache::new(&config(), Metrics::default());
        cache.set(1, snapshot(1, 1));
        assert!(cache.delete(1));
        assert!(!cache.delete(1));
        assert!(cache.get(1).is_none());

        let disabled = UserCache::new(
            &CacheConfig {
                enabled: false,
                ..config()
            },
            Metrics::default(),
        );
        disabled.set(1, snapshot(1, 1));
        assert!(!disabled.update(1, snapshot(1, 2)));
        assert!(disabled.get(1).is_none());
        assert!(disabled.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_readers_and_writers() {
        let cache = Arc::new(UserCache::new(&config(), Metrics::default()));
        let mut handles = Vec::new();
        for task in 0..8u64 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                for round in 0..100i64 {
                    let user = (task + round as u64) % 16;
                    cache.update(user, snapshot(user, round));
                    if let Some(found) = cache.get(user) {
                        assert_eq!(found.user, user);
                    }
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(cache.len(), 16);
    }
}
