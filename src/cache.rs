//! Short-TTL read-through cache for content documents.
//!
//! Entries expire lazily on read and are swept periodically by
//! [`TtlCache::spawn_sweeper`]. Each entry is replaced as a whole, so a
//! reader sees either the previous value or the new one, never a mix.
//!
//! There is no in-flight tracking: concurrent misses for the same key each
//! fetch upstream and the last write wins.

use std::fmt::Display;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

pub struct TtlCache<K> {
    entries: DashMap<K, Entry>,
    ttl: Duration,
}

struct Entry {
    value: Arc<Value>,
    expires_at: Instant,
}

impl<K> TtlCache<K>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
{
    pub fn new(ttl: Duration) -> Self {
        Self { entries: DashMap::new(), ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the value for `key` unless it is absent or older than the TTL.
    pub fn get(&self, key: &K) -> Option<Arc<Value>> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > now {
                return Some(Arc::clone(&entry.value));
            }
        }
        // Only drop the entry if it is still the expired one.
        self.entries.remove_if(key, |_, e| e.expires_at <= now);
        None
    }

    /// Stores `value` under `key` with a fresh TTL.
    pub fn set(&self, key: K, value: Arc<Value>) {
        debug!("Setting cache {key}");
        let expires_at = Instant::now() + self.ttl;
        self.entries.insert(key, Entry { value, expires_at });
    }

    /// Drops every entry.
    pub fn clear(&self) {
        debug!(entries = self.entries.len(), "Clearing cache");
        self.entries.clear();
    }

    /// Removes expired entries, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|key, e| {
            let live = e.expires_at > now;
            if !live {
                debug!("Clearing cache {key}");
            }
            live
        });
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Spawns a task that purges expired entries every `period`. The task
    /// ends on its own once the cache is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else { break };
                let purged = cache.purge_expired();
                if purged > 0 {
                    debug!(purged, "cache sweep");
                }
            }
        })
    }
}
