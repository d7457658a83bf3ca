//! In-memory catalog item cache.
//!
//! Caches materialized items to avoid repeated store lookups while a user is
//! paging through remote results. Entries expire after a TTL (~1 hour) that
//! is refreshed on every successful lookup or insert. The cache is a
//! performance aid only - the store stays authoritative.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use uuid::Uuid;

use crate::model::CatalogItem;

/// Default entry lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

struct Entry {
    item: CatalogItem,
    expires_at: Instant,
}

/// Thread-safe TTL cache keyed by item id.
///
/// Concurrent queries from different users share one instance; a benign race
/// (two queries materializing the same item) costs one extra store write,
/// never a wrong entry.
pub struct ItemCache {
    ttl: Duration,
    entries: RwLock<HashMap<Uuid, Entry>>,
}

impl ItemCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Get a cached item, refreshing its TTL on hit.
    pub fn get(&self, id: Uuid) -> Option<CatalogItem> {
        let mut entries = self.entries.write();
        match entries.get_mut(&id) {
            Some(entry) if entry.expires_at > Instant::now() => {
                entry.expires_at = Instant::now() + self.ttl;
                Some(entry.item.clone())
            }
            Some(_) => {
                entries.remove(&id);
                None
            }
            None => None,
        }
    }

    /// Insert or replace an item, resetting its TTL.
    pub fn put(&self, item: CatalogItem) {
        let mut entries = self.entries.write();
        entries.insert(
            item.id,
            Entry {
                item,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.entries
            .read()
            .get(&id)
            .map(|e| e.expires_at > Instant::now())
            .unwrap_or(false)
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired entries. Called opportunistically; correctness never
    /// depends on it since `get` checks expiry itself.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.write().retain(|_, e| e.expires_at > now);
    }
}

impl Default for ItemCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
