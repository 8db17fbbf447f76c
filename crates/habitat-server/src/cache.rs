//! Listing cache.
//!
//! Maps a [`CacheKey`] to an already ordered issue listing. Entries are only
//! ever evicted whole; nothing patches a cached listing in place.
//!
//! Writers update the store first and evict afterwards. Every eviction bumps
//! an epoch, and a reader may only populate an entry if the epoch it saw
//! before querying the store is still current. A listing computed from
//! pre-write data therefore never lands in the cache after the eviction that
//! should have removed it.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use habitat_shared::CacheKey;
use habitat_store::Issue;

/// Shared, ordered listing.
pub type Listing = Arc<Vec<Issue>>;

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, Listing>,
    epoch: u64,
}

#[derive(Clone, Default)]
pub struct ListingCache {
    state: Arc<RwLock<CacheState>>,
}

impl ListingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &CacheKey) -> Option<Listing> {
        let state = self.state.read().await;
        let hit = state.entries.get(key).cloned();
        debug!(key = %key, hit = hit.is_some(), "Listing cache lookup");
        hit
    }

    /// Current invalidation epoch. Read it before querying the store.
    pub async fn epoch(&self) -> u64 {
        self.state.read().await.epoch
    }

    /// Populate `key` unless an eviction happened since `observed_epoch`.
    ///
    /// Returns whether the listing was stored.
    pub async fn insert_if_current(
        &self,
        key: CacheKey,
        listing: Listing,
        observed_epoch: u64,
    ) -> bool {
        let mut state = self.state.write().await;
        if state.epoch != observed_epoch {
            debug!(key = %key, "Listing went stale while computing, not cached");
            return false;
        }
        state.entries.insert(key, listing);
        true
    }

    /// Evict the given keys.
    pub async fn evict(&self, keys: &[CacheKey]) {
        let mut state = self.state.write().await;
        state.epoch += 1;
        for key in keys {
            state.entries.remove(key);
        }
        let evicted: Vec<String> = keys.iter().map(ToString::to_string).collect();
        debug!(keys = ?evicted, "Evicted listings");
    }

    /// Evict every `resident:*` entry and the global entry.
    pub async fn evict_all(&self) {
        let mut state = self.state.write().await;
        state.epoch += 1;
        let removed = state.entries.len();
        state.entries.clear();
        debug!(removed, "Evicted all listings");
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }
}
