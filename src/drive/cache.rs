//! Per-user synchronization root cache with LRU eviction
//!
//! Keys come from request headers, so the cache is bounded. Every
//! invalidation bumps a generation counter; a root set read from the
//! database is only stored if no invalidation happened while it was read.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use super::types::SyncRootEntry;
use crate::config::DEFAULT_ROOTS_CACHE_CAPACITY;

/// (user, repository)
type RootsKey = (String, String);

struct CacheState {
    entries: LruCache<RootsKey, Arc<Vec<SyncRootEntry>>>,
    generation: u64,
}

/// Readable, live roots per user and repository.
///
/// Entries are dropped on registration changes for the user and wholesale
/// on deletions, moves and permission changes.
#[derive(Clone)]
pub struct RootsCache {
    state: Arc<Mutex<CacheState>>,
}

impl Default for RootsCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_ROOTS_CACHE_CAPACITY)
    }
}

impl RootsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A zero capacity falls back to one entry
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Arc::new(Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                generation: 0,
            })),
        }
    }

    /// Current invalidation generation. Read it before loading roots and
    /// hand it back to [`Self::insert`].
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    pub fn get(&self, user: &str, repository: &str) -> Option<Arc<Vec<SyncRootEntry>>> {
        self.state
            .lock()
            .entries
            .get(&(user.to_string(), repository.to_string()))
            .cloned()
    }

    /// Store `roots` unless an invalidation happened since `generation`
    /// was read. The roots are returned either way.
    pub fn insert(
        &self,
        user: &str,
        repository: &str,
        roots: Vec<SyncRootEntry>,
        generation: u64,
    ) -> Arc<Vec<SyncRootEntry>> {
        let roots = Arc::new(roots);
        let mut state = self.state.lock();
        if state.generation == generation {
            state
                .entries
                .put((user.to_string(), repository.to_string()), roots.clone());
        } else {
            tracing::debug!("Roots of {} changed while loading, not caching", user);
        }
        roots
    }

    pub fn invalidate_user(&self, user: &str) {
        let mut state = self.state.lock();
        state.generation += 1;

        let stale: Vec<RootsKey> = state
            .entries
            .iter()
            .filter(|((u, _), _)| u == user)
            .map(|(key, _)| key.clone())
            .collect();
        for key in stale {
            state.entries.pop(&key);
        }
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.generation += 1;
        state.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::DocumentRef;

    fn entry(id: &str) -> SyncRootEntry {
        SyncRootEntry {
            reference: DocumentRef::new(id),
            path: format!("/{}", id),
            doc_type: "Folder".to_string(),
        }
    }

    #[test]
    fn test_invalidate_user_keeps_others() {
        let cache = RootsCache::new();
        let generation = cache.generation();
        cache.insert("jdoe", "default", vec![entry("a")], generation);
        cache.insert("jdoe", "archive", vec![entry("b")], generation);
        cache.insert("other", "default", vec![entry("c")], generation);

        cache.invalidate_user("jdoe");
        assert!(cache.get("jdoe", "default").is_none());
        assert!(cache.get("jdoe", "archive").is_none());
        assert_eq!(cache.get("other", "default").unwrap()[0], entry("c"));

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_evicts_least_recently_used_at_capacity() {
        let cache = RootsCache::with_capacity(2);
        let generation = cache.generation();
        cache.insert("a", "default", vec![entry("a")], generation);
        cache.insert("b", "default", vec![entry("b")], generation);

        // Touch "a" so "b" is the eviction candidate
        assert!(cache.get("a", "default").is_some());
        cache.insert("c", "default", vec![entry("c")], generation);

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a", "default").is_some());
        assert!(cache.get("b", "default").is_none());
        assert!(cache.get("c", "default").is_some());
    }

    #[test]
    fn test_zero_capacity_keeps_one_entry() {
        let cache = RootsCache::with_capacity(0);
        let generation = cache.generation();
        cache.insert("a", "default", vec![entry("a")], generation);
        cache.insert("b", "default", vec![entry("b")], generation);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_insert_after_invalidation_is_discarded() {
        let cache = RootsCache::new();
        let generation = cache.generation();

        // Another task changes the roots while this one is loading
        cache.invalidate_user("jdoe");

        let roots = cache.insert("jdoe", "default", vec![entry("stale")], generation);
        assert_eq!(roots[0], entry("stale"));
        assert!(cache.get("jdoe", "default").is_none());

        let fresh = cache.generation();
        cache.insert("jdoe", "default", vec![entry("fresh")], fresh);
        assert_eq!(cache.get("jdoe", "default").unwrap()[0], entry("fresh"));
    }
}
