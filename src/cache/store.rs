//! Generic keyed entity store with get-or-fetch semantics.
//!
//! One `EntityStore` instance exists per relationship (judges-by-cluster,
//! contest-by-team, ...). Values are held until explicitly purged or
//! force-refreshed; presence alone signals freshness. Every store is a
//! shared structure any caller may read or write; consistency comes from
//! the invalidation rules and the optimistic/rollback discipline, not from
//! access partitioning.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::trace;

use crate::error::SyncError;

/// Capacity of the change-notification channel. Slow subscribers that lag
/// past this many notifications miss intermediate ticks, which is fine: a
/// tick only means "re-read the store".
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Hook invoked with the full store state after every local write.
/// Used to persist snapshots for cross-tab replication.
pub(crate) type WriteHook<K, V> = Arc<dyn Fn(&HashMap<K, V>) + Send + Sync>;

struct StoreInner<K, V> {
    name: Arc<str>,
    entries: RwLock<HashMap<K, V>>,
    /// Per-key mutation locks so overlapping optimistic mutations against
    /// the same key serialize instead of racing across an awaited call.
    locks: Mutex<HashMap<K, Arc<tokio::sync::Mutex<()>>>>,
    changed: broadcast::Sender<()>,
    on_write: RwLock<Option<WriteHook<K, V>>>,
}

pub struct EntityStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    inner: Arc<StoreInner<K, V>>,
}

impl<K, V> Clone for EntityStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> EntityStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a new empty store with the given name.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        let (changed, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(StoreInner {
                name: name.into(),
                entries: RwLock::new(HashMap::new()),
                locks: Mutex::new(HashMap::new()),
                changed,
                on_write: RwLock::new(None),
            }),
        }
    }

    /// Get the name of this store.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Synchronous cached read.
    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.entries.read().get(key).cloned()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.entries.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.read().is_empty()
    }

    /// Return the cached value, or run the supplied remote fetch and cache
    /// its result.
    ///
    /// Concurrent calls for the same key while a fetch is in flight are not
    /// de-duplicated; redundant network calls can occur, and callers
    /// mitigate by gating fetch effects on cache presence. A failed fetch
    /// leaves any prior value at the key untouched and propagates the error.
    pub async fn get_or_fetch<F>(&self, key: K, force: bool, fetch: F) -> Result<V, SyncError>
    where
        F: Future<Output = Result<V, SyncError>>,
    {
        if !force {
            if let Some(value) = self.get(&key) {
                return Ok(value);
            }
        }

        let value = fetch.await?;
        self.put(key, value.clone());
        Ok(value)
    }

    /// Unconditional overwrite. Used when a mutation returns the
    /// authoritative server object.
    pub fn put(&self, key: K, value: V) {
        self.inner.entries.write().insert(key, value);
        self.after_write();
    }

    /// Transform the value at `key` in place. Returns false when the key is
    /// absent, in which case nothing happens.
    pub fn merge(&self, key: &K, patch: impl FnOnce(&mut V)) -> bool {
        let patched = {
            let mut entries = self.inner.entries.write();
            match entries.get_mut(key) {
                Some(value) => {
                    patch(value);
                    true
                }
                None => false,
            }
        };
        if patched {
            self.after_write();
        }
        patched
    }

    /// Remove one entry. The next `get_or_fetch` for the key performs a
    /// network round trip.
    pub fn purge(&self, key: &K) {
        let removed = self.inner.entries.write().remove(key).is_some();
        if removed {
            trace!(store = %self.inner.name, "cache entry purged");
            self.reclaim_idle_locks();
            self.after_write();
        }
    }

    /// Remove every entry.
    pub fn purge_all(&self) {
        let mut entries = self.inner.entries.write();
        if entries.is_empty() {
            return;
        }
        entries.clear();
        drop(entries);
        trace!(store = %self.inner.name, "cache purged");
        self.reclaim_idle_locks();
        self.after_write();
    }

    /// Drop per-key mutation locks nobody holds; the table otherwise grows
    /// with every key ever mutated. A strong count above one means a
    /// mutation still holds (or is about to take) that lock.
    fn reclaim_idle_locks(&self) {
        self.inner
            .locks
            .lock()
            .retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    #[cfg(test)]
    fn lock_table_len(&self) -> usize {
        self.inner.locks.lock().len()
    }

    /// Clone of the full store state, for persistence.
    pub fn snapshot(&self) -> HashMap<K, V> {
        self.inner.entries.read().clone()
    }

    /// Bulk-replace the in-memory state from a replicated snapshot.
    ///
    /// Deliberately skips the persistence hook: a foreign tab's snapshot
    /// must not be re-persisted under this tab's origin, or tabs would echo
    /// records back and forth. Change subscribers are still notified.
    pub fn replace_all(&self, state: HashMap<K, V>) {
        *self.inner.entries.write() = state;
        self.notify_changed();
    }

    /// Subscribe to change notifications. A tick means "the store changed,
    /// re-read what you need"; no payload is carried.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.inner.changed.subscribe()
    }

    /// Per-key async mutex used by the mutation executor so overlapping
    /// mutations on one key serialize.
    pub fn mutation_lock(&self, key: &K) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.inner.locks.lock();
        Arc::clone(
            locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }

    /// Install the persistence hook. Invoked with the full state after
    /// every local write.
    pub(crate) fn set_write_hook(&self, hook: WriteHook<K, V>) {
        *self.inner.on_write.write() = Some(hook);
    }

    fn after_write(&self) {
        let hook = self.inner.on_write.read().clone();
        if let Some(hook) = hook {
            let snapshot = self.inner.entries.read().clone();
            hook(&snapshot);
        }
        self.notify_changed();
    }

    fn notify_changed(&self) {
        if self.inner.changed.send(()).is_err() {
            trace!(store = %self.inner.name, "no subscribers for store change");
        }
    }
}

impl<K, V> std::fmt::Debug for EntityStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore")
            .field("name", &self.inner.name)
            .field("len", &self.len())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
