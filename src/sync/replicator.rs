//! Cross-tab snapshot replication.
//!
//! Watches the storage files backing opted-in stores. When another tab
//! writes one, the new record is parsed and the local store's in-memory
//! state is bulk-replaced, last-write-wins. No `DomainEvent` is republished
//! locally: only raw snapshots synchronize, so other derived caches in the
//! receiving tab may stay stale until that tab performs its own mutation or
//! reloads. That gap is intentional and preserved from the original design;
//! re-publishing synthetic events here would need a product decision first.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::cache::EntityStore;

use super::persist::StoreBackend;

/// Re-reads one backend and replaces one store. Returns whether the local
/// state was actually replaced.
type ApplyFn = Arc<dyn Fn() -> Result<bool> + Send + Sync>;

pub struct Replicator {
    entries: Arc<RwLock<HashMap<PathBuf, ApplyFn>>>,
    watcher: Option<RecommendedWatcher>,
}

impl Replicator {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            watcher: None,
        }
    }

    /// Mirror foreign writes of `backend` into `store`.
    ///
    /// Records whose origin matches the backend's own origin are skipped:
    /// the filesystem watcher also reports this tab's writes, and echoing
    /// them back would be a wasted replace.
    pub fn register<K, V>(&mut self, store: EntityStore<K, V>, backend: StoreBackend)
    where
        K: Eq + Hash + Clone + Send + Sync + DeserializeOwned + 'static,
        V: Clone + Send + Sync + DeserializeOwned + 'static,
    {
        let path = backend.path().to_path_buf();
        let own_origin = backend.origin();
        let apply: ApplyFn = Arc::new(move || {
            let Some(record) = backend.load_record::<K, V>()? else {
                return Ok(false);
            };
            if record.origin == own_origin {
                return Ok(false);
            }
            store.replace_all(record.state.into_iter().collect());
            Ok(true)
        });
        self.entries.write().insert(path, apply);
    }

    /// Apply whatever record is at `path`, if it backs a registered store.
    /// Returns whether the local store was replaced. The watcher routes
    /// through here; it is also the deterministic entry point for tests.
    pub fn apply_change(&self, path: &Path) -> Result<bool> {
        let apply = self.entries.read().get(path).cloned();
        match apply {
            Some(apply) => apply(),
            None => Ok(false),
        }
    }

    /// Start watching the storage directories of all registered backends.
    /// Registrations made after this call are not picked up by the watcher.
    pub fn start(&mut self) -> Result<()> {
        let entries = Arc::clone(&self.entries);
        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                        return;
                    }
                    for path in &event.paths {
                        let apply = entries.read().get(path.as_path()).cloned();
                        let Some(apply) = apply else { continue };
                        match apply() {
                            Ok(true) => {
                                debug!(path = %path.display(), "applied replicated cache snapshot");
                            }
                            Ok(false) => {}
                            Err(e) => {
                                warn!(
                                    path = %path.display(),
                                    error = %e,
                                    "failed to apply replicated cache snapshot"
                                );
                            }
                        }
                    }
                }
                Err(e) => warn!(error = %e, "storage watch error"),
            })
            .context("Failed to create storage watcher")?;

        let dirs: HashSet<PathBuf> = self
            .entries
            .read()
            .keys()
            .filter_map(|p| p.parent().map(Path::to_path_buf))
            .collect();
        for dir in dirs {
            watcher
                .watch(&dir, RecursiveMode::NonRecursive)
                .with_context(|| format!("Failed to watch storage directory: {}", dir.display()))?;
        }

        self.watcher = Some(watcher);
        Ok(())
    }
}

impl Default for Replicator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
