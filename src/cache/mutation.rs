//! Optimistic mutation executor.
//!
//! Wraps a remote write with snapshot, optimistic local apply, and
//! commit-or-rollback:
//!
//! ```text
//! IDLE -> SNAPSHOT_TAKEN -> OPTIMISTIC_APPLIED
//!     -> (REMOTE_OK   -> SETTLED)
//!      | (REMOTE_FAIL -> ROLLED_BACK -> SETTLED)
//! ```
//!
//! The executor never publishes invalidation events itself; after a
//! successful write the caller publishes the matching `DomainEvent` so the
//! invalidation subscriber can purge dependent caches.
//!
//! Overlapping mutations against the same key serialize through the store's
//! per-key mutation lock, held across the awaited remote call.

use std::future::Future;
use std::hash::Hash;

use tracing::{debug, warn};

use crate::error::SyncError;

use super::store::EntityStore;

/// The value at the key immediately before the optimistic transform,
/// retained only for the duration of the in-flight remote call. `None`
/// records that the key was absent.
struct MutationSnapshot<V> {
    value: Option<V>,
}

/// Run one optimistic mutation against `key`.
///
/// `apply` receives the current value (if any) and returns the optimistic
/// value; returning `None` removes the entry. `remote` performs the write;
/// resolving to `Some(v)` replaces the optimistic value with the server's
/// authoritative object, `None` keeps the optimistic value.
///
/// On remote failure the key is restored to the exact snapshot before the
/// error is re-raised.
pub async fn execute<K, V, Fut>(
    store: &EntityStore<K, V>,
    key: K,
    apply: impl FnOnce(Option<V>) -> Option<V>,
    remote: Fut,
) -> Result<(), SyncError>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<V>, SyncError>>,
{
    let lock = store.mutation_lock(&key);
    let _guard = lock.lock().await;
    run(store, key, apply, remote).await
}

/// Like [`execute`], but on failure additionally runs a forced refetch of
/// the key after rollback. Used for mutations that remove or relocate a
/// relationship: with no transaction log, the only reliable correction
/// after an ambiguous partial failure is re-deriving state from the source
/// of truth. A failed refetch is logged and does not mask the original
/// mutation error.
pub async fn execute_with_refetch<K, V, Fut, RFut>(
    store: &EntityStore<K, V>,
    key: K,
    apply: impl FnOnce(Option<V>) -> Option<V>,
    remote: Fut,
    refetch: RFut,
) -> Result<(), SyncError>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<V>, SyncError>>,
    RFut: Future<Output = Result<V, SyncError>>,
{
    let lock = store.mutation_lock(&key);
    let _guard = lock.lock().await;

    match run(store, key.clone(), apply, remote).await {
        Ok(()) => Ok(()),
        Err(err) => {
            match refetch.await {
                Ok(value) => {
                    debug!(store = store.name(), "reconciled key from server after rollback");
                    store.put(key, value);
                }
                Err(refetch_err) => {
                    warn!(
                        store = store.name(),
                        error = %refetch_err,
                        "refetch after rollback failed; cache keeps the restored snapshot"
                    );
                }
            }
            Err(err)
        }
    }
}

/// Run one optimistic transfer across two keys of the same store: the only
/// multi-key mutation the layer supports (moving a judge between clusters).
///
/// Both keys lock in `Ord` order so two opposite transfers cannot deadlock.
/// `apply` receives both current values and returns the optimistic pair;
/// `None` removes the entry. On remote failure both snapshots are restored
/// and both keys are re-derived through `refetch`, since a partial
/// server-side move cannot be told apart from no move at all. A failed
/// refetch is logged and does not mask the original error.
pub async fn execute_across<K, V, Fut, RFut>(
    store: &EntityStore<K, V>,
    from: K,
    to: K,
    apply: impl FnOnce(Option<V>, Option<V>) -> (Option<V>, Option<V>),
    remote: Fut,
    refetch: impl Fn(K) -> RFut,
) -> Result<(), SyncError>
where
    K: Eq + Ord + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<(), SyncError>>,
    RFut: Future<Output = Result<V, SyncError>>,
{
    if from == to {
        return Err(SyncError::Invariant("transfer requires two distinct keys"));
    }

    let (lo, hi) = if from < to {
        (from.clone(), to.clone())
    } else {
        (to.clone(), from.clone())
    };
    let lock_lo = store.mutation_lock(&lo);
    let lock_hi = store.mutation_lock(&hi);
    let _guard_lo = lock_lo.lock().await;
    let _guard_hi = lock_hi.lock().await;

    let from_snapshot = store.get(&from);
    let to_snapshot = store.get(&to);

    let (from_value, to_value) = apply(from_snapshot.clone(), to_snapshot.clone());
    settle(store, &from, from_value);
    settle(store, &to, to_value);

    match remote.await {
        Ok(()) => Ok(()),
        Err(err) => {
            settle(store, &from, from_snapshot);
            settle(store, &to, to_snapshot);
            for key in [from, to] {
                match refetch(key.clone()).await {
                    Ok(value) => store.put(key, value),
                    Err(refetch_err) => warn!(
                        store = store.name(),
                        error = %refetch_err,
                        "refetch after rolled-back transfer failed; cache keeps the restored snapshot"
                    ),
                }
            }
            debug!(store = store.name(), error = %err, "transfer rolled back");
            Err(err)
        }
    }
}

fn settle<K, V>(store: &EntityStore<K, V>, key: &K, value: Option<V>)
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    match value {
        Some(v) => store.put(key.clone(), v),
        None => store.purge(key),
    }
}

async fn run<K, V, Fut>(
    store: &EntityStore<K, V>,
    key: K,
    apply: impl FnOnce(Option<V>) -> Option<V>,
    remote: Fut,
) -> Result<(), SyncError>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<V>, SyncError>>,
{
    let current = store.get(&key);
    let mut snapshot = Some(MutationSnapshot {
        value: current.clone(),
    });

    // Observers see the optimistic value immediately, before the remote
    // call settles.
    match apply(current) {
        Some(value) => store.put(key.clone(), value),
        None => store.purge(&key),
    }

    match remote.await {
        Ok(server_value) => {
            if let Some(value) = server_value {
                store.put(key, value);
            }
            Ok(())
        }
        Err(err) => {
            let snap = snapshot
                .take()
                .ok_or(SyncError::Invariant("rollback without a captured snapshot"))?;
            match snap.value {
                Some(value) => store.put(key.clone(), value),
                None => store.purge(&key),
            }
            debug!(store = store.name(), error = %err, "mutation rolled back");
            Err(err)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn judges_store() -> EntityStore<i64, Vec<String>> {
        EntityStore::new("judges_by_cluster")
    }

    fn judges(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test]
    async fn test_success_keeps_optimistic_value() {
        let store = judges_store();
        store.put(5, judges(&["J1", "J2"]));

        execute(
            &store,
            5,
            |list| {
                list.map(|mut l| {
                    l.push("J3".to_string());
                    l
                })
            },
            async { Ok(None) },
        )
        .await
        .unwrap();

        assert_eq!(store.get(&5).unwrap(), judges(&["J1", "J2", "J3"]));
    }

    #[tokio::test]
    async fn test_success_adopts_server_value() {
        let store = judges_store();
        store.put(5, judges(&["J1"]));

        execute(
            &store,
            5,
            |list| {
                list.map(|mut l| {
                    l.push("draft".to_string());
                    l
                })
            },
            async { Ok(Some(judges(&["J1", "J2-authoritative"]))) },
        )
        .await
        .unwrap();

        assert_eq!(store.get(&5).unwrap(), judges(&["J1", "J2-authoritative"]));
    }

    #[tokio::test]
    async fn test_rollback_restores_exact_snapshot() {
        let store = judges_store();
        store.put(5, judges(&["J1", "J2"]));

        // Optimistic removal of J2, then the remote delete fails.
        let result = execute(
            &store,
            5,
            |list| {
                list.map(|mut l| {
                    l.retain(|j| j != "J2");
                    l
                })
            },
            async { Err(SyncError::Network("connection reset".to_string())) },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(store.get(&5).unwrap(), judges(&["J1", "J2"]));
    }

    #[tokio::test]
    async fn test_rollback_restores_absent_key() {
        let store = judges_store();
        assert!(store.get(&5).is_none());

        let result = execute(
            &store,
            5,
            |_| Some(judges(&["optimistic"])),
            async { Err(SyncError::Validation("rejected".to_string())) },
        )
        .await;

        assert!(result.is_err());
        // The key was absent before the mutation; rollback removes it again.
        assert!(store.get(&5).is_none());
    }

    #[tokio::test]
    async fn test_failed_removal_schedules_forced_refetch() {
        let store = judges_store();
        store.put(5, judges(&["J1", "J2"]));
        let refetches = AtomicUsize::new(0);

        let result = execute_with_refetch(
            &store,
            5,
            |list| {
                list.map(|mut l| {
                    l.retain(|j| j != "J2");
                    l
                })
            },
            async { Err(SyncError::Network("timeout".to_string())) },
            async {
                refetches.fetch_add(1, Ordering::SeqCst);
                // Server truth had already diverged from the snapshot.
                Ok(judges(&["J1", "J2", "J3"]))
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(refetches.load(Ordering::SeqCst), 1);
        assert_eq!(store.get(&5).unwrap(), judges(&["J1", "J2", "J3"]));
    }

    #[tokio::test]
    async fn test_failed_refetch_keeps_snapshot_and_original_error() {
        let store = judges_store();
        store.put(5, judges(&["J1", "J2"]));

        let result = execute_with_refetch(
            &store,
            5,
            |list| {
                list.map(|mut l| {
                    l.retain(|j| j != "J2");
                    l
                })
            },
            async { Err(SyncError::Validation("cannot remove head judge".to_string())) },
            async { Err(SyncError::Network("still down".to_string())) },
        )
        .await;

        // The original mutation error surfaces, not the refetch error.
        assert!(matches!(result, Err(SyncError::Validation(_))));
        assert_eq!(store.get(&5).unwrap(), judges(&["J1", "J2"]));
    }

    fn move_j2(
        from: Option<Vec<String>>,
        to: Option<Vec<String>>,
    ) -> (Option<Vec<String>>, Option<Vec<String>>) {
        let from = from.map(|mut l| {
            l.retain(|j| j != "J2");
            l
        });
        let to = to.map(|mut l| {
            l.push("J2".to_string());
            l
        });
        (from, to)
    }

    #[tokio::test]
    async fn test_transfer_moves_value_between_keys() {
        let store = judges_store();
        store.put(5, judges(&["J1", "J2"]));
        store.put(6, judges(&["J3"]));

        execute_across(
            &store,
            5,
            6,
            move_j2,
            async { Ok(()) },
            |_| async { Ok(judges(&[])) },
        )
        .await
        .unwrap();

        assert_eq!(store.get(&5).unwrap(), judges(&["J1"]));
        assert_eq!(store.get(&6).unwrap(), judges(&["J3", "J2"]));
    }

    #[tokio::test]
    async fn test_failed_transfer_restores_and_refetches_both_keys() {
        let store = judges_store();
        store.put(5, judges(&["J1", "J2"]));
        store.put(6, judges(&["J3"]));
        let refetches = AtomicUsize::new(0);

        let result = execute_across(
            &store,
            5,
            6,
            move_j2,
            async { Err(SyncError::Network("timeout".to_string())) },
            |cluster| {
                refetches.fetch_add(1, Ordering::SeqCst);
                async move {
                    // Server truth had diverged on the source cluster.
                    if cluster == 5 {
                        Ok(judges(&["J1", "J2", "J4"]))
                    } else {
                        Ok(judges(&["J3"]))
                    }
                }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(refetches.load(Ordering::SeqCst), 2);
        assert_eq!(store.get(&5).unwrap(), judges(&["J1", "J2", "J4"]));
        assert_eq!(store.get(&6).unwrap(), judges(&["J3"]));
    }

    #[tokio::test]
    async fn test_failed_transfer_refetch_failure_keeps_snapshots() {
        let store = judges_store();
        store.put(5, judges(&["J1", "J2"]));
        store.put(6, judges(&["J3"]));

        let result = execute_across(
            &store,
            5,
            6,
            move_j2,
            async { Err(SyncError::Validation("judge is mid-session".to_string())) },
            |_| async { Err(SyncError::Network("still down".to_string())) },
        )
        .await;

        // The original mutation error surfaces and both keys hold the
        // pre-transfer snapshots.
        assert!(matches!(result, Err(SyncError::Validation(_))));
        assert_eq!(store.get(&5).unwrap(), judges(&["J1", "J2"]));
        assert_eq!(store.get(&6).unwrap(), judges(&["J3"]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_overlapping_mutations_on_same_key_serialize() {
        let store = judges_store();
        store.put(5, judges(&["J1"]));
        let log: Arc<parking_lot::Mutex<Vec<&'static str>>> =
            Arc::new(parking_lot::Mutex::new(Vec::new()));

        let store_a = store.clone();
        let log_a = Arc::clone(&log);
        let first = tokio::spawn(async move {
            execute(
                &store_a,
                5,
                |list| {
                    list.map(|mut l| {
                        l.push("A".to_string());
                        l
                    })
                },
                async {
                    log_a.lock().push("a_start");
                    tokio::time::sleep(Duration::from_millis(80)).await;
                    log_a.lock().push("a_end");
                    Ok(None)
                },
            )
            .await
        });

        // Give the first mutation time to take the key lock.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let store_b = store.clone();
        let log_b = Arc::clone(&log);
        let second = tokio::spawn(async move {
            execute(
                &store_b,
                5,
                |list| {
                    list.map(|mut l| {
                        l.push("B".to_string());
                        l
                    })
                },
                async {
                    log_b.lock().push("b_start");
                    Ok(None)
                },
            )
            .await
        });

        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        assert_eq!(*log.lock(), vec!["a_start", "a_end", "b_start"]);
        assert_eq!(store.get(&5).unwrap(), judges(&["J1", "A", "B"]));
    }
}
