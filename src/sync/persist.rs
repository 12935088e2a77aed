//! Serialized store snapshots.
//!
//! Each opted-in store persists as a JSON envelope with a schema version
//! marker plus the full store state. Two tiers exist: session-scoped files
//! under a temp-backed directory, and durable files that survive restarts
//! (team rosters and the like). A version mismatch is treated as an absent
//! cache, never an error.

use std::collections::HashMap;
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::EntityStore;

/// Bumped whenever the persisted shape changes; older records are ignored.
pub const SCHEMA_VERSION: u32 = 1;

/// The serialized form of one entity store. State is stored as key/value
/// pairs so composite keys survive JSON, which only allows string map keys.
#[derive(Debug, Serialize, Deserialize)]
pub struct PersistedCacheRecord<K, V> {
    pub version: u32,
    /// Identifies the writing tab so the replicator can skip records this
    /// tab wrote itself.
    pub origin: u32,
    #[serde(rename = "savedAt")]
    pub saved_at: DateTime<Utc>,
    pub state: Vec<(K, V)>,
}

/// Default origin for this tab/process.
pub(crate) fn origin_id() -> u32 {
    std::process::id()
}

/// One named storage slot backing one entity store.
#[derive(Debug, Clone)]
pub struct StoreBackend {
    path: PathBuf,
    origin: u32,
}

impl StoreBackend {
    /// Create a backend writing `<dir>/<key>.json`, creating the directory
    /// if needed.
    pub fn new(dir: &Path, key: &str) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create storage directory: {}", dir.display()))?;
        Ok(Self {
            path: dir.join(format!("{}.json", key)),
            origin: origin_id(),
        })
    }

    /// Override the origin marker. Each tab needs a distinct origin;
    /// the process id is the default.
    pub fn with_origin(mut self, origin: u32) -> Self {
        self.origin = origin;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn origin(&self) -> u32 {
        self.origin
    }

    pub fn save<K, V>(&self, state: &HashMap<K, V>) -> Result<()>
    where
        K: Serialize + Clone,
        V: Serialize + Clone,
    {
        let record = PersistedCacheRecord {
            version: SCHEMA_VERSION,
            origin: self.origin,
            saved_at: Utc::now(),
            state: state
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<Vec<_>>(),
        };
        let contents = serde_json::to_string_pretty(&record)?;
        std::fs::write(&self.path, contents)
            .with_context(|| format!("Failed to write cache file: {}", self.path.display()))?;
        Ok(())
    }

    pub fn load_record<K, V>(&self) -> Result<Option<PersistedCacheRecord<K, V>>>
    where
        K: DeserializeOwned,
        V: DeserializeOwned,
    {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read cache file: {}", self.path.display()))?;
        let record: PersistedCacheRecord<K, V> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse cache file: {}", self.path.display()))?;

        if record.version != SCHEMA_VERSION {
            debug!(
                path = %self.path.display(),
                found = record.version,
                expected = SCHEMA_VERSION,
                "cache schema version mismatch, treating as absent"
            );
            return Ok(None);
        }

        Ok(Some(record))
    }

    pub fn load_state<K, V>(&self) -> Result<Option<HashMap<K, V>>>
    where
        K: DeserializeOwned + Eq + Hash,
        V: DeserializeOwned,
    {
        Ok(self
            .load_record()?
            .map(|record| record.state.into_iter().collect()))
    }
}

/// Persist the store through this backend after every local write.
/// Persistence failures are logged, never raised: a broken disk must not
/// fail the mutation that triggered the save.
pub fn attach<K, V>(store: &EntityStore<K, V>, backend: StoreBackend)
where
    K: Eq + Hash + Clone + Send + Sync + Serialize + 'static,
    V: Clone + Send + Sync + Serialize + 'static,
{
    let name = store.name().to_string();
    store.set_write_hook(Arc::new(move |state| {
        if let Err(e) = backend.save(state) {
            warn!(store = %name, error = %e, "failed to persist cache snapshot");
        }
    }));
}

/// Load the persisted record (if any) into the store. Used once at startup
/// before attaching the write hook.
pub fn restore<K, V>(store: &EntityStore<K, V>, backend: &StoreBackend) -> Result<()>
where
    K: Eq + Hash + Clone + Send + Sync + DeserializeOwned + 'static,
    V: Clone + Send + Sync + DeserializeOwned + 'static,
{
    if let Some(state) = backend.load_state()? {
        debug!(store = store.name(), entries = state.len(), "restored cache from disk");
        store.replace_all(state);
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ScoreEntry, Scoresheet, ScoresheetKey, SheetType};

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = StoreBackend::new(dir.path(), "judges_by_cluster").unwrap();

        let mut state: HashMap<i64, Vec<String>> = HashMap::new();
        state.insert(5, vec!["J1".to_string(), "J2".to_string()]);
        backend.save(&state).unwrap();

        let loaded: HashMap<i64, Vec<String>> = backend.load_state().unwrap().unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_composite_key_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = StoreBackend::new(dir.path(), "scoresheets").unwrap();

        let key = ScoresheetKey {
            team_id: 9,
            judge_id: 4,
            sheet_type: SheetType::CoreValues,
        };
        let sheet = Scoresheet {
            team_id: 9,
            judge_id: 4,
            sheet_type: SheetType::CoreValues,
            scores: vec![ScoreEntry {
                criterion: "teamwork".to_string(),
                value: 3.0,
            }],
            comment: Some("strong".to_string()),
            submitted: false,
            total: None,
        };
        let mut state = HashMap::new();
        state.insert(key, sheet.clone());
        backend.save(&state).unwrap();

        let loaded: HashMap<ScoresheetKey, Scoresheet> =
            backend.load_state().unwrap().unwrap();
        assert_eq!(loaded.get(&key), Some(&sheet));
    }

    #[test]
    fn test_missing_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let backend = StoreBackend::new(dir.path(), "teams_by_cluster").unwrap();
        let loaded: Option<HashMap<i64, Vec<String>>> = backend.load_state().unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_version_mismatch_treated_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let backend = StoreBackend::new(dir.path(), "teams_by_cluster").unwrap();

        let stale = serde_json::json!({
            "version": 0,
            "origin": 1,
            "savedAt": Utc::now(),
            "state": [[5, ["T1"]]],
        });
        std::fs::write(backend.path(), stale.to_string()).unwrap();

        let loaded: Option<HashMap<i64, Vec<String>>> = backend.load_state().unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_attached_store_persists_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let backend = StoreBackend::new(dir.path(), "judges_by_cluster").unwrap();
        let store: EntityStore<i64, Vec<String>> = EntityStore::new("judges_by_cluster");
        attach(&store, backend.clone());

        store.put(5, vec!["J1".to_string()]);

        let loaded: HashMap<i64, Vec<String>> = backend.load_state().unwrap().unwrap();
        assert_eq!(loaded.get(&5).unwrap(), &vec!["J1".to_string()]);
    }

    #[test]
    fn test_restore_populates_store() {
        let dir = tempfile::tempdir().unwrap();
        let backend = StoreBackend::new(dir.path(), "judges_by_cluster").unwrap();

        let mut state: HashMap<i64, Vec<String>> = HashMap::new();
        state.insert(5, vec!["J1".to_string()]);
        backend.save(&state).unwrap();

        let store: EntityStore<i64, Vec<String>> = EntityStore::new("judges_by_cluster");
        restore(&store, &backend).unwrap();
        assert_eq!(store.get(&5).unwrap(), vec!["J1".to_string()]);
    }
}
