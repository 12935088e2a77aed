//! Persisted cache snapshots and cross-tab replication.
//!
//! Opted-in entity stores serialize their whole state to one versioned
//! JSON file each. The replicator watches those files and bulk-replaces
//! local store state when another tab writes, last-write-wins at the
//! granularity of a whole record.

mod persist;
mod replicator;

pub use persist::{attach, restore, PersistedCacheRecord, StoreBackend, SCHEMA_VERSION};
pub use replicator::Replicator;
