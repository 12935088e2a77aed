//! Client-side data consistency layer for tournament scoring.
//!
//! Keeps a judging client's view of a remote scoring API coherent:
//!
//! - [`cache`]: one keyed [`cache::EntityStore`] per relationship with
//!   get-or-fetch reads, and [`cache::Stores`] wrapping every remote read
//!   and optimistic mutation.
//! - [`events`]: a synchronous [`events::EventBus`] for domain changes, and
//!   the static rule table mapping each change to the caches it purges.
//! - [`sync`]: persisted store snapshots plus the file-watching
//!   [`sync::Replicator`] that converges concurrent tabs.
//! - [`api`]: the typed HTTP client all fetches and mutations go through.
//!
//! Typical wiring:
//!
//! ```no_run
//! use std::sync::Arc;
//! use scoresync::{ApiClient, Config, EventBus, Stores};
//! use scoresync::events::register_invalidation;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::from_env()?;
//! let api = ApiClient::new(&config.api_base_url)?;
//! let (stores, mut replicator) = Stores::with_persistence(api, &config)?;
//! let stores = Arc::new(stores);
//!
//! let bus = EventBus::new();
//! let _invalidation = register_invalidation(&bus, Arc::clone(&stores));
//! replicator.start()?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod sync;

pub use api::ApiClient;
pub use cache::{EntityStore, Stores};
pub use config::Config;
pub use error::SyncError;
pub use events::{DomainEvent, EventBus};
pub use sync::{Replicator, StoreBackend};
