//! The client-side cache layer.
//!
//! `EntityStore` is the generic keyed store; `Stores` owns one per
//! relationship and wraps every remote read and mutation the app performs.
//! `mutation` holds the optimistic commit-or-rollback executor the
//! mutation wrappers run on.

pub mod mutation;
mod store;
mod stores;

pub use store::EntityStore;
pub use stores::Stores;
