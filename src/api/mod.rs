//! Remote API boundary.
//!
//! Stateless CRUD endpoints per entity. The cache layer treats every
//! rejection from here uniformly as a failed fetch or mutation; the
//! `SyncError` variants carry the distinction for the UI.

mod client;

pub use client::ApiClient;
