//! Domain events and invalidation.
//!
//! UI surfaces publish a `DomainEvent` after every successful remote write;
//! the invalidation subscriber consumes a static rule table mapping change
//! types to the caches that must be purged. Next read of a purged cache
//! refetches from the source of truth.

mod bus;
mod domain;
pub mod invalidation;

pub use bus::{EventBus, Subscription};
pub use domain::{Action, DomainEvent, EntityKind};
pub use invalidation::{register_invalidation, CacheId, InvalidationRule, RULES};
