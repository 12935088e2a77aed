//! In-process publish/subscribe for domain events.
//!
//! Synchronous fan-out in subscription order; no queuing, no retry, no
//! replay for late subscribers. UI components subscribe on mount and drop
//! the handle on unmount.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::trace;

use super::domain::DomainEvent;

type Callback = Arc<dyn Fn(&DomainEvent) + Send + Sync>;

struct BusInner {
    subscribers: RwLock<Vec<(u64, Callback)>>,
    next_id: AtomicU64,
}

#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

/// Handle returned by `subscribe`. Dropping it (or calling `unsubscribe`)
/// removes the callback from the bus.
pub struct Subscription {
    id: u64,
    bus: Weak<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register a callback. Callbacks run synchronously on the publishing
    /// thread, in subscription order.
    pub fn subscribe(
        &self,
        callback: impl Fn(&DomainEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .write()
            .push((id, Arc::new(callback)));
        Subscription {
            id,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Fan the event out to every subscriber, in subscription order.
    ///
    /// The subscriber list is snapshotted before dispatch, so callbacks may
    /// subscribe or unsubscribe without deadlocking; such changes take
    /// effect from the next publish.
    pub fn publish(&self, event: &DomainEvent) {
        let callbacks: Vec<Callback> = self
            .inner
            .subscribers
            .read()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        trace!(?event, subscribers = callbacks.len(), "publishing domain event");
        for callback in callbacks {
            callback(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Subscription {
    /// Explicitly remove the callback. Equivalent to dropping the handle.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.bus.upgrade() {
            inner.subscribers.write().retain(|(id, _)| *id != self.id);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Action;
    use parking_lot::Mutex;

    fn judge_event(judge_id: i64) -> DomainEvent {
        DomainEvent::Judge {
            action: Action::Updated,
            judge_id,
            cluster_id: 5,
        }
    }

    #[test]
    fn test_fan_out_in_subscription_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o1 = Arc::clone(&order);
        let _s1 = bus.subscribe(move |_| o1.lock().push("first"));
        let o2 = Arc::clone(&order);
        let _s2 = bus.subscribe(move |_| o2.lock().push("second"));

        bus.publish(&judge_event(1));
        assert_eq!(*order.lock(), vec!["first", "second"]);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(0u32));

        let counter = Arc::clone(&seen);
        let sub = bus.subscribe(move |_| *counter.lock() += 1);
        bus.publish(&judge_event(1));
        assert_eq!(*seen.lock(), 1);

        drop(sub);
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(&judge_event(2));
        assert_eq!(*seen.lock(), 1);
    }

    #[test]
    fn test_no_replay_for_late_subscribers() {
        let bus = EventBus::new();
        bus.publish(&judge_event(1));

        let seen = Arc::new(Mutex::new(0u32));
        let counter = Arc::clone(&seen);
        let _sub = bus.subscribe(move |_| *counter.lock() += 1);

        // Only events published after subscription arrive.
        assert_eq!(*seen.lock(), 0);
        bus.publish(&judge_event(2));
        assert_eq!(*seen.lock(), 1);
    }

    #[test]
    fn test_subscriber_may_unsubscribe_during_publish() {
        let bus = EventBus::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let inner_slot = Arc::clone(&slot);
        let sub = bus.subscribe(move |_| {
            // Self-unsubscribe from inside the callback.
            inner_slot.lock().take();
        });
        *slot.lock() = Some(sub);

        bus.publish(&judge_event(1));
        assert_eq!(bus.subscriber_count(), 0);
    }
}
