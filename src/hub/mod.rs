//! Topic-addressed, in-process publish/subscribe bus.
//!
//! The hub fans the single transaction-log stream out to per-tenant
//! subscribers. Each subscription owns a bounded delivery queue drained by
//! its own tokio task, so per-subscriber delivery order equals publish
//! order and a slow handler never blocks the publisher.
//!
//! # Backpressure
//!
//! Delivery queues are bounded. A subscriber whose queue is full at
//! publish time is dropped from the hub with a warning diagnostic; the
//! tailer is never blocked waiting for a laggard.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::domain::{Topic, TopicFilter};

/// Identifies one live subscription; releasing it via
/// [`EventHub::unsubscribe`] stops delivery.
#[derive(Debug)]
pub struct SubscriptionToken {
    id: u64,
}

struct Subscription<P> {
    filter: TopicFilter,
    queue: mpsc::Sender<(Topic, P)>,
    dispatch: tokio::task::JoinHandle<()>,
}

/// In-process pub/sub bus with per-subscription bounded queues.
pub struct EventHub<P: Clone + Send + 'static> {
    subscriptions: Mutex<HashMap<u64, Subscription<P>>>,
    next_id: AtomicU64,
    queue_capacity: usize,
}

impl<P: Clone + Send + 'static> EventHub<P> {
    /// Create a hub whose subscriptions buffer up to `queue_capacity`
    /// undelivered payloads each.
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            subscriptions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            queue_capacity,
        }
    }

    /// Register `handler` for every topic matching `filter`.
    ///
    /// The handler runs on the subscription's own dispatch task, one
    /// payload at a time, in publish order. It must keep up: if the
    /// subscription's queue (capacity set at hub construction) is full
    /// when a payload arrives, the subscription is dropped.
    pub fn subscribe<F>(&self, filter: TopicFilter, handler: F) -> SubscriptionToken
    where
        F: Fn(Topic, P) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, mut rx) = mpsc::channel::<(Topic, P)>(self.queue_capacity);

        let dispatch = tokio::spawn(async move {
            while let Some((topic, payload)) = rx.recv().await {
                handler(topic, payload);
            }
        });

        debug!(subscription = id, filter = %filter, "Hub subscription added");
        self.subscriptions.lock().insert(
            id,
            Subscription {
                filter,
                queue: tx,
                dispatch,
            },
        );
        SubscriptionToken { id }
    }

    /// Deliver `payload` to every subscription matching `topic`.
    ///
    /// Returns once the payload is enqueued on every matching
    /// subscription's queue; handlers run asynchronously on their own
    /// tasks. Subscribers whose queue is full are unsubscribed with a
    /// diagnostic.
    pub fn publish(&self, topic: &Topic, payload: P) {
        let mut subs = self.subscriptions.lock();
        let mut dropped = Vec::new();

        for (id, sub) in subs.iter() {
            if !sub.filter.matches(topic) {
                continue;
            }
            match sub.queue.try_send((topic.clone(), payload.clone())) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        subscription = id,
                        filter = %sub.filter,
                        capacity = self.queue_capacity,
                        "Dropping subscriber: delivery queue full"
                    );
                    dropped.push(*id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    dropped.push(*id);
                }
            }
        }

        for id in dropped {
            if let Some(sub) = subs.remove(&id) {
                sub.dispatch.abort();
            }
        }
    }

    /// Stop delivery for `token`. Idempotent; once this returns the
    /// handler is not invoked again.
    pub fn unsubscribe(&self, token: &SubscriptionToken) {
        let sub = self.subscriptions.lock().remove(&token.id);
        if let Some(sub) = sub {
            sub.dispatch.abort();
            debug!(subscription = token.id, "Hub subscription removed");
        }
    }

    /// Drop every subscription. Used at pool shutdown.
    pub fn close(&self) {
        let subs: Vec<_> = {
            let mut map = self.subscriptions.lock();
            map.drain().collect()
        };
        for (_, sub) in subs {
            sub.dispatch.abort();
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::domain::TenantId;

    fn topic(tenant: &str, collection: &str) -> Topic {
        Topic::new(TenantId::from(tenant), collection)
    }

    async fn settle() {
        // Let dispatch tasks drain their queues.
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_publish_reaches_matching_subscriber() {
        let hub = EventHub::new(16);
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();

        let _token = hub.subscribe(TopicFilter::Exact(topic("t1", "machines")), move |_, _: u32| {
            seen2.fetch_add(1, Ordering::SeqCst);
        });

        hub.publish(&topic("t1", "machines"), 1);
        hub.publish(&topic("t1", "units"), 2);
        hub.publish(&topic("t2", "machines"), 3);
        settle().await;

        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_tenant_filter_sees_all_collections() {
        let hub = EventHub::new(16);
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();

        let _token = hub.subscribe(TopicFilter::Tenant(TenantId::from("t1")), move |_, _: u32| {
            seen2.fetch_add(1, Ordering::SeqCst);
        });

        hub.publish(&topic("t1", "machines"), 1);
        hub.publish(&topic("t1", "units"), 2);
        hub.publish(&topic("t2", "machines"), 3);
        settle().await;

        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_delivery_preserves_publish_order() {
        let hub = EventHub::new(64);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();

        let _token = hub.subscribe(TopicFilter::Tenant(TenantId::from("t1")), move |_, n: u32| {
            seen2.lock().push(n);
        });

        for n in 0..50 {
            hub.publish(&topic("t1", "machines"), n);
        }
        settle().await;

        assert_eq!(*seen.lock(), (0..50).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let hub = EventHub::new(16);
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();

        let token = hub.subscribe(TopicFilter::Tenant(TenantId::from("t1")), move |_, _: u32| {
            seen2.fetch_add(1, Ordering::SeqCst);
        });
        hub.publish(&topic("t1", "machines"), 1);
        settle().await;

        hub.unsubscribe(&token);
        hub.publish(&topic("t1", "machines"), 2);
        settle().await;

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let hub: EventHub<u32> = EventHub::new(16);
        let token = hub.subscribe(TopicFilter::Tenant(TenantId::from("t1")), |_, _| {});

        hub.unsubscribe(&token);
        hub.unsubscribe(&token);

        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_slow_subscriber_is_dropped() {
        let hub = EventHub::new(2);
        // Block the dispatch task so payloads pile up in the queue.
        let _token = hub.subscribe(TopicFilter::Tenant(TenantId::from("t1")), |_, _: u32| {
            std::thread::sleep(Duration::from_millis(200));
        });

        // Queue capacity is 2; the overflow drops the subscriber.
        for n in 0..10 {
            hub.publish(&topic("t1", "machines"), n);
        }

        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_close_drops_all_subscriptions() {
        let hub: EventHub<u32> = EventHub::new(16);
        let _a = hub.subscribe(TopicFilter::Tenant(TenantId::from("t1")), |_, _| {});
        let _b = hub.subscribe(TopicFilter::Tenant(TenantId::from("t2")), |_, _| {});

        hub.close();

        assert_eq!(hub.subscriber_count(), 0);
    }
}
