//! Fan-out of committed exchange events
//!
//! Every subscriber gets its own unbounded crossbeam channel. Events are
//! published in commit order; subscribers whose receiver was dropped are
//! pruned on the next publish.

use crossbeam_channel::{unbounded, Receiver, Sender};
use leafswap_types::ExchangeEvent;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

pub struct EventBus<T> {
    subscribers: Mutex<Vec<Sender<ExchangeEvent<T>>>>,
    published: AtomicU64,
}

impl<T: Clone> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> EventBus<T> {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            published: AtomicU64::new(0),
        }
    }

    /// Receive every event published from now on
    pub fn subscribe(&self) -> Receiver<ExchangeEvent<T>> {
        let (tx, rx) = unbounded();
        let mut subscribers = self.subscribers.lock();
        subscribers.push(tx);
        debug!("Event subscriber added ({} total)", subscribers.len());
        rx
    }

    pub fn publish(&self, event: ExchangeEvent<T>) {
        self.publish_all(std::iter::once(event));
    }

    /// Publish a batch in order, holding the subscriber list once
    pub fn publish_all(&self, events: impl IntoIterator<Item = ExchangeEvent<T>>) {
        let mut subscribers = self.subscribers.lock();
        for event in events {
            trace!("Publishing {} for {}", event.kind(), event.pair());
            subscribers.retain(|tx| tx.send(event.clone()).is_ok());
            self.published.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Total events published since start
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leafswap_types::{PairId, U256};

    fn sync(pair: u64) -> ExchangeEvent<u8> {
        ExchangeEvent::Sync {
            pair: PairId::new(pair),
            reserve0: U256::one(),
            reserve1: U256::one(),
        }
    }

    #[test]
    fn test_every_subscriber_sees_events_in_order() {
        let bus = EventBus::new();
        let first = bus.subscribe();
        let second = bus.subscribe();

        bus.publish_all(vec![sync(1), sync(2)]);

        for rx in [&first, &second] {
            assert_eq!(rx.try_recv().unwrap().pair(), PairId::new(1));
            assert_eq!(rx.try_recv().unwrap().pair(), PairId::new(2));
            assert!(rx.try_recv().is_err());
        }
        assert_eq!(bus.published(), 2);
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());

        bus.publish(sync(0));
        assert_eq!(bus.subscriber_count(), 1);
        assert!(kept.try_recv().is_ok());
    }
}
