//! Process-local delivery of stock notifications.
//!
//! Services publish here once a batch of stock movements has committed, so
//! anything a listener sees is already durable in the ledger. A listener
//! that falls behind or goes away loses nothing it cannot re-read.

use std::sync::mpsc::{self, Sender};
use std::sync::Mutex;

use crate::bus::{EventBus, Subscription};

/// The listener list could not be reached; the committed change stands.
#[derive(Debug)]
pub enum InMemoryBusError {
    Poisoned,
}

/// Fans each committed-stock notification out to every open subscription.
///
/// Delivery is synchronous on the publishing thread and never blocks: each
/// subscription owns an unbounded queue. Closed subscriptions are forgotten
/// the first time a notification cannot reach them.
#[derive(Debug)]
pub struct InMemoryEventBus<M> {
    listeners: Mutex<Vec<Sender<M>>>,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open subscriptions as of the most recent notification.
    pub fn subscriber_count(&self) -> usize {
        match self.listeners.lock() {
            Ok(listeners) => listeners.len(),
            Err(_) => 0,
        }
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
        }
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = InMemoryBusError;

    fn publish(&self, notification: M) -> Result<(), Self::Error> {
        let Ok(mut listeners) = self.listeners.lock() else {
            return Err(InMemoryBusError::Poisoned);
        };
        listeners.retain(|listener| listener.send(notification.clone()).is_ok());
        Ok(())
    }

    /// Listen for notifications committed from now on.
    fn subscribe(&self) -> Subscription<M> {
        let (listener, queue) = mpsc::channel();
        // Poisoned: the subscription stays silent.
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push(listener);
        }
        Subscription::new(queue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Restocked {
        material: &'static str,
        quantity: i64,
    }

    fn restocked(material: &'static str, quantity: i64) -> Restocked {
        Restocked { material, quantity }
    }

    #[test]
    fn each_subscription_sees_every_commit_in_order() {
        let bus = InMemoryEventBus::new();
        let stock_view = bus.subscribe();
        let audit = bus.subscribe();

        bus.publish(restocked("PP fabric", 100)).unwrap();
        bus.publish(restocked("ink", 3)).unwrap();

        let expected = vec![restocked("PP fabric", 100), restocked("ink", 3)];
        assert_eq!(stock_view.drain(), expected);
        assert_eq!(audit.drain(), expected);
    }

    #[test]
    fn late_subscription_misses_earlier_commits() {
        let bus = InMemoryEventBus::new();
        bus.publish(restocked("zip", 10)).unwrap();

        let late = bus.subscribe();
        assert!(late.drain().is_empty());
    }

    #[test]
    fn closed_subscriptions_are_forgotten() {
        let bus = InMemoryEventBus::new();
        let open = bus.subscribe();
        drop(bus.subscribe());
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(restocked("PP fabric", -12)).unwrap();

        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(open.drain(), vec![restocked("PP fabric", -12)]);
    }
}
