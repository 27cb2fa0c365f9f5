//! In-process realtime change feed.
//!
//! One broadcast channel per shared cart and per order, created lazily on
//! first subscription. Events are published by the write path after the row
//! is persisted, so subscribers only ever observe server-confirmed state.
//! Dropping a receiver is the unsubscribe; senders for channels with no
//! remaining receivers are pruned lazily on the next publish.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, PoisonError};

use quiosque_core::{CartId, OrderId, OrderStatus};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::cart::{CartLine, LineKey};

/// Per-channel buffer; a subscriber that lags beyond this many undelivered
/// events observes a `Lagged` error and continues from the newest event.
const CHANNEL_CAPACITY: usize = 64;

/// Row-level change to a shared cart's line set.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CartEvent {
    /// A line was inserted or its quantity changed.
    LineUpserted { line: CartLine },
    /// A line was deleted.
    LineRemoved { key: LineKey },
}

/// Status change on one order.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct OrderStatusEvent {
    pub order_id: OrderId,
    pub status: OrderStatus,
}

/// Lazily-created broadcast channels keyed by entity id.
struct Channels<K, E> {
    inner: Mutex<HashMap<K, broadcast::Sender<E>>>,
}

impl<K: Eq + Hash + Clone, E: Clone> Channels<K, E> {
    fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    fn subscribe(&self, key: K) -> broadcast::Receiver<E> {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.entry(key)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    fn publish(&self, key: &K, event: E) {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = map.get(key)
            && tx.send(event).is_err()
        {
            // All receivers are gone; prune the channel.
            map.remove(key);
        }
    }

    #[cfg(test)]
    fn channel_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// The hub holding all realtime channels for the process.
pub struct Realtime {
    carts: Channels<CartId, CartEvent>,
    orders: Channels<OrderId, OrderStatusEvent>,
}

impl Realtime {
    #[must_use]
    pub fn new() -> Self {
        Self {
            carts: Channels::new(),
            orders: Channels::new(),
        }
    }

    /// Subscribe to row-level events for one shared cart.
    pub fn subscribe_cart(&self, cart_id: CartId) -> broadcast::Receiver<CartEvent> {
        self.carts.subscribe(cart_id)
    }

    /// Publish a shared-cart row event. No-op when nobody is subscribed.
    pub fn publish_cart(&self, cart_id: CartId, event: CartEvent) {
        self.carts.publish(&cart_id, event);
    }

    /// Subscribe to status changes for one order.
    pub fn subscribe_order(&self, order_id: OrderId) -> broadcast::Receiver<OrderStatusEvent> {
        self.orders.subscribe(order_id)
    }

    /// Publish an order status change. No-op when nobody is subscribed.
    pub fn publish_order_status(&self, order_id: OrderId, status: OrderStatus) {
        self.orders
            .publish(&order_id, OrderStatusEvent { order_id, status });
    }
}

impl Default for Realtime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiosque_core::{Price, ProductId};

    use crate::models::cart::ProductSnapshot;

    fn line() -> CartLine {
        CartLine::new(
            ProductSnapshot {
                product_id: ProductId::generate(),
                name: "Dogão Clássico".to_owned(),
                unit_price: Price::from_minor_units(1500),
            },
            1,
            "",
        )
    }

    #[tokio::test]
    async fn test_subscribers_on_same_cart_both_receive() {
        let hub = Realtime::new();
        let cart_id = CartId::generate();
        let mut a = hub.subscribe_cart(cart_id);
        let mut b = hub.subscribe_cart(cart_id);

        hub.publish_cart(cart_id, CartEvent::LineUpserted { line: line() });

        assert!(matches!(a.try_recv(), Ok(CartEvent::LineUpserted { .. })));
        assert!(matches!(b.try_recv(), Ok(CartEvent::LineUpserted { .. })));
    }

    #[tokio::test]
    async fn test_channels_are_independent() {
        let hub = Realtime::new();
        let cart_a = CartId::generate();
        let cart_b = CartId::generate();
        let mut a = hub.subscribe_cart(cart_a);
        let mut b = hub.subscribe_cart(cart_b);

        hub.publish_cart(cart_a, CartEvent::LineUpserted { line: line() });

        assert!(a.try_recv().is_ok());
        assert!(b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let hub = Realtime::new();
        // Must not panic or allocate a channel.
        hub.publish_order_status(OrderId::generate(), OrderStatus::Preparing);
        assert_eq!(hub.orders.channel_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_receivers_prune_channel() {
        let hub = Realtime::new();
        let order_id = OrderId::generate();
        let rx = hub.subscribe_order(order_id);
        assert_eq!(hub.orders.channel_count(), 1);

        drop(rx);
        hub.publish_order_status(order_id, OrderStatus::Ready);
        assert_eq!(hub.orders.channel_count(), 0);
    }
}
