//! Order status push hub.
//!
//! Status changes are published once and fanned out to every subscriber
//! (admin dashboards via server-sent events). The buffer is bounded: a
//! subscriber that falls behind skips the events it missed and keeps going.
//! Consumers re-fetch the order table when they reconnect.

use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use shopkeep_core::{OrderId, OrderStatus};

/// Events buffered per subscriber before the oldest are dropped.
const CHANNEL_CAPACITY: usize = 256;

/// A pushed order status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusChanged {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub updated_at: DateTime<Utc>,
}

/// Broadcast hub for order status changes.
#[derive(Debug, Clone)]
pub struct OrderEvents {
    sender: broadcast::Sender<OrderStatusChanged>,
}

impl Default for OrderEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderEvents {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publish an event. Returns the number of subscribers that will see it.
    pub fn publish(&self, event: OrderStatusChanged) -> usize {
        // No subscribers is not an error.
        self.sender.send(event).unwrap_or(0)
    }

    /// Open a subscription. Only events published after this call are seen.
    #[must_use]
    pub fn subscribe(&self) -> OrderStatusSubscription {
        OrderStatusSubscription {
            receiver: self.sender.subscribe(),
        }
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// A live subscription to order status changes.
///
/// Dropping the handle unsubscribes; [`unsubscribe`](Self::unsubscribe) does
/// the same explicitly.
#[derive(Debug)]
pub struct OrderStatusSubscription {
    receiver: broadcast::Receiver<OrderStatusChanged>,
}

impl OrderStatusSubscription {
    /// Wait for the next event.
    ///
    /// Returns `None` once the hub is gone. Events lost to lag are skipped.
    pub async fn recv(&mut self) -> Option<OrderStatusChanged> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Order status subscriber lagged, events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// End the subscription.
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Adapt the subscription into a stream that ends when the hub closes.
    pub fn into_stream(self) -> impl Stream<Item = OrderStatusChanged> + Send + 'static {
        let mut subscription = self;
        async_stream::stream! {
            while let Some(event) = subscription.recv().await {
                yield event;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use futures::StreamExt;

    use super::*;

    fn event(status: OrderStatus) -> OrderStatusChanged {
        OrderStatusChanged {
            order_id: OrderId::new_v4(),
            status,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_subscribers_receive_published_events() {
        let hub = OrderEvents::new();
        let mut first = hub.subscribe();
        let mut second = hub.subscribe();

        let sent = event(OrderStatus::Processing);
        assert_eq!(hub.publish(sent.clone()), 2);

        assert_eq!(first.recv().await.unwrap(), sent);
        assert_eq!(second.recv().await.unwrap(), sent);
    }

    #[tokio::test]
    async fn test_unsubscribe_releases_receiver() {
        let hub = OrderEvents::new();
        let subscription = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 1);

        subscription.unsubscribe();
        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(hub.publish(event(OrderStatus::Completed)), 0);
    }

    #[tokio::test]
    async fn test_lagged_subscriber_skips_to_newest() {
        let hub = OrderEvents::new();
        let mut subscription = hub.subscribe();

        for _ in 0..CHANNEL_CAPACITY + 10 {
            hub.publish(event(OrderStatus::Pending));
        }
        let last = event(OrderStatus::Cancelled);
        hub.publish(last.clone());

        let mut seen = 0;
        let mut latest = None;
        while let Ok(Some(event)) =
            tokio::time::timeout(std::time::Duration::from_millis(50), subscription.recv()).await
        {
            seen += 1;
            latest = Some(event);
        }
        assert!(seen <= CHANNEL_CAPACITY);
        assert_eq!(latest.unwrap(), last);
    }

    #[tokio::test]
    async fn test_stream_ends_when_hub_dropped() {
        let hub = OrderEvents::new();
        let stream = hub.subscribe().into_stream();
        let sent = event(OrderStatus::Processing);
        hub.publish(sent.clone());
        drop(hub);

        let events: Vec<_> = stream.collect().await;
        assert_eq!(events, vec![sent]);
    }
}
