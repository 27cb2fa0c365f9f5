//! Order status observation: realtime feed with periodic reconciliation.
//!
//! The broadcast feed delivers status changes published by the write path,
//! but subscribers can lag and processes can miss writes made by other
//! replicas. The observer therefore re-reads the stored status on a timer
//! and emits any difference, so a watcher converges on the truth even if
//! every push is lost. Duplicate statuses are suppressed; the stream ends
//! once the order reaches a terminal status or is deleted.

use std::sync::Arc;
use std::time::Duration;

use quiosque_core::{OrderId, OrderStatus};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::instrument;

use crate::db::RepositoryError;
use crate::realtime::{OrderStatusEvent, Realtime};

const WATCH_BUFFER: usize = 16;

/// Where the authoritative order status is read from.
pub trait StatusSource: Send + Sync + Clone + 'static {
    /// The stored status, or `None` if the order does not exist.
    fn current_status(
        &self,
        order_id: OrderId,
    ) -> impl Future<Output = Result<Option<OrderStatus>, RepositoryError>> + Send;
}

/// Produces per-order status streams.
#[derive(Clone)]
pub struct OrderStatusObserver<S> {
    source: S,
    realtime: Arc<Realtime>,
    reconcile_interval: Duration,
}

impl<S: StatusSource> OrderStatusObserver<S> {
    #[must_use]
    pub const fn new(source: S, realtime: Arc<Realtime>, reconcile_interval: Duration) -> Self {
        Self {
            source,
            realtime,
            reconcile_interval,
        }
    }

    /// Start watching an order. The stream opens with the current status,
    /// then yields each change exactly once, and closes after a terminal
    /// status. Returns `None` if the order does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Database`] if the initial status read fails.
    #[instrument(skip_all, fields(order_id = %order_id))]
    pub async fn watch(
        &self,
        order_id: OrderId,
    ) -> Result<Option<ReceiverStream<OrderStatusEvent>>, RepositoryError> {
        // Subscribe before the initial read so a write landing in between
        // is still delivered.
        let mut feed = self.realtime.subscribe_order(order_id);
        let Some(initial) = self.source.current_status(order_id).await? else {
            return Ok(None);
        };

        let (tx, rx) = mpsc::channel(WATCH_BUFFER);
        let source = self.source.clone();
        let reconcile_interval = self.reconcile_interval;

        tokio::spawn(async move {
            let mut last = initial;
            if tx
                .send(OrderStatusEvent {
                    order_id,
                    status: initial,
                })
                .await
                .is_err()
                || initial.is_terminal()
            {
                return;
            }

            let mut reconcile = tokio::time::interval(reconcile_interval);
            reconcile.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            reconcile.tick().await; // first tick completes immediately

            loop {
                let next = tokio::select! {
                    event = feed.recv() => match event {
                        Ok(event) => Some(event.status),
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                            tracing::warn!(order_id = %order_id, missed, "status watcher lagged");
                            continue;
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    },
                    _ = reconcile.tick() => match source.current_status(order_id).await {
                        Ok(Some(status)) => Some(status),
                        Ok(None) => break,
                        Err(e) => {
                            tracing::warn!(order_id = %order_id, error = %e, "status reconciliation failed");
                            None
                        }
                    },
                };

                let Some(status) = next else { continue };
                if status == last {
                    continue;
                }
                last = status;
                if tx.send(OrderStatusEvent { order_id, status }).await.is_err() {
                    break;
                }
                if status.is_terminal() {
                    break;
                }
            }
        });

        Ok(Some(ReceiverStream::new(rx)))
    }
}
