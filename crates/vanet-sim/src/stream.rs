//! Broadcast stream of simulation events.

use tokio::sync::broadcast;
use tracing::trace;

use crate::events::SimEvent;

/// Fan-out of [`SimEvent`]s to any number of subscribers.
///
/// Publishing never blocks the tick pipeline: a slow subscriber lags and
/// skips events instead.
#[derive(Debug, Clone)]
pub struct EventStream {
    tx: broadcast::Sender<SimEvent>,
}

impl EventStream {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SimEvent> {
        self.tx.subscribe()
    }

    pub fn subscribers(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publish a batch in order. Returns the number of subscribers reached.
    pub fn publish(&self, events: &[SimEvent]) -> usize {
        let mut reached = 0;
        for event in events {
            // No subscribers is not an error
            reached = self.tx.send(event.clone()).unwrap_or(0);
        }
        trace!(events = events.len(), subscribers = reached, "events published");
        reached
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};
    use vanet_topology::NodeId;

    fn cleared(tick: u64) -> SimEvent {
        SimEvent::FlagCleared {
            node: NodeId(1),
            trust: 0.6,
            tick,
        }
    }

    #[tokio::test]
    async fn subscribers_receive_in_order() {
        let stream = EventStream::new(16);
        let mut a = stream.subscribe();
        let mut b = stream.subscribe();

        assert_eq!(stream.publish(&[cleared(1), cleared(2)]), 2);

        for rx in [&mut a, &mut b] {
            assert_eq!(rx.recv().await.unwrap().tick(), 1);
            assert_eq!(rx.recv().await.unwrap().tick(), 2);
        }
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let stream = EventStream::new(4);
        assert_eq!(stream.publish(&[cleared(1)]), 0);
        assert_eq!(stream.subscribers(), 0);
    }

    #[tokio::test]
    async fn slow_subscriber_lags() {
        let stream = EventStream::new(2);
        let mut rx = stream.subscribe();
        stream.publish(&[cleared(1), cleared(2), cleared(3)]);

        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(1))));
        assert_eq!(rx.recv().await.unwrap().tick(), 2);
    }

    #[test]
    fn dropping_the_stream_closes_receivers() {
        let stream = EventStream::new(4);
        let mut rx = stream.subscribe();
        stream.publish(&[cleared(1)]);
        drop(stream);
        assert_eq!(tokio_test::block_on(rx.recv()).unwrap().tick(), 1);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Closed)));
    }
}
