//! Chunk-change notifications.
//!
//! Every grid mutation that changes a chunk publishes a [`GridEvent`] to all
//! live subscribers. Renderers hold a [`GridSubscription`] and drain it once
//! per frame, so an edit can never be missed by forgetting to invalidate a
//! render cache by hand.

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use crate::chunk::ChunkCoord;

/// Emitted by a grid when chunk contents change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GridEvent {
    /// A cell inside this chunk was written.
    ChunkChanged(ChunkCoord),
    /// The chunk no longer exists in the grid.
    ChunkRemoved(ChunkCoord),
    /// Every chunk was dropped.
    Cleared,
}

impl GridEvent {
    /// The chunk the event refers to, if any.
    pub fn chunk(&self) -> Option<ChunkCoord> {
        match self {
            GridEvent::ChunkChanged(c) | GridEvent::ChunkRemoved(c) => Some(*c),
            GridEvent::Cleared => None,
        }
    }
}

/// Fan-out publisher owned by a grid.
#[derive(Debug, Default)]
pub struct GridEventBus {
    subscribers: Vec<Sender<GridEvent>>,
}

impl GridEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber. It only receives events published after
    /// this call.
    pub fn subscribe(&mut self) -> GridSubscription {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.push(tx);
        GridSubscription { receiver: rx }
    }

    /// Send an event to every subscriber, dropping those that went away.
    pub fn publish(&mut self, event: GridEvent) {
        self.subscribers.retain(|tx| tx.send(event).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

/// Receiving end of a grid's event channel.
#[derive(Debug)]
pub struct GridSubscription {
    receiver: Receiver<GridEvent>,
}

impl GridSubscription {
    /// Take every pending event without blocking.
    pub fn drain(&self) -> Vec<GridEvent> {
        let mut events = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        events
    }

    /// Number of events waiting to be drained.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// True once the publishing grid has been dropped and the queue is empty.
    pub fn is_disconnected(&self) -> bool {
        self.receiver.is_empty() && matches!(self.receiver.try_recv(), Err(TryRecvError::Disconnected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_reaches_every_subscriber() {
        let mut bus = GridEventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();
        bus.publish(GridEvent::ChunkChanged(ChunkCoord::new(1, 0, 0)));
        bus.publish(GridEvent::Cleared);

        assert_eq!(a.pending(), 2);
        assert_eq!(
            a.drain(),
            vec![GridEvent::ChunkChanged(ChunkCoord::new(1, 0, 0)), GridEvent::Cleared]
        );
        assert_eq!(b.drain().len(), 2);
        assert!(a.drain().is_empty());
    }

    #[test]
    fn test_late_subscriber_misses_earlier_events() {
        let mut bus = GridEventBus::new();
        bus.publish(GridEvent::Cleared);
        let late = bus.subscribe();
        assert!(late.drain().is_empty());
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let mut bus = GridEventBus::new();
        let keep = bus.subscribe();
        drop(bus.subscribe());
        bus.publish(GridEvent::ChunkRemoved(ChunkCoord::ORIGIN));
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(keep.drain()[0].chunk(), Some(ChunkCoord::ORIGIN));
    }

    #[test]
    fn test_subscription_sees_disconnect() {
        let mut bus = GridEventBus::new();
        let sub = bus.subscribe();
        assert!(!sub.is_disconnected());
        drop(bus);
        assert!(sub.is_disconnected());
    }
}
