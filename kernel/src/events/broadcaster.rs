//! Broadcaster service for event distribution.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use crate::events::types::{EventError, RedlineEvent};

const BROADCAST_CAPACITY: usize = 256;

/// Broadcasts events to every subscriber.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<RedlineEvent>,
    subscriber_count: Arc<AtomicUsize>,
}

impl EventBroadcaster {
    /// Creates a new broadcaster with an empty channel.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            sender,
            subscriber_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Subscribes to events published from now on.
    pub fn subscribe(&self) -> EventReceiver {
        self.subscriber_count.fetch_add(1, Ordering::SeqCst);
        debug!(subscriber_count = self.subscriber_count(), "Subscriber added");
        EventReceiver {
            inner: self.sender.subscribe(),
            subscriber_count: Arc::clone(&self.subscriber_count),
        }
    }

    /// Publishes an event. Having no subscribers is not an error.
    pub fn publish(&self, event: RedlineEvent) {
        match self.sender.send(event) {
            Ok(receiver_count) => trace!(receiver_count, "Event sent"),
            Err(_) => trace!("Event dropped, no subscribers"),
        }
    }

    /// Returns the number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscriber_count.load(Ordering::SeqCst)
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver for events from an [`EventBroadcaster`].
#[derive(Debug)]
pub struct EventReceiver {
    inner: broadcast::Receiver<RedlineEvent>,
    subscriber_count: Arc<AtomicUsize>,
}

impl EventReceiver {
    /// Waits for the next event.
    ///
    /// # Errors
    /// Returns `EventError::ChannelClosed` if the channel is closed, or
    /// `EventError::Lagged` if events were skipped.
    pub async fn recv(&mut self) -> Result<RedlineEvent, EventError> {
        self.inner.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => EventError::ChannelClosed,
            broadcast::error::RecvError::Lagged(count) => {
                warn!(skipped = count, "Receiver lagged");
                EventError::Lagged(count)
            }
        })
    }

    /// Returns the next queued event without waiting.
    pub fn try_recv(&mut self) -> Option<RedlineEvent> {
        loop {
            match self.inner.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(count)) => {
                    warn!(skipped = count, "Receiver lagged");
                }
                Err(_) => return None,
            }
        }
    }

    /// Drains every queued event.
    pub fn drain(&mut self) -> Vec<RedlineEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

impl Drop for EventReceiver {
    fn drop(&mut self) {
        self.subscriber_count.fetch_sub(1, Ordering::SeqCst);
        debug!(
            subscriber_count = self.subscriber_count.load(Ordering::SeqCst),
            "Subscriber removed"
        );
    }
}
