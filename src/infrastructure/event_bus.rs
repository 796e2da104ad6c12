//! Broadcast event bus
//!
//! Fans application events out to every subscriber. Slow subscribers lag and
//! lose the oldest events rather than holding up the publisher.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::application::dto::AppEvent;
use crate::application::ports::outbound::{EventBusError, EventBusPort};

const DEFAULT_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct BroadcastEventBus {
    sender: broadcast::Sender<AppEvent>,
}

impl BroadcastEventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBusPort<AppEvent> for BroadcastEventBus {
    async fn publish(&self, event: AppEvent) -> Result<(), EventBusError> {
        self.sender
            .send(event)
            .map(|_| ())
            .map_err(|_| EventBusError::NoSubscribers)
    }
}
