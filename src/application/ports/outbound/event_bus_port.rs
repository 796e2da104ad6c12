//! Event bus port - Fan-out of application events to subscribers

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    /// Nobody is listening; the event was dropped
    #[error("No subscribers for event")]
    NoSubscribers,
}

#[async_trait]
pub trait EventBusPort<E>: Send + Sync {
    /// Publish an event to every current subscriber
    async fn publish(&self, event: E) -> Result<(), EventBusError>;
}
