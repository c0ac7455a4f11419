//! Event publishing. Events are published after the store has committed, so
//! a failed publish never rolls anything back; callers only log it.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::domain::events::StorefrontEvent;

const SUBJECT_PREFIX: &str = "storefront";

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &StorefrontEvent) -> Result<(), PublishError>;
}

/// Publishes each event as JSON on `storefront.<event name>`.
#[derive(Debug, Clone)]
pub struct NatsPublisher {
    client: async_nats::Client,
}

impl NatsPublisher {
    pub fn new(client: async_nats::Client) -> Self { Self { client } }

    pub fn subject(event: &StorefrontEvent) -> String { format!("{SUBJECT_PREFIX}.{}", event.name()) }
}

#[async_trait]
impl EventPublisher for NatsPublisher {
    async fn publish(&self, event: &StorefrontEvent) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(event)?;
        self.client
            .publish(Self::subject(event), payload.into())
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))
    }
}

/// Drops every event. Used when no broker is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPublisher;

#[async_trait]
impl EventPublisher for NullPublisher {
    async fn publish(&self, _event: &StorefrontEvent) -> Result<(), PublishError> { Ok(()) }
}

/// Keeps published events in memory, in publish order.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<StorefrontEvent>>,
}

impl RecordingPublisher {
    pub fn new() -> Self { Self::default() }

    pub async fn events(&self) -> Vec<StorefrontEvent> { self.events.lock().await.clone() }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: &StorefrontEvent) -> Result<(), PublishError> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::ProductId;

    #[test]
    fn subject_uses_event_name() {
        let event = StorefrontEvent::StockAdjusted { product_id: ProductId::new(), previous: 3, stock: 7 };
        assert_eq!(NatsPublisher::subject(&event), "storefront.stock_adjusted");
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = StorefrontEvent::StockAdjusted { product_id: ProductId::new(), previous: 3, stock: 7 };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "stock_adjusted");
        assert_eq!(json["stock"], 7);
    }
}
