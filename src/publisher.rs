//! Order event fan-out: NATS when configured, plus an in-process broadcast.

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::events::OrderEvent;

const LOCAL_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct EventPublisher {
    nats: Option<async_nats::Client>,
    local: broadcast::Sender<OrderEvent>,
}

impl EventPublisher {
    pub fn new(nats: Option<async_nats::Client>) -> Self {
        let (local, _) = broadcast::channel(LOCAL_CAPACITY);
        Self { nats, local }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrderEvent> { self.local.subscribe() }

    /// Best effort. A broker outage never fails the request that raised the event.
    pub async fn publish(&self, event: OrderEvent) {
        debug!(subject = event.subject(), order_id = %event.order_id(), "Publishing order event");
        if let Some(client) = &self.nats {
            match serde_json::to_vec(&event) {
                Ok(payload) => {
                    if let Err(e) = client.publish(event.subject().to_string(), payload.into()).await {
                        warn!(error = %e, subject = event.subject(), "NATS publish failed");
                    }
                }
                Err(e) => warn!(error = %e, "Order event not serializable"),
            }
        }
        // No receivers is fine.
        let _ = self.local.send(event);
    }
}

impl Default for EventPublisher {
    fn default() -> Self { Self::new(None) }
}
