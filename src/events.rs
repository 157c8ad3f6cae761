//! Event publishing
//!
//! Services drain aggregate events after a commit and hand them to an
//! [`EventSink`]. Publishing is best effort: a committed order stays
//! committed even if the bus is down.

use async_trait::async_trait;

use crate::domain::events::DomainEvent;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, events: Vec<DomainEvent>);
}

/// Writes events to the log only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl EventSink for LogSink {
    async fn publish(&self, events: Vec<DomainEvent>) {
        for event in events {
            tracing::info!(subject = event.subject(), ?event, "domain event");
        }
    }
}

/// Publishes events as JSON on `<prefix>.<subject>`.
#[derive(Debug, Clone)]
pub struct NatsSink {
    client: async_nats::Client,
    prefix: String,
}

impl NatsSink {
    pub fn new(client: async_nats::Client, prefix: impl Into<String>) -> Self {
        Self { client, prefix: prefix.into() }
    }
}

#[async_trait]
impl EventSink for NatsSink {
    async fn publish(&self, events: Vec<DomainEvent>) {
        for event in events {
            let subject = format!("{}.{}", self.prefix, event.subject());
            let payload = match serde_json::to_vec(&event) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(%subject, error = %e, "could not encode event");
                    continue;
                }
            };
            if let Err(e) = self.client.publish(subject.clone(), payload.into()).await {
                tracing::warn!(%subject, error = %e, "event publish failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::FlashSaleEvent;
    use crate::ids::FlashSaleId;

    #[test]
    fn events_serialize_with_aggregate_tag() {
        let event = DomainEvent::FlashSale(FlashSaleEvent::Activated { flash_sale_id: FlashSaleId::generate() });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["aggregate"], "flash_sale");
        assert!(json["event"]["activated"]["flash_sale_id"].is_string());
        assert_eq!(event.subject(), "flash_sale.activated");
    }
}
