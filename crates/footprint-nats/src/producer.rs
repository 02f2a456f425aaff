use anyhow::{anyhow, Context};
use async_trait::async_trait;
use footprint_domain::{ActivityEvent, ActivityEventProducer, DomainError, DomainResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::traits::JetStreamPublisher;

/// NATS JetStream producer for activity events.
///
/// `publish` resolves only once the broker has acknowledged persistence of
/// the message, so a returned `Ok` is a durable-enqueue promise. Any
/// connection, persistence, or timeout failure maps to
/// `DomainError::BrokerUnavailable`, which the endpoint surfaces as a 500.
pub struct NatsEventProducer {
    jetstream: Arc<dyn JetStreamPublisher>,
    subject: String,
    publish_timeout: Duration,
}

impl NatsEventProducer {
    pub fn new(
        jetstream: Arc<dyn JetStreamPublisher>,
        subject: String,
        publish_timeout: Duration,
    ) -> Self {
        Self {
            jetstream,
            subject,
            publish_timeout,
        }
    }
}

#[async_trait]
impl ActivityEventProducer for NatsEventProducer {
    async fn publish(&self, event: &ActivityEvent) -> DomainResult<()> {
        let payload = serde_json::to_vec(event)
            .context("Failed to serialize event for the queue")
            .map_err(DomainError::Repository)?;

        debug!(
            subject = %self.subject,
            user_id = event.user_id,
            size_bytes = payload.len(),
            "Publishing activity event"
        );

        let publish = self
            .jetstream
            .publish(self.subject.clone(), payload.into());

        match tokio::time::timeout(self.publish_timeout, publish).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(DomainError::BrokerUnavailable(e)),
            Err(_) => Err(DomainError::BrokerUnavailable(anyhow!(
                "publish not acknowledged within {:?}",
                self.publish_timeout
            ))),
        }
    }
}
