use std::sync::Arc;
use tracing::{debug, instrument};

use crate::error::DomainResult;
use crate::event::{ActivityEvent, TrackEventRequest};
use crate::repository::ActivityEventProducer;
use crate::validate::validate_struct;

/// Domain service behind the ingestion endpoint.
///
/// Flow:
/// 1. Validate the untrusted request, first failing field wins
/// 2. Build the canonical event
/// 3. Publish via the producer and wait for the durable-enqueue ack
///
/// Exactly one publish attempt is made per accepted request; retrying on
/// broker failure is the caller's concern, never this service's.
pub struct IngestionService {
    producer: Arc<dyn ActivityEventProducer>,
}

impl IngestionService {
    pub fn new(producer: Arc<dyn ActivityEventProducer>) -> Self {
        Self { producer }
    }

    /// Accept a raw tracking request, returning the canonical event that
    /// was durably enqueued.
    #[instrument(skip(self, request), fields(event_type = %request.event_type))]
    pub async fn ingest(&self, request: TrackEventRequest) -> DomainResult<ActivityEvent> {
        validate_struct(&request)?;

        let event = ActivityEvent::try_from(request)?;

        debug!(
            user_id = event.user_id,
            event_type = %event.event_type,
            "publishing validated event"
        );

        self.producer.publish(&event).await?;

        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DomainError;
    use crate::repository::MockActivityEventProducer;
    use serde_json::json;

    fn request() -> TrackEventRequest {
        TrackEventRequest {
            user_id: 123,
            event_type: "page_view".to_string(),
            timestamp: "2026-02-20T10:00:00Z".to_string(),
            metadata: Some(json!({"device": "mobile"})),
            dedup_key: None,
        }
    }

    #[tokio::test]
    async fn test_ingest_publishes_exactly_once() {
        let mut producer = MockActivityEventProducer::new();
        producer
            .expect_publish()
            .withf(|event: &ActivityEvent| {
                event.user_id == 123
                    && event.event_type == "page_view"
                    && event.metadata.get("device") == Some(&json!("mobile"))
            })
            .times(1)
            .return_once(|_| Ok(()));

        let service = IngestionService::new(Arc::new(producer));
        let event = service.ingest(request()).await.unwrap();
        assert_eq!(event.user_id, 123);
    }

    #[tokio::test]
    async fn test_ingest_rejects_invalid_without_publishing() {
        // Mock with no expectations: any publish call fails the test.
        let producer = MockActivityEventProducer::new();
        let service = IngestionService::new(Arc::new(producer));

        let mut req = request();
        req.user_id = -1;

        let result = service.ingest(req).await;
        match result {
            Err(DomainError::Validation(err)) => assert_eq!(err.field, "user_id"),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ingest_surfaces_broker_unavailable() {
        let mut producer = MockActivityEventProducer::new();
        producer.expect_publish().times(1).return_once(|_| {
            Err(DomainError::BrokerUnavailable(anyhow::anyhow!(
                "connection refused"
            )))
        });

        let service = IngestionService::new(Arc::new(producer));
        let result = service.ingest(request()).await;
        assert!(matches!(result, Err(DomainError::BrokerUnavailable(_))));
    }
}
