use async_nats::jetstream::{self, AckKind, Message};
use chrono::{DateTime, Utc};
use footprint_domain::{decide, ActivityEvent, ActivityEventRepository, Disposition, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::traits::{JetStreamConsumer, JetStreamPublisher, PullConsumer};

/// Configuration for one event consumer loop.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Stream backing the durable queue (e.g. `user_activity_events`)
    pub stream: String,
    /// Durable consumer name; workers sharing it share the queue
    pub durable_name: String,
    /// Subject filter within the stream
    pub filter_subject: String,
    /// Max messages per fetch
    pub batch_size: usize,
    /// Max wait for a fetch to fill
    pub batch_wait: Duration,
    /// How long the broker waits for an ack before redelivering
    pub ack_wait: Duration,
    /// Subject permanently-failed events are published to
    pub dead_letter_subject: String,
    pub retry_policy: RetryPolicy,
    /// Reconnect backoff, exponential from `base` capped at `cap`
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

/// Envelope published to the dead-letter queue for manual inspection
/// and replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetteredEvent {
    pub event: ActivityEvent,
    pub reason: String,
    pub delivery_count: i64,
    pub failed_at: DateTime<Utc>,
}

/// Pull-consumer loop over the durable activity queue.
///
/// One message is finalized at a time: ack once persisted (or a known
/// duplicate), nak-with-delay on a retryable failure under the delivery
/// ceiling, dead-letter then ack otherwise. Undecodable or invalid
/// payloads are terminated without redelivery; requeueing a message that
/// can never validate loops forever.
///
/// On any fetch or consumer-creation error the loop re-declares the
/// durable consumer after an exponential backoff with jitter. In-flight
/// unacked deliveries are owned by the broker and redelivered.
pub struct EventConsumer {
    consumer_client: Arc<dyn JetStreamConsumer>,
    dead_letters: Arc<dyn JetStreamPublisher>,
    repository: Arc<dyn ActivityEventRepository>,
    readiness: Arc<AtomicBool>,
    config: ConsumerConfig,
}

impl EventConsumer {
    pub fn new(
        consumer_client: Arc<dyn JetStreamConsumer>,
        dead_letters: Arc<dyn JetStreamPublisher>,
        repository: Arc<dyn ActivityEventRepository>,
        readiness: Arc<AtomicBool>,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            consumer_client,
            dead_letters,
            repository,
            readiness,
            config,
        }
    }

    pub async fn run(&self, ctx: CancellationToken) -> anyhow::Result<()> {
        info!(
            stream = %self.config.stream,
            durable = %self.config.durable_name,
            "Starting event consumer loop"
        );

        let mut puller: Option<Box<dyn PullConsumer>> = None;
        let mut failures: u32 = 0;

        loop {
            if ctx.is_cancelled() {
                break;
            }

            if puller.is_none() {
                match self.declare_consumer().await {
                    Ok(created) => {
                        info!(durable = %self.config.durable_name, "Consumer declared");
                        puller = Some(created);
                        failures = 0;
                        self.readiness.store(true, Ordering::SeqCst);
                    }
                    Err(e) => {
                        self.readiness.store(false, Ordering::SeqCst);
                        failures += 1;
                        warn!(error = %e, attempt = failures, "Failed to declare consumer");
                        if !self.backoff(&ctx, failures).await {
                            break;
                        }
                        continue;
                    }
                }
            }

            let Some(active) = puller.as_deref() else {
                continue;
            };

            tokio::select! {
                _ = ctx.cancelled() => {
                    break;
                }
                result = self.fetch_and_process(active) => {
                    match result {
                        Ok(()) => {
                            failures = 0;
                            self.readiness.store(true, Ordering::SeqCst);
                        }
                        Err(e) => {
                            error!(error = %e, "Error fetching from queue, re-declaring consumer");
                            self.readiness.store(false, Ordering::SeqCst);
                            puller = None;
                            failures += 1;
                            if !self.backoff(&ctx, failures).await {
                                break;
                            }
                        }
                    }
                }
            }
        }

        self.readiness.store(false, Ordering::SeqCst);
        info!("Event consumer stopped gracefully");
        Ok(())
    }

    async fn declare_consumer(&self) -> anyhow::Result<Box<dyn PullConsumer>> {
        self.consumer_client
            .create_consumer(
                jetstream::consumer::pull::Config {
                    name: Some(self.config.durable_name.clone()),
                    durable_name: Some(self.config.durable_name.clone()),
                    filter_subject: self.config.filter_subject.clone(),
                    ack_policy: jetstream::consumer::AckPolicy::Explicit,
                    ack_wait: self.config.ack_wait,
                    ..Default::default()
                },
                &self.config.stream,
            )
            .await
    }

    async fn fetch_and_process(&self, puller: &dyn PullConsumer) -> anyhow::Result<()> {
        let messages = puller
            .fetch_messages(self.config.batch_size, self.config.batch_wait)
            .await?;

        if messages.is_empty() {
            debug!("No messages in batch");
            return Ok(());
        }

        debug!(message_count = messages.len(), "Received message batch");

        for msg in &messages {
            self.process_message(msg).await;
        }

        Ok(())
    }

    /// Drive one delivery through its full state machine and finalize it.
    async fn process_message(&self, msg: &Message) {
        let delivery_count = msg.info().map(|info| info.delivered).unwrap_or(1);

        // Re-validate: the producer may have been bypassed or the payload
        // corrupted in transit. A payload that can never validate is
        // terminated, not requeued.
        let event: ActivityEvent = match serde_json::from_slice(&msg.payload) {
            Ok(event) => event,
            Err(e) => {
                error!(
                    error = %e,
                    payload = %String::from_utf8_lossy(&msg.payload),
                    "Dropping undecodable message"
                );
                self.finalize(msg, AckKind::Term).await;
                return;
            }
        };

        if let Err(violation) = event.check_invariants() {
            error!(
                field = %violation.field,
                detail = %violation.message,
                event = ?event,
                "Dropping event that fails re-validation"
            );
            self.finalize(msg, AckKind::Term).await;
            return;
        }

        let result = self.repository.persist(&event).await;

        match decide(result, delivery_count, self.config.retry_policy) {
            Disposition::Ack => {
                debug!(user_id = event.user_id, "Event persisted, acking");
                self.finalize(msg, AckKind::Ack).await;
            }
            Disposition::Retry { delay } => {
                warn!(
                    user_id = event.user_id,
                    delivery_count,
                    delay_ms = delay.as_millis() as u64,
                    "Transient persistence failure, requeueing"
                );
                self.finalize(msg, AckKind::Nak(Some(delay))).await;
            }
            Disposition::DeadLetter { reason } => {
                self.dead_letter(msg, event, reason, delivery_count).await;
            }
        }
    }

    /// Publish the event to the dead-letter queue, then ack it off the
    /// main queue. If the dead-letter publish itself fails the message is
    /// requeued so the event is not lost.
    async fn dead_letter(&self, msg: &Message, event: ActivityEvent, reason: String, delivery_count: i64) {
        error!(
            user_id = event.user_id,
            event_type = %event.event_type,
            reason = %reason,
            delivery_count,
            "Dead-lettering event"
        );

        let dead = DeadLetteredEvent {
            event,
            reason,
            delivery_count,
            failed_at: Utc::now(),
        };

        let payload = match serde_json::to_vec(&dead) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(error = %e, "Failed to serialize dead-letter envelope, requeueing");
                self.finalize(msg, AckKind::Nak(Some(self.config.retry_policy.retry_delay)))
                    .await;
                return;
            }
        };

        match self
            .dead_letters
            .publish(self.config.dead_letter_subject.clone(), payload.into())
            .await
        {
            Ok(()) => self.finalize(msg, AckKind::Ack).await,
            Err(e) => {
                error!(error = %e, "Dead-letter publish failed, requeueing");
                self.finalize(msg, AckKind::Nak(Some(self.config.retry_policy.retry_delay)))
                    .await;
            }
        }
    }

    async fn finalize(&self, msg: &Message, kind: AckKind) {
        if let Err(e) = msg.ack_with(kind).await {
            // The broker will redeliver after ack_wait; at-least-once
            // delivery makes that safe.
            error!(error = %e, "Failed to finalize delivery");
        }
    }

    /// Sleep out the backoff for the given attempt; false when cancelled.
    async fn backoff(&self, ctx: &CancellationToken, attempt: u32) -> bool {
        let delay = backoff_delay(attempt, self.config.backoff_base, self.config.backoff_cap);
        let delay = with_jitter(delay, self.config.backoff_cap);
        warn!(delay_ms = delay.as_millis() as u64, "Backing off before reconnect");

        tokio::select! {
            _ = ctx.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

/// Exponential backoff schedule: base * 2^(attempt-1), capped.
fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << exponent).min(cap)
}

/// Add up to 25% random jitter so reconnecting workers do not stampede.
/// The jittered delay never exceeds `cap`.
fn with_jitter(delay: Duration, cap: Duration) -> Duration {
    use rand::Rng;
    let max_jitter_ms = (delay.as_millis() as u64 / 4).max(1);
    let jitter = rand::thread_rng().gen_range(0..=max_jitter_ms);
    (delay + Duration::from_millis(jitter)).min(cap)
}

// Note: the full loop is not unit-tested here because jetstream::Message
// values cannot be constructed without a live NATS connection. The delivery
// decision logic lives in footprint_domain::processor where it is tested
// exhaustively; what remains here is exercised end to end against a real
// broker.
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_backoff_schedule_doubles_up_to_cap() {
        let base = Duration::from_secs(1);
        let cap = Duration::from_secs(30);

        assert_eq!(backoff_delay(1, base, cap), Duration::from_secs(1));
        assert_eq!(backoff_delay(2, base, cap), Duration::from_secs(2));
        assert_eq!(backoff_delay(3, base, cap), Duration::from_secs(4));
        assert_eq!(backoff_delay(6, base, cap), Duration::from_secs(30));
        assert_eq!(backoff_delay(60, base, cap), Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_stays_within_a_quarter() {
        let delay = Duration::from_secs(4);
        let cap = Duration::from_secs(30);
        for _ in 0..100 {
            let jittered = with_jitter(delay, cap);
            assert!(jittered >= delay);
            assert!(jittered <= delay + Duration::from_secs(1));
        }
    }

    #[test]
    fn test_jitter_never_pushes_delay_past_cap() {
        let cap = Duration::from_secs(30);
        // At the cap the jittered delay must stay exactly at the cap
        for _ in 0..100 {
            assert_eq!(with_jitter(cap, cap), cap);
        }
        // Just below the cap it may grow, but only up to the cap
        let near_cap = Duration::from_secs(29);
        for _ in 0..100 {
            assert!(with_jitter(near_cap, cap) <= cap);
        }
    }

    #[test]
    fn test_dead_letter_envelope_round_trips() {
        let dead = DeadLetteredEvent {
            event: ActivityEvent {
                user_id: 9,
                event_type: "purchase".to_string(),
                occurred_at: "2026-02-20T10:00:00Z".parse().unwrap(),
                metadata: json!({"sku": "A-1"}).as_object().cloned().unwrap(),
                dedup_key: None,
            },
            reason: "permanent failure: check constraint".to_string(),
            delivery_count: 1,
            failed_at: Utc::now(),
        };

        let bytes = serde_json::to_vec(&dead).unwrap();
        let decoded: DeadLetteredEvent = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(decoded.event, dead.event);
        assert_eq!(decoded.reason, dead.reason);
        assert_eq!(decoded.delivery_count, 1);
    }
}
