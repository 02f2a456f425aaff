//! Delivery decision logic for the event processor.
//!
//! Each delivered message ends in exactly one disposition. Keeping the
//! decision a pure function of the persist result and the broker's
//! delivery count makes the retry/dead-letter policy testable without a
//! broker or a database.

use std::time::Duration;

use crate::repository::{PersistError, PersistOutcome};

/// Retry/dead-letter policy for a consumer.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Delivery-count ceiling, inclusive. A transient failure on the
    /// final permitted delivery is dead-lettered instead of requeued.
    pub max_deliveries: i64,
    /// Redelivery delay requested when a message is requeued.
    pub retry_delay: Duration,
}

/// Final disposition for one delivered message.
#[derive(Debug)]
pub enum Disposition {
    /// Acknowledge: the event is persisted (or a known duplicate).
    Ack,
    /// Requeue for redelivery after a delay.
    Retry { delay: Duration },
    /// Publish to the dead-letter queue, then acknowledge on the main queue.
    DeadLetter { reason: String },
}

/// Decide what to do with a delivery given its persist result and how many
/// times the broker has handed it out (1-based).
pub fn decide(
    result: Result<PersistOutcome, PersistError>,
    delivery_count: i64,
    policy: RetryPolicy,
) -> Disposition {
    match result {
        Ok(PersistOutcome::Inserted(_)) | Ok(PersistOutcome::DuplicateIgnored) => Disposition::Ack,
        Err(PersistError::Transient(err)) => {
            if delivery_count >= policy.max_deliveries {
                Disposition::DeadLetter {
                    reason: format!(
                        "transient failure persisted across {} deliveries: {}",
                        delivery_count, err
                    ),
                }
            } else {
                Disposition::Retry {
                    delay: policy.retry_delay,
                }
            }
        }
        Err(PersistError::Permanent(err)) => Disposition::DeadLetter {
            reason: format!("permanent failure: {}", err),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    const POLICY: RetryPolicy = RetryPolicy {
        max_deliveries: 5,
        retry_delay: Duration::from_secs(1),
    };

    #[test]
    fn test_inserted_is_acked() {
        let d = decide(Ok(PersistOutcome::Inserted(7)), 1, POLICY);
        assert!(matches!(d, Disposition::Ack));
    }

    #[test]
    fn test_duplicate_is_acked() {
        let d = decide(Ok(PersistOutcome::DuplicateIgnored), 3, POLICY);
        assert!(matches!(d, Disposition::Ack));
    }

    #[test]
    fn test_transient_below_ceiling_is_retried() {
        let d = decide(
            Err(PersistError::Transient(anyhow!("pool timeout"))),
            4,
            POLICY,
        );
        match d {
            Disposition::Retry { delay } => assert_eq!(delay, Duration::from_secs(1)),
            other => panic!("expected retry, got {:?}", other),
        }
    }

    #[test]
    fn test_transient_at_ceiling_is_dead_lettered() {
        let d = decide(
            Err(PersistError::Transient(anyhow!("pool timeout"))),
            5,
            POLICY,
        );
        assert!(matches!(d, Disposition::DeadLetter { .. }));
    }

    #[test]
    fn test_permanent_is_dead_lettered_with_zero_retries() {
        let d = decide(
            Err(PersistError::Permanent(anyhow!("check constraint"))),
            1,
            POLICY,
        );
        match d {
            Disposition::DeadLetter { reason } => assert!(reason.contains("permanent")),
            other => panic!("expected dead-letter, got {:?}", other),
        }
    }
}
