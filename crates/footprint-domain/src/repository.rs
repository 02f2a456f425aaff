use async_trait::async_trait;
use thiserror::Error;

use crate::error::DomainResult;
use crate::event::ActivityEvent;

/// Outcome of a successful persistence attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    /// A new row was written; carries the storage-assigned surrogate key.
    Inserted(i64),
    /// The event's dedup key already exists; nothing was written.
    DuplicateIgnored,
}

/// Persistence failure, classified so the processor can decide whether
/// redelivery has any chance of succeeding.
#[derive(Error, Debug)]
pub enum PersistError {
    /// Worth retrying: connection loss, timeout, pool exhaustion, deadlock.
    #[error("Transient persistence failure: {0}")]
    Transient(#[source] anyhow::Error),

    /// Retrying cannot help: constraint violation, malformed data.
    #[error("Permanent persistence failure: {0}")]
    Permanent(#[source] anyhow::Error),
}

/// Producer trait for the durable queue.
/// Infrastructure layer (footprint-nats) implements this trait.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ActivityEventProducer: Send + Sync {
    /// Publish one event, returning only after the broker has confirmed
    /// durable persistence. Failure maps to `DomainError::BrokerUnavailable`.
    async fn publish(&self, event: &ActivityEvent) -> DomainResult<()>;
}

/// Repository trait for event storage operations.
/// Infrastructure layer (footprint-postgres) implements this trait.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ActivityEventRepository: Send + Sync {
    /// Insert one event. Must be safe to call more than once for the same
    /// logical event; with a dedup key the second call reports
    /// `DuplicateIgnored`, without one it inserts another row.
    async fn persist(&self, event: &ActivityEvent) -> Result<PersistOutcome, PersistError>;
}
