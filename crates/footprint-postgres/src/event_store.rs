use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use footprint_domain::{ActivityEvent, ActivityEventRepository, PersistError, PersistOutcome};
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::client::PostgresClient;

const INSERT_EVENT: &str = r#"
INSERT INTO user_activities (user_id, event_type, "timestamp", metadata, dedup_key)
VALUES ($1, $2, $3, $4, $5)
ON CONFLICT (dedup_key) WHERE dedup_key IS NOT NULL DO NOTHING
RETURNING id"#;

/// Activity event persistence against PostgreSQL.
///
/// Every failure is classified as transient or permanent so the consumer
/// can tell "retry later" from "this row will never insert". Duplicate
/// suppression rides on the insert itself: `DO NOTHING` against the
/// partial dedup index turns a replay into a no-row result rather than a
/// unique-violation error.
#[derive(Clone)]
pub struct EventStore {
    client: PostgresClient,
    statement_timeout: Duration,
}

impl EventStore {
    pub fn new(client: PostgresClient, statement_timeout: Duration) -> Self {
        Self {
            client,
            statement_timeout,
        }
    }

    async fn insert(&self, event: &ActivityEvent) -> Result<PersistOutcome, PersistError> {
        // Pool exhaustion and wait timeouts are load conditions, not data
        // problems: always worth retrying.
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(|e| PersistError::Transient(e.context("Failed to acquire connection")))?;

        let metadata = Value::Object(event.metadata.clone());

        let row = conn
            .query_opt(
                INSERT_EVENT,
                &[
                    &event.user_id,
                    &event.event_type,
                    &event.occurred_at,
                    &metadata,
                    &event.dedup_key,
                ],
            )
            .await
            .map_err(classify_db_error)?;

        match row {
            Some(row) => {
                let id: i64 = row.get(0);
                debug!(id, user_id = event.user_id, "Inserted activity event");
                Ok(PersistOutcome::Inserted(id))
            }
            None => {
                info!(
                    user_id = event.user_id,
                    dedup_key = event.dedup_key.as_deref().unwrap_or(""),
                    "Duplicate event ignored"
                );
                Ok(PersistOutcome::DuplicateIgnored)
            }
        }
    }
}

#[async_trait]
impl ActivityEventRepository for EventStore {
    #[instrument(skip(self, event), fields(user_id = event.user_id, event_type = %event.event_type))]
    async fn persist(&self, event: &ActivityEvent) -> Result<PersistOutcome, PersistError> {
        match tokio::time::timeout(self.statement_timeout, self.insert(event)).await {
            Ok(result) => result,
            Err(_) => Err(PersistError::Transient(anyhow!(
                "insert did not complete within {:?}",
                self.statement_timeout
            ))),
        }
    }
}

/// Sort a database error into the retryable or terminal bucket.
///
/// Errors with no SQLSTATE are connection-level (broken socket, protocol
/// error) and retryable. Anything else is judged by SQLSTATE class.
fn classify_db_error(err: tokio_postgres::Error) -> PersistError {
    match err.code() {
        Some(state) => {
            let code = state.code().to_string();
            let wrapped =
                anyhow::Error::new(err).context(format!("database error (SQLSTATE {})", code));
            if is_transient_sqlstate(&code) {
                PersistError::Transient(wrapped)
            } else {
                PersistError::Permanent(wrapped)
            }
        }
        None => {
            PersistError::Transient(anyhow::Error::new(err).context("database connection error"))
        }
    }
}

/// SQLSTATE classes that indicate a condition expected to clear on its
/// own. Constraint and data errors (classes 22, 23, 42, ...) will fail
/// identically on every redelivery, so they are permanent.
fn is_transient_sqlstate(code: &str) -> bool {
    code.starts_with("08")      // connection exception
        || code.starts_with("53") // insufficient resources
        || code.starts_with("57") // operator intervention, statement canceled
        || code.starts_with("40") // transaction rollback: deadlock, serialization
        || code == "55P03" // lock not available
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_class_errors_are_transient() {
        assert!(is_transient_sqlstate("08000"));
        assert!(is_transient_sqlstate("08006"));
    }

    #[test]
    fn test_resource_exhaustion_is_transient() {
        assert!(is_transient_sqlstate("53100")); // disk full
        assert!(is_transient_sqlstate("53300")); // too many connections
    }

    #[test]
    fn test_cancellation_and_shutdown_are_transient() {
        assert!(is_transient_sqlstate("57014")); // query canceled
        assert!(is_transient_sqlstate("57P01")); // admin shutdown
    }

    #[test]
    fn test_deadlock_and_serialization_are_transient() {
        assert!(is_transient_sqlstate("40001"));
        assert!(is_transient_sqlstate("40P01"));
        assert!(is_transient_sqlstate("55P03"));
    }

    #[test]
    fn test_constraint_violations_are_permanent() {
        assert!(!is_transient_sqlstate("23502")); // not-null violation
        assert!(!is_transient_sqlstate("23505")); // unique violation
        assert!(!is_transient_sqlstate("23514")); // check violation
    }

    #[test]
    fn test_data_and_syntax_errors_are_permanent() {
        assert!(!is_transient_sqlstate("22001")); // value too long
        assert!(!is_transient_sqlstate("22P02")); // invalid text representation
        assert!(!is_transient_sqlstate("42703")); // undefined column
        assert!(!is_transient_sqlstate("42P01")); // undefined table
    }
}
