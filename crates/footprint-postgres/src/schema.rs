use anyhow::{Context, Result};
use tracing::info;

use crate::client::PostgresClient;

/// Idempotent DDL for the activity event store, applied at startup.
///
/// The partial unique index on `dedup_key` backs duplicate suppression:
/// events without a key are never compared against each other.
const SCHEMA_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS user_activities (
    id          BIGSERIAL PRIMARY KEY,
    user_id     BIGINT NOT NULL,
    event_type  VARCHAR(50) NOT NULL,
    "timestamp" TIMESTAMPTZ NOT NULL,
    metadata    JSONB NOT NULL DEFAULT '{}'::jsonb,
    dedup_key   TEXT,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_user_activities_user_id
    ON user_activities (user_id, "timestamp" DESC);

CREATE UNIQUE INDEX IF NOT EXISTS uq_user_activities_dedup_key
    ON user_activities (dedup_key)
    WHERE dedup_key IS NOT NULL;
"#;

pub async fn ensure_schema(client: &PostgresClient) -> Result<()> {
    let conn = client.get_connection().await?;

    conn.batch_execute(SCHEMA_DDL)
        .await
        .context("Failed to apply activity event schema")?;

    info!("Activity event schema is up to date");
    Ok(())
}
