use config::{Config, ConfigError, Environment};
use serde::Deserialize;

/// Service configuration, loaded from `FOOTPRINT_`-prefixed environment
/// variables with defaults suitable for local development.
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // NATS configuration
    /// NATS server URL
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// Connection timeout for the initial NATS connect in seconds
    #[serde(default = "default_nats_connect_timeout_secs")]
    pub nats_connect_timeout_secs: u64,

    /// Durable stream backing the event queue
    #[serde(default = "default_events_stream")]
    pub events_stream: String,

    /// Subject events are published to (must fall under the stream)
    #[serde(default = "default_events_subject")]
    pub events_subject: String,

    /// Durable stream backing the dead-letter queue
    #[serde(default = "default_dead_letter_stream")]
    pub dead_letter_stream: String,

    /// Subject dead-lettered events are published to
    #[serde(default = "default_dead_letter_subject")]
    pub dead_letter_subject: String,

    /// Durable consumer name shared by all worker loops
    #[serde(default = "default_consumer_durable_name")]
    pub consumer_durable_name: String,

    /// Max messages per consumer fetch
    #[serde(default = "default_nats_batch_size")]
    pub nats_batch_size: usize,

    /// Max wait time for a fetch to fill in seconds
    #[serde(default = "default_nats_batch_wait_secs")]
    pub nats_batch_wait_secs: u64,

    /// Broker redelivery window for unacked messages in seconds
    #[serde(default = "default_ack_wait_secs")]
    pub ack_wait_secs: u64,

    /// Timeout waiting for the broker's durable-enqueue ack in seconds
    #[serde(default = "default_publish_timeout_secs")]
    pub publish_timeout_secs: u64,

    // Worker configuration
    /// Parallel consumer loops over the shared durable queue
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,

    /// Inclusive delivery-count ceiling before dead-lettering
    #[serde(default = "default_max_deliveries")]
    pub max_deliveries: i64,

    /// Redelivery delay requested on a transient failure in seconds
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Initial reconnect backoff for the consumer loops in seconds
    #[serde(default = "default_consumer_backoff_base_secs")]
    pub consumer_backoff_base_secs: u64,

    /// Reconnect backoff ceiling in seconds
    #[serde(default = "default_consumer_backoff_cap_secs")]
    pub consumer_backoff_cap_secs: u64,

    // PostgreSQL configuration
    #[serde(default = "default_postgres_host")]
    pub postgres_host: String,

    #[serde(default = "default_postgres_port")]
    pub postgres_port: u16,

    #[serde(default = "default_postgres_database")]
    pub postgres_database: String,

    #[serde(default = "default_postgres_username")]
    pub postgres_username: String,

    #[serde(default = "default_postgres_password")]
    pub postgres_password: String,

    /// Connection pool ceiling; with the wait timeout below this is the
    /// persistence backpressure bound
    #[serde(default = "default_postgres_pool_size")]
    pub postgres_pool_size: usize,

    /// Max wait for a pooled connection in seconds
    #[serde(default = "default_postgres_wait_timeout_secs")]
    pub postgres_wait_timeout_secs: u64,

    /// Per-insert timeout in seconds; expiry counts as transient
    #[serde(default = "default_persist_timeout_secs")]
    pub persist_timeout_secs: u64,

    // HTTP configuration
    #[serde(default = "default_http_host")]
    pub http_host: String,

    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Worker health listener, separate port from the ingestion API
    #[serde(default = "default_worker_health_host")]
    pub worker_health_host: String,

    #[serde(default = "default_worker_health_port")]
    pub worker_health_port: u16,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_nats_connect_timeout_secs() -> u64 {
    5
}

fn default_events_stream() -> String {
    "user_activity_events".to_string()
}

fn default_events_subject() -> String {
    "user_activity_events.track".to_string()
}

fn default_dead_letter_stream() -> String {
    "user_activity_events_dlq".to_string()
}

fn default_dead_letter_subject() -> String {
    "user_activity_events_dlq.failed".to_string()
}

fn default_consumer_durable_name() -> String {
    "footprint-worker".to_string()
}

fn default_nats_batch_size() -> usize {
    16
}

fn default_nats_batch_wait_secs() -> u64 {
    5
}

fn default_ack_wait_secs() -> u64 {
    30
}

fn default_publish_timeout_secs() -> u64 {
    5
}

fn default_num_workers() -> usize {
    2
}

fn default_max_deliveries() -> i64 {
    5
}

fn default_retry_delay_secs() -> u64 {
    1
}

fn default_consumer_backoff_base_secs() -> u64 {
    1
}

fn default_consumer_backoff_cap_secs() -> u64 {
    30
}

fn default_postgres_host() -> String {
    "localhost".to_string()
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_postgres_database() -> String {
    "footprint".to_string()
}

fn default_postgres_username() -> String {
    "postgres".to_string()
}

fn default_postgres_password() -> String {
    "postgres".to_string()
}

fn default_postgres_pool_size() -> usize {
    16
}

fn default_postgres_wait_timeout_secs() -> u64 {
    5
}

fn default_persist_timeout_secs() -> u64 {
    5
}

fn default_http_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8000
}

fn default_worker_health_host() -> String {
    "0.0.0.0".to_string()
}

fn default_worker_health_port() -> u16 {
    8001
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("FOOTPRINT"))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Mutex to ensure tests run serially and don't interfere with each other
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_default_config() {
        let _lock = TEST_LOCK.lock().unwrap();
        std::env::remove_var("FOOTPRINT_LOG_LEVEL");

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.events_stream, "user_activity_events");
        assert_eq!(config.events_subject, "user_activity_events.track");
        assert_eq!(config.max_deliveries, 5);
        assert_eq!(config.http_port, 8000);
        assert_eq!(config.worker_health_port, 8001);
    }

    #[test]
    fn test_env_overrides() {
        let _lock = TEST_LOCK.lock().unwrap();
        std::env::set_var("FOOTPRINT_LOG_LEVEL", "debug");
        std::env::set_var("FOOTPRINT_NUM_WORKERS", "4");

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.num_workers, 4);

        std::env::remove_var("FOOTPRINT_LOG_LEVEL");
        std::env::remove_var("FOOTPRINT_NUM_WORKERS");
    }
}
