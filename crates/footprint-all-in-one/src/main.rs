mod config;
mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use crate::config::ServiceConfig;
use footprint_api::{AppState, HttpServerConfig, IngestionApi};
use footprint_domain::IngestionService;
use footprint_nats::{NatsClient, NatsEventProducer};
use footprint_postgres::{ensure_schema, EventStore, PostgresClient};
use footprint_runner::Runner;
use footprint_worker::{EventWorker, EventWorkerConfig};
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    telemetry::init_telemetry(&config.log_level);

    info!("Starting footprint-all-in-one service");
    debug!("Configuration: {:?}", config);

    if let Err(e) = run(config).await {
        error!(error = format!("{:#}", e), "Service exited with error");
        std::process::exit(1);
    }
}

async fn run(config: ServiceConfig) -> Result<()> {
    // Storage: connect, verify, and apply the schema before serving
    let postgres = PostgresClient::new(
        &config.postgres_host,
        config.postgres_port,
        &config.postgres_database,
        &config.postgres_username,
        &config.postgres_password,
        config.postgres_pool_size,
        Duration::from_secs(config.postgres_wait_timeout_secs),
    )?;
    postgres.ping().await.context("PostgreSQL is unreachable")?;
    ensure_schema(&postgres).await?;

    // Broker: both the event queue and its dead-letter companion
    let nats_client = Arc::new(
        NatsClient::connect(
            &config.nats_url,
            Duration::from_secs(config.nats_connect_timeout_secs),
        )
        .await?,
    );
    nats_client.ensure_queue(&config.events_stream).await?;
    nats_client.ensure_queue(&config.dead_letter_stream).await?;

    // Ingestion side
    let producer = Arc::new(NatsEventProducer::new(
        nats_client.create_publisher_client(),
        config.events_subject.clone(),
        Duration::from_secs(config.publish_timeout_secs),
    ));
    let ingestion_api = IngestionApi::new(
        AppState {
            ingestion: Arc::new(IngestionService::new(producer)),
            readiness: nats_client.clone(),
        },
        HttpServerConfig {
            host: config.http_host.clone(),
            port: config.http_port,
        },
    );

    // Persistence side
    let event_store = Arc::new(EventStore::new(
        postgres,
        Duration::from_secs(config.persist_timeout_secs),
    ));
    let worker = EventWorker::new(
        event_store,
        nats_client.clone(),
        EventWorkerConfig {
            stream: config.events_stream.clone(),
            filter_subject: config.events_subject.clone(),
            durable_name: config.consumer_durable_name.clone(),
            dead_letter_subject: config.dead_letter_subject.clone(),
            num_workers: config.num_workers,
            batch_size: config.nats_batch_size,
            batch_wait: Duration::from_secs(config.nats_batch_wait_secs),
            ack_wait: Duration::from_secs(config.ack_wait_secs),
            max_deliveries: config.max_deliveries,
            retry_delay: Duration::from_secs(config.retry_delay_secs),
            backoff_base: Duration::from_secs(config.consumer_backoff_base_secs),
            backoff_cap: Duration::from_secs(config.consumer_backoff_cap_secs),
            health_host: config.worker_health_host.clone(),
            health_port: config.worker_health_port,
        },
    );

    let mut runner = Runner::new()
        .with_named_process("ingestion_api", ingestion_api.into_runner_process());

    for (name, process) in worker.into_runner_processes() {
        runner = runner.with_boxed_process(name, process);
    }

    runner
        .with_closer("nats_connection", {
            let client = nats_client.clone();
            move || async move {
                client.close().await;
                Ok(())
            }
        })
        .with_closer_timeout(Duration::from_secs(10))
        .run()
        .await
}
