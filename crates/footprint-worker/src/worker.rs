use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use footprint_domain::{ActivityEventRepository, RetryPolicy};
use footprint_nats::{ConsumerConfig, EventConsumer, NatsClient};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::health::{run_health_server, HealthServerConfig};

/// A boxed long-running process, in the shape the runner consumes.
pub type WorkerProcess = Box<
    dyn FnOnce(
            CancellationToken,
        )
            -> std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send>>
        + Send,
>;

pub struct EventWorkerConfig {
    pub stream: String,
    pub filter_subject: String,
    pub durable_name: String,
    pub dead_letter_subject: String,
    /// Parallel consumer loops; the broker distributes messages across
    /// them through the shared durable consumer
    pub num_workers: usize,
    pub batch_size: usize,
    pub batch_wait: Duration,
    pub ack_wait: Duration,
    pub max_deliveries: i64,
    pub retry_delay: Duration,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub health_host: String,
    pub health_port: u16,
}

/// The event-persistence worker: N consumer loops over the shared durable
/// queue plus a health listener on its own port.
pub struct EventWorker {
    consumers: Vec<EventConsumer>,
    health_config: HealthServerConfig,
    readiness: Arc<AtomicBool>,
}

impl EventWorker {
    pub fn new(
        repository: Arc<dyn ActivityEventRepository>,
        nats_client: Arc<NatsClient>,
        config: EventWorkerConfig,
    ) -> Self {
        info!(
            workers = config.num_workers,
            durable = %config.durable_name,
            "Initializing event worker"
        );

        let readiness = Arc::new(AtomicBool::new(false));

        let consumer_config = ConsumerConfig {
            stream: config.stream,
            durable_name: config.durable_name,
            filter_subject: config.filter_subject,
            batch_size: config.batch_size,
            batch_wait: config.batch_wait,
            ack_wait: config.ack_wait,
            dead_letter_subject: config.dead_letter_subject,
            retry_policy: RetryPolicy {
                max_deliveries: config.max_deliveries,
                retry_delay: config.retry_delay,
            },
            backoff_base: config.backoff_base,
            backoff_cap: config.backoff_cap,
        };

        let consumers = (0..config.num_workers.max(1))
            .map(|_| {
                EventConsumer::new(
                    nats_client.create_consumer_client(),
                    nats_client.create_publisher_client(),
                    repository.clone(),
                    readiness.clone(),
                    consumer_config.clone(),
                )
            })
            .collect();

        Self {
            consumers,
            health_config: HealthServerConfig {
                host: config.health_host,
                port: config.health_port,
            },
            readiness,
        }
    }

    /// Breaks the worker down into named runner processes: one per
    /// consumer loop, plus the health listener.
    pub fn into_runner_processes(self) -> Vec<(String, WorkerProcess)> {
        let mut processes: Vec<(String, WorkerProcess)> = self
            .consumers
            .into_iter()
            .enumerate()
            .map(|(i, consumer)| {
                let process: WorkerProcess =
                    Box::new(move |ctx| Box::pin(async move { consumer.run(ctx).await }));
                (format!("event_consumer_{}", i), process)
            })
            .collect();

        let health_config = self.health_config;
        let readiness = self.readiness;
        let health: WorkerProcess = Box::new(move |ctx| {
            Box::pin(async move { run_health_server(health_config, readiness, ctx).await })
        });
        processes.push(("worker_health".to_string(), health));

        processes
    }
}
