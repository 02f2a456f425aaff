pub mod health;
pub mod worker;

pub use health::{run_health_server, HealthServerConfig};
pub use worker::{EventWorker, EventWorkerConfig, WorkerProcess};
