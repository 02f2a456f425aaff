pub mod error;
pub mod event;
pub mod health;
pub mod ingestion_service;
pub mod processor;
pub mod repository;
pub mod validate;

pub use error::{DomainError, DomainResult, ValidationError};
pub use event::{ActivityEvent, TrackEventRequest, EVENT_TYPE_MAX_LEN};
pub use health::ReadinessProbe;
pub use ingestion_service::IngestionService;
pub use processor::{decide, Disposition, RetryPolicy};
pub use repository::{ActivityEventProducer, ActivityEventRepository, PersistError, PersistOutcome};

#[cfg(any(test, feature = "testing"))]
pub use repository::{MockActivityEventProducer, MockActivityEventRepository};
