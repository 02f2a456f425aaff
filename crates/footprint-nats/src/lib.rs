pub mod client;
pub mod consumer;
pub mod producer;
pub mod traits;

pub use client::{NatsClient, NatsJetStreamConsumer, NatsJetStreamPublisher};
pub use consumer::{ConsumerConfig, DeadLetteredEvent, EventConsumer};
pub use producer::NatsEventProducer;
pub use traits::{JetStreamConsumer, JetStreamPublisher, PullConsumer};

#[cfg(any(test, feature = "testing"))]
pub use traits::{MockJetStreamConsumer, MockJetStreamPublisher, MockPullConsumer};
