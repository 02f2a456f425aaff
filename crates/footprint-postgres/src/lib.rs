mod client;
mod event_store;
mod schema;

pub use client::PostgresClient;
pub use event_store::EventStore;
pub use schema::ensure_schema;
