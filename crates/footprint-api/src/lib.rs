pub mod error;
pub mod handlers;
pub mod server;

pub use error::ApiError;
pub use handlers::{build_router, AppState};
pub use server::{HttpServerConfig, IngestionApi};
