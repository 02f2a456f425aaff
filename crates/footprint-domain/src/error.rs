use thiserror::Error;

/// A single failed field check, named so callers can surface it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid event payload: {0}")]
    Validation(ValidationError),

    #[error("Broker unavailable: {0}")]
    BrokerUnavailable(#[source] anyhow::Error),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Repository error: {0}")]
    Repository(#[from] anyhow::Error),
}

pub type DomainResult<T> = Result<T, DomainError>;
