use thiserror::Error;

/// Failure reported by an agent worker for one attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkerError {
    /// May succeed on another attempt; retried with backoff while attempts remain
    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("{0}")]
    Permanent(String),

    /// The worker future panicked; recorded like a permanent failure
    #[error("Worker panicked: {0}")]
    Panicked(String),
}

impl WorkerError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent(message.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
