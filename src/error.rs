use thiserror::Error;

/// Closed error set for the worker. Leaf stages log these with job context
/// and return sentinels; only the orchestrator decides to stop a pipeline.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("malformed media: {0}")]
    Malformed(String),

    #[error("duration mismatch: output {actual:.2}s vs mezzanine {expected:.2}s")]
    DurationMismatch { expected: f64, actual: f64 },

    #[error("tool failure: {0}")]
    ToolFailure(String),

    #[error("network auth failure: {0}")]
    NetworkAuthFailure(String),

    #[error("retry deadline exhausted after {attempts} attempts")]
    RetryTimeoutExhausted { attempts: u32 },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("http error: {0}")]
    Http(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for WorkerError {
    fn from(err: reqwest::Error) -> Self {
        WorkerError::Http(err.to_string())
    }
}

impl WorkerError {
    /// Transient failures are worth re-attempting; auth rejections and
    /// missing objects are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Storage(_) | WorkerError::Http(_) | WorkerError::Io(_) => true,
            WorkerError::NotFound(_)
            | WorkerError::Malformed(_)
            | WorkerError::DurationMismatch { .. }
            | WorkerError::ToolFailure(_)
            | WorkerError::NetworkAuthFailure(_)
            | WorkerError::RetryTimeoutExhausted { .. } => false,
        }
    }
}
