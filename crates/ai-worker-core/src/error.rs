use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Malformed task payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Task addressed to {actual}, this worker is {expected}")]
    WorkerMismatch { expected: String, actual: String },

    #[error("Reasoning service error: {0}")]
    Reasoning(String),

    #[error("Result delivery failed: {0}")]
    Delivery(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
