mod message;
mod topics;
pub mod callback;

pub use message::{RegistrationMessage, StatusMessage, encode, decode_task};
pub use topics::{REGISTER_TOPIC, STATUS_TOPIC, LOG_TOPIC, task_topic};
pub use callback::{WorkerCallbackClient, TaskResultMessage, ResultAck};

use ai_worker_core::WorkerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid callback endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("RPC failed: {0}")]
    Rpc(#[from] tonic::Status),
}

impl From<ProtocolError> for WorkerError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::SerializationError(e) => WorkerError::Transport(e.to_string()),
            other => WorkerError::Delivery(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
