use crate::Result;
use ai_worker_core::{TaskRequest, WorkerIdentity, WorkerStatus, WORKER_LANGUAGE};
use serde::{Deserialize, Serialize};

/// Published on the registration topic after each connect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationMessage {
    pub worker_id: String,
    pub language: String,
    pub status: WorkerStatus,
    pub timestamp: i64,
}

impl RegistrationMessage {
    pub fn new(identity: &WorkerIdentity, status: WorkerStatus, timestamp: i64) -> Self {
        RegistrationMessage {
            worker_id: identity.to_string(),
            language: WORKER_LANGUAGE.to_string(),
            status,
            timestamp,
        }
    }
}

/// Published on the status topic for every transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub worker_id: String,
    pub status: WorkerStatus,
    pub timestamp: i64,
}

impl StatusMessage {
    pub fn new(identity: &WorkerIdentity, status: WorkerStatus, timestamp: i64) -> Self {
        StatusMessage {
            worker_id: identity.to_string(),
            status,
            timestamp,
        }
    }
}

/// Serialize any topic payload to JSON
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(message)?)
}

/// Decode an inbound task-topic payload
pub fn decode_task(payload: &[u8]) -> ai_worker_core::Result<TaskRequest> {
    TaskRequest::from_json(payload)
}
