use crate::{Result, WorkerError, WorkerIdentity};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Current wall-clock time in Unix milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Unit of work routed to exactly one worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRequest {
    /// Worker the coordinator addressed
    pub worker_id: String,

    /// Client session the answer belongs to
    pub session_id: String,

    /// Free-text query for the reasoning service
    pub query: String,

    /// Reasoning-service credential
    pub api_key: String,

    /// `host:port` of the coordinator's callback service
    pub grpc_endpoint: String,

    /// Submission time (Unix millis)
    pub timestamp: i64,
}

impl TaskRequest {
    /// Decode a task from its JSON wire form
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(WorkerError::from)
    }

    /// Reject tasks that were routed to another worker
    pub fn ensure_addressed_to(&self, identity: &WorkerIdentity) -> Result<()> {
        if self.worker_id != identity.as_str() {
            return Err(WorkerError::WorkerMismatch {
                expected: identity.to_string(),
                actual: self.worker_id.clone(),
            });
        }
        Ok(())
    }

    /// First `max_chars` characters of the query, for log lines
    pub fn query_preview(&self, max_chars: usize) -> &str {
        match self.query.char_indices().nth(max_chars) {
            Some((idx, _)) => &self.query[..idx],
            None => &self.query,
        }
    }
}

/// Outcome of one processed task, delivered to the coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub worker_id: String,
    pub session_id: String,
    pub original_query: String,

    /// Reasoning answer, or the error text that replaced it
    pub ai_response: String,

    /// Echoed back on purpose: the coordinator keys its per-session
    /// credential bookkeeping on it.
    pub api_key: String,

    pub processing_time_ms: i64,
    pub query_timestamp: i64,
    pub completion_timestamp: i64,
}

impl TaskResult {
    /// Build the result for `request`, stamping the completion time now
    pub fn from_request(
        identity: &WorkerIdentity,
        request: &TaskRequest,
        ai_response: String,
        processing_time_ms: i64,
    ) -> Self {
        TaskResult {
            worker_id: identity.to_string(),
            session_id: request.session_id.clone(),
            original_query: request.query.clone(),
            ai_response,
            api_key: request.api_key.clone(),
            processing_time_ms,
            query_timestamp: request.timestamp,
            completion_timestamp: now_millis(),
        }
    }
}

/// Structured log line broadcast on the log topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    pub timestamp: i64,
    pub source: String,
    pub message: String,
}

impl LogEvent {
    pub fn new(source: &WorkerIdentity, message: impl Into<String>) -> Self {
        LogEvent {
            timestamp: now_millis(),
            source: source.to_string(),
            message: message.into(),
        }
    }
}
