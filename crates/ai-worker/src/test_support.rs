//! In-memory collaborators shared by the unit tests.

use crate::gateway::ReasoningGateway;
use crate::publisher::EventSink;
use crate::reporter::ResultReporter;
use ai_worker_core::{Result, TaskRequest, TaskResult, WorkerError, WorkerStatus};
use ai_worker_protocol::{LOG_TOPIC, STATUS_TOPIC};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum Entry {
    Published { topic: String, payload: Value },
    Reasoning { query: String, credential: String },
    Delivery { endpoint: String, result: TaskResult },
}

/// Ordered record of everything the worker did, across collaborators
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    entries: Arc<Mutex<Vec<Entry>>>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sink(&self) -> TimelineSink {
        TimelineSink {
            timeline: self.clone(),
        }
    }

    pub fn push(&self, entry: Entry) {
        self.entries.lock().push(entry);
    }

    pub fn entries(&self) -> Vec<Entry> {
        self.entries.lock().clone()
    }

    pub fn on_topic(&self, wanted: &str) -> Vec<Value> {
        self.entries()
            .into_iter()
            .filter_map(|e| match e {
                Entry::Published { topic, payload } if topic == wanted => Some(payload),
                _ => None,
            })
            .collect()
    }

    pub fn statuses(&self) -> Vec<WorkerStatus> {
        self.on_topic(STATUS_TOPIC)
            .iter()
            .filter_map(|p| p["status"].as_str().and_then(WorkerStatus::parse))
            .collect()
    }

    pub fn logs(&self) -> Vec<String> {
        self.on_topic(LOG_TOPIC)
            .iter()
            .filter_map(|p| p["message"].as_str().map(str::to_string))
            .collect()
    }

    pub fn deliveries(&self) -> Vec<TaskResult> {
        self.entries()
            .into_iter()
            .filter_map(|e| match e {
                Entry::Delivery { result, .. } => Some(result),
                _ => None,
            })
            .collect()
    }

    /// Status transitions and delivery attempts in the order they happened
    pub fn milestones(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter_map(|e| match e {
                Entry::Published { topic, payload } if topic == STATUS_TOPIC => {
                    payload["status"].as_str().map(str::to_string)
                }
                Entry::Delivery { result, .. } => Some(format!("deliver:{}", result.session_id)),
                _ => None,
            })
            .collect()
    }
}

pub struct TimelineSink {
    timeline: Timeline,
}

impl EventSink for TimelineSink {
    fn publish(&self, topic: &str, payload: Vec<u8>) {
        let payload = serde_json::from_slice(&payload).unwrap_or(Value::Null);
        self.timeline.push(Entry::Published {
            topic: topic.to_string(),
            payload,
        });
    }
}

pub struct FakeGateway {
    timeline: Timeline,
    answer: std::result::Result<String, String>,
}

impl FakeGateway {
    pub fn answering(timeline: &Timeline, answer: &str) -> Self {
        FakeGateway {
            timeline: timeline.clone(),
            answer: Ok(answer.to_string()),
        }
    }

    pub fn failing(timeline: &Timeline, error: &str) -> Self {
        FakeGateway {
            timeline: timeline.clone(),
            answer: Err(error.to_string()),
        }
    }
}

#[async_trait]
impl ReasoningGateway for FakeGateway {
    async fn query(&self, text: &str, credential: &str) -> Result<String> {
        self.timeline.push(Entry::Reasoning {
            query: text.to_string(),
            credential: credential.to_string(),
        });
        self.answer.clone().map_err(WorkerError::Reasoning)
    }
}

pub struct FakeReporter {
    timeline: Timeline,
    fail: bool,
    latency: Duration,
}

impl FakeReporter {
    pub fn accepting(timeline: &Timeline) -> Self {
        FakeReporter {
            timeline: timeline.clone(),
            fail: false,
            latency: Duration::ZERO,
        }
    }

    pub fn failing(timeline: &Timeline) -> Self {
        FakeReporter {
            fail: true,
            ..Self::accepting(timeline)
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[async_trait]
impl ResultReporter for FakeReporter {
    async fn deliver(&self, endpoint: &str, result: TaskResult) -> Result<()> {
        self.timeline.push(Entry::Delivery {
            endpoint: endpoint.to_string(),
            result,
        });
        tokio::time::sleep(self.latency).await;
        if self.fail {
            return Err(WorkerError::Delivery("connection refused".to_string()));
        }
        Ok(())
    }
}

pub fn sample_task(worker_id: &str, session_id: &str) -> TaskRequest {
    TaskRequest {
        worker_id: worker_id.to_string(),
        session_id: session_id.to_string(),
        query: "Q".to_string(),
        api_key: "K".to_string(),
        grpc_endpoint: "master:50051".to_string(),
        timestamp: 1000,
    }
}
