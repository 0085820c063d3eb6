//! Fire-and-forget log, status and registration events.

use ai_worker_core::{now_millis, LogEvent, WorkerIdentity, WorkerStatus};
use ai_worker_protocol::{
    encode, RegistrationMessage, StatusMessage, LOG_TOPIC, REGISTER_TOPIC, STATUS_TOPIC,
};
use parking_lot::Mutex;
use rumqttc::{AsyncClient, QoS};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Narrow publish interface the rest of the worker talks to.
///
/// Publishing never reports failure to the caller and never waits on the
/// broker.
pub trait EventSink: Send + Sync {
    fn publish(&self, topic: &str, payload: Vec<u8>);
}

/// Publishes through the MQTT client's request buffer
pub struct MqttSink {
    client: AsyncClient,
}

impl MqttSink {
    pub fn new(client: AsyncClient) -> Self {
        MqttSink { client }
    }
}

impl EventSink for MqttSink {
    fn publish(&self, topic: &str, payload: Vec<u8>) {
        if let Err(e) = self.client.try_publish(topic, QoS::AtMostOnce, false, payload) {
            warn!("Dropped event for {}: {}", topic, e);
        }
    }
}

/// Emits worker events and owns the worker's status cell
pub struct EventPublisher {
    identity: WorkerIdentity,
    sink: Arc<dyn EventSink>,
    status: Mutex<WorkerStatus>,
}

impl EventPublisher {
    pub fn new(identity: WorkerIdentity, sink: Arc<dyn EventSink>) -> Self {
        EventPublisher {
            identity,
            sink,
            status: Mutex::new(WorkerStatus::Idle),
        }
    }

    pub fn identity(&self) -> &WorkerIdentity {
        &self.identity
    }

    pub fn status(&self) -> WorkerStatus {
        *self.status.lock()
    }

    /// Broadcast a log line and echo it locally
    pub fn publish_log(&self, message: impl Into<String>) {
        let event = LogEvent::new(&self.identity, message);
        info!("[LOG] {}", event.message);
        self.send(LOG_TOPIC, &event);
    }

    /// Announce this worker to the coordinator
    pub fn register(&self) {
        let message = RegistrationMessage::new(&self.identity, self.status(), now_millis());
        self.send(REGISTER_TOPIC, &message);
        self.publish_log(format!("Worker {} registered", self.identity));
    }

    /// Record a transition and broadcast it. Only the task processor calls
    /// this.
    pub(crate) fn update_status(&self, status: WorkerStatus) {
        {
            let mut current = self.status.lock();
            *current = status;
            let message = StatusMessage::new(&self.identity, status, now_millis());
            self.send(STATUS_TOPIC, &message);
        }
        self.publish_log(format!("Worker {} changed status to: {}", self.identity, status));
    }

    fn send<T: Serialize>(&self, topic: &str, message: &T) {
        match encode(message) {
            Ok(payload) => self.sink.publish(topic, payload),
            Err(e) => warn!("Failed to encode event for {}: {}", topic, e),
        }
    }
}
