//! Delivers task results to the coordinator's callback service.

use crate::publisher::EventPublisher;
use ai_worker_core::{Result, TaskResult, WorkerError};
use ai_worker_protocol::{ProtocolError, ResultAck, TaskResultMessage, WorkerCallbackClient};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Point-to-point delivery of one result. Any failure, including an expired
/// deadline, is a single `WorkerError::Delivery`.
#[async_trait]
pub trait ResultReporter: Send + Sync {
    async fn deliver(&self, endpoint: &str, result: TaskResult) -> Result<()>;
}

/// gRPC reporter; dials the endpoint named by each task
pub struct GrpcResultReporter {
    timeout: Duration,
    publisher: Arc<EventPublisher>,
}

impl GrpcResultReporter {
    pub fn new(timeout: Duration, publisher: Arc<EventPublisher>) -> Self {
        GrpcResultReporter { timeout, publisher }
    }

    async fn send(&self, endpoint: &str, result: TaskResult) -> Result<ResultAck> {
        // The channel lives only for this call.
        let mut client = WorkerCallbackClient::connect(endpoint, self.timeout).await?;
        let response = client
            .send_result(TaskResultMessage::from(result))
            .await
            .map_err(ProtocolError::from)?;
        Ok(response.into_inner())
    }
}

#[async_trait]
impl ResultReporter for GrpcResultReporter {
    async fn deliver(&self, endpoint: &str, result: TaskResult) -> Result<()> {
        debug!("Delivering result for session {} to {}", result.session_id, endpoint);

        let ack = tokio::time::timeout(self.timeout, self.send(endpoint, result))
            .await
            .map_err(|_| {
                WorkerError::Delivery(format!("no answer from {} within {:?}", endpoint, self.timeout))
            })??;

        if !ack.success {
            return Err(WorkerError::Delivery(format!(
                "coordinator rejected result: {}",
                ack.message
            )));
        }

        self.publisher.publish_log(format!(
            "Worker {} sent result via gRPC: {}",
            self.publisher.identity(),
            ack.message
        ));
        Ok(())
    }
}
