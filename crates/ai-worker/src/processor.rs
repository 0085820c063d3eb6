//! One-task-at-a-time processing: reasoning call, simulated work, delivery.

use crate::gateway::ReasoningGateway;
use crate::publisher::EventPublisher;
use crate::reporter::ResultReporter;
use ai_worker_core::{Result, TaskRequest, TaskResult, WorkerError, WorkerStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{error, info};

/// Holds the worker busy for its lifetime; dropping it always returns the
/// status to idle.
struct BusyGuard<'a> {
    publisher: &'a EventPublisher,
}

impl<'a> BusyGuard<'a> {
    fn enter(publisher: &'a EventPublisher) -> Self {
        publisher.update_status(WorkerStatus::Busy);
        BusyGuard { publisher }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.publisher.update_status(WorkerStatus::Idle);
    }
}

/// Text placed in `ai_response` when the reasoning call failed
pub fn error_response(err: &WorkerError) -> String {
    format!("Error: {}", err)
}

pub struct TaskProcessor {
    publisher: Arc<EventPublisher>,
    gateway: Arc<dyn ReasoningGateway>,
    reporter: Arc<dyn ResultReporter>,
    simulated_work: Duration,
}

impl TaskProcessor {
    pub fn new(
        publisher: Arc<EventPublisher>,
        gateway: Arc<dyn ReasoningGateway>,
        reporter: Arc<dyn ResultReporter>,
        simulated_work: Duration,
    ) -> Self {
        TaskProcessor {
            publisher,
            gateway,
            reporter,
            simulated_work,
        }
    }

    /// Process queued tasks strictly in arrival order, one at a time.
    /// Returns once every sender is gone.
    pub async fn run(self, mut tasks: mpsc::Receiver<TaskRequest>) {
        while let Some(task) = tasks.recv().await {
            // Outcome already published by `process`
            let _ = self.process(task).await;
        }
        info!("Task queue closed, processing loop stopped");
    }

    /// Run one task end to end. The returned error is the delivery outcome;
    /// a reasoning failure is folded into the result instead.
    pub async fn process(&self, task: TaskRequest) -> Result<()> {
        let identity = self.publisher.identity().clone();

        self.publisher.publish_log(format!(
            "Worker {} processing task for session {}",
            identity, task.session_id
        ));
        let _busy = BusyGuard::enter(&self.publisher);
        let started = Instant::now();

        let ai_response = match self.gateway.query(&task.query, &task.api_key).await {
            Ok(answer) => answer,
            Err(e) => {
                error!("Reasoning call failed for session {}: {}", task.session_id, e);
                self.publisher
                    .publish_log(format!("Worker {} failed to query Gemini: {}", identity, e));
                error_response(&e)
            }
        };

        self.simulate_work().await;

        let processing_time_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
        let result = TaskResult::from_request(&identity, &task, ai_response, processing_time_ms);

        let outcome = self.reporter.deliver(&task.grpc_endpoint, result).await;
        match &outcome {
            Ok(()) => self
                .publisher
                .publish_log(format!("Worker {} completed task successfully", identity)),
            Err(e) => {
                error!("Result for session {} not delivered: {}", task.session_id, e);
                self.publisher
                    .publish_log(format!("Worker {} failed to send result: {}", identity, e));
            }
        }

        outcome
    }

    async fn simulate_work(&self) {
        self.publisher.publish_log(format!(
            "Worker {} simulating processing of {}ms",
            self.publisher.identity(),
            self.simulated_work.as_millis()
        ));
        tokio::time::sleep(self.simulated_work).await;
    }
}
