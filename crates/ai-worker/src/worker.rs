use crate::config::WorkerConfig;
use crate::gateway::GeminiGateway;
use crate::processor::TaskProcessor;
use crate::publisher::{EventPublisher, MqttSink};
use crate::reporter::GrpcResultReporter;
use crate::subscription::{mqtt_options, SubscriptionManager};
use ai_worker_core::{Result, WorkerIdentity, WORKER_LANGUAGE};
use rumqttc::AsyncClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

/// Single-task worker process
pub struct Worker {
    config: WorkerConfig,
    identity: WorkerIdentity,
}

impl Worker {
    pub fn new(config: WorkerConfig) -> Self {
        Worker {
            config,
            identity: WorkerIdentity::generate(),
        }
    }

    pub fn identity(&self) -> &WorkerIdentity {
        &self.identity
    }

    /// Run until the broker connection fails fatally
    pub async fn run(self) -> Result<()> {
        info!("Starting {}", self.identity);
        info!("Language: {}", WORKER_LANGUAGE);

        let startup_delay = Duration::from_secs(self.config.processing.startup_delay_secs);
        if !startup_delay.is_zero() {
            info!("Waiting {:?} for the broker to come up", startup_delay);
            tokio::time::sleep(startup_delay).await;
        }

        info!("Connecting to broker at {}", self.config.broker_address());
        let (client, eventloop) = AsyncClient::new(
            mqtt_options(&self.config.broker, &self.identity),
            self.config.broker.request_capacity,
        );

        let publisher = Arc::new(EventPublisher::new(
            self.identity.clone(),
            Arc::new(MqttSink::new(client.clone())),
        ));
        let gateway = Arc::new(GeminiGateway::new(&self.config.reasoning, publisher.clone()));
        let reporter = Arc::new(GrpcResultReporter::new(
            self.config.delivery_timeout(),
            publisher.clone(),
        ));
        let processor = TaskProcessor::new(
            publisher.clone(),
            gateway,
            reporter,
            self.config.simulated_work(),
        );

        // Capacity one: at most one task waits behind the one in flight.
        let (tasks_tx, tasks_rx) = mpsc::channel(1);
        let processing = tokio::spawn(processor.run(tasks_rx));

        info!("Worker running");
        let outcome = SubscriptionManager::new(client, eventloop, publisher)
            .run(tasks_tx)
            .await;

        processing.abort();
        outcome
    }
}
