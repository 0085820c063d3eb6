pub mod config;
pub mod publisher;
pub mod gateway;
pub mod reporter;
pub mod processor;
pub mod subscription;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use config::WorkerConfig;
pub use gateway::{GeminiGateway, ReasoningGateway};
pub use processor::TaskProcessor;
pub use publisher::{EventPublisher, EventSink, MqttSink};
pub use reporter::{GrpcResultReporter, ResultReporter};
pub use subscription::SubscriptionManager;
pub use worker::Worker;
