//! Owns the broker connection: registration, task subscription and
//! hand-off of decoded tasks to the processing loop.

use crate::config::BrokerSettings;
use crate::publisher::EventPublisher;
use ai_worker_core::{Result, TaskRequest, WorkerError, WorkerIdentity};
use ai_worker_protocol::{decode_task, task_topic};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, SubscribeReasonCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const QUERY_PREVIEW_CHARS: usize = 50;

/// MQTT session options for this worker
pub fn mqtt_options(settings: &BrokerSettings, identity: &WorkerIdentity) -> MqttOptions {
    let mut options = MqttOptions::new(identity.as_str(), settings.host.clone(), settings.port);
    options.set_keep_alive(Duration::from_secs(settings.keep_alive_secs));
    options.set_clean_session(true);
    options
}

/// Turns raw task-topic messages into tasks for this worker
pub struct TaskDispatcher {
    publisher: Arc<EventPublisher>,
    task_topic: String,
}

impl TaskDispatcher {
    pub fn new(publisher: Arc<EventPublisher>) -> Self {
        let task_topic = task_topic(publisher.identity().as_str());
        TaskDispatcher {
            publisher,
            task_topic,
        }
    }

    pub fn task_topic(&self) -> &str {
        &self.task_topic
    }

    /// Decode and validate an inbound message. Anything unusable is logged
    /// and dropped.
    pub fn accept(&self, topic: &str, payload: &[u8]) -> Option<TaskRequest> {
        if topic != self.task_topic {
            debug!("Message received on {}", topic);
            return None;
        }

        let task = match decode_task(payload).and_then(|task| {
            task.ensure_addressed_to(self.publisher.identity())?;
            Ok(task)
        }) {
            Ok(task) => task,
            Err(e) => {
                error!("Discarding task message: {}", e);
                self.publisher.publish_log(format!(
                    "Worker {} discarded task message: {}",
                    self.publisher.identity(),
                    e
                ));
                return None;
            }
        };

        info!("Task received: {}...", task.query_preview(QUERY_PREVIEW_CHARS));
        Some(task)
    }
}

pub struct SubscriptionManager {
    client: AsyncClient,
    eventloop: EventLoop,
    publisher: Arc<EventPublisher>,
    dispatcher: TaskDispatcher,
}

impl SubscriptionManager {
    pub fn new(client: AsyncClient, eventloop: EventLoop, publisher: Arc<EventPublisher>) -> Self {
        let dispatcher = TaskDispatcher::new(publisher.clone());
        SubscriptionManager {
            client,
            eventloop,
            publisher,
            dispatcher,
        }
    }

    /// Drive the connection, forwarding tasks into `tasks`.
    ///
    /// Failing to reach the broker at all, a rejected subscription or a
    /// stopped processing loop end the run with an error. Later connection
    /// drops are retried.
    ///
    /// `tasks` holds one task behind the one in flight. A further task makes
    /// this loop wait for the slot, and the event loop is not polled while
    /// it waits: keep-alive pings and the in-flight task's log and status
    /// events stay buffered until the slot frees. The coordinator only
    /// dispatches to idle workers, so a third pending task means it
    /// misbehaved.
    pub async fn run(mut self, tasks: mpsc::Sender<TaskRequest>) -> Result<()> {
        let mut connected = false;

        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    connected = true;
                    self.on_connect()?;
                }
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    if ack
                        .return_codes
                        .iter()
                        .any(|code| matches!(code, SubscribeReasonCode::Failure))
                    {
                        return Err(WorkerError::Transport(format!(
                            "broker rejected subscription to {}",
                            self.dispatcher.task_topic()
                        )));
                    }
                    info!("Subscribed to {}", self.dispatcher.task_topic());
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    if let Some(task) = self.dispatcher.accept(&publish.topic, &publish.payload) {
                        // Blocks polling until the queue slot frees
                        tasks.send(task).await.map_err(|_| {
                            WorkerError::Transport("task processing loop stopped".to_string())
                        })?;
                    }
                }
                Ok(_) => {}
                Err(e) if !connected => {
                    return Err(WorkerError::Transport(format!(
                        "failed to connect to broker: {}",
                        e
                    )));
                }
                Err(e) => {
                    warn!("Broker connection error: {}", e);
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }

    fn on_connect(&self) -> Result<()> {
        info!("Connected to broker");
        self.publisher.publish_log(format!(
            "Worker {} connected to MQTT broker",
            self.publisher.identity()
        ));

        self.client
            .try_subscribe(self.dispatcher.task_topic(), QoS::AtMostOnce)
            .map_err(|e| WorkerError::Transport(format!("subscribe failed: {}", e)))?;

        self.publisher.register();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::MqttSink;
    use crate::test_support::{sample_task, Timeline};
    use ai_worker_protocol::{REGISTER_TOPIC, STATUS_TOPIC};
    use serde_json::Value;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    fn dispatcher(timeline: &Timeline) -> TaskDispatcher {
        TaskDispatcher::new(Arc::new(EventPublisher::new(
            WorkerIdentity::for_host("rust-worker", "test"),
            Arc::new(timeline.sink()),
        )))
    }

    #[test]
    fn test_accepts_task_for_this_worker() {
        let timeline = Timeline::new();
        let dispatcher = dispatcher(&timeline);
        let worker_id = dispatcher.publisher.identity().to_string();
        let payload = serde_json::to_vec(&sample_task(&worker_id, "S")).unwrap();

        let task = dispatcher.accept(dispatcher.task_topic(), &payload).unwrap();

        assert_eq!(task.session_id, "S");
        assert!(timeline.entries().is_empty());
    }

    #[test]
    fn test_malformed_payload_is_isolated() {
        let timeline = Timeline::new();
        let dispatcher = dispatcher(&timeline);

        let task = dispatcher.accept(dispatcher.task_topic(), b"\x00garbage");

        assert!(task.is_none());
        assert_eq!(timeline.logs().len(), 1);
        assert!(timeline.logs()[0].contains("discarded task message"));
        assert!(timeline.on_topic(STATUS_TOPIC).is_empty());
        assert_eq!(dispatcher.publisher.status(), ai_worker_core::WorkerStatus::Idle);
    }

    #[test]
    fn test_task_for_other_worker_is_dropped() {
        let timeline = Timeline::new();
        let dispatcher = dispatcher(&timeline);
        let payload = serde_json::to_vec(&sample_task("go-worker-h-12345678", "S")).unwrap();

        assert!(dispatcher.accept(dispatcher.task_topic(), &payload).is_none());
        assert!(timeline.logs()[0].contains("go-worker-h-12345678"));
        assert!(timeline.statuses().is_empty());
    }

    #[test]
    fn test_other_topics_are_ignored() {
        let timeline = Timeline::new();
        let dispatcher = dispatcher(&timeline);

        assert!(dispatcher.accept("upb/logs", b"{}").is_none());
        assert!(timeline.entries().is_empty());
    }

    #[test]
    fn test_mqtt_options() {
        let identity = WorkerIdentity::for_host("rust-worker", "test");
        let settings = BrokerSettings {
            host: "broker".to_string(),
            port: 1884,
            keep_alive_secs: 30,
            request_capacity: 8,
        };

        let options = mqtt_options(&settings, &identity);
        assert_eq!(options.client_id(), identity.as_str());
        assert_eq!(options.broker_address(), ("broker".to_string(), 1884));
        assert_eq!(options.keep_alive(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_unreachable_broker_is_fatal() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let timeline = Timeline::new();
        let identity = WorkerIdentity::for_host("rust-worker", "test");
        let settings = BrokerSettings {
            host: "127.0.0.1".to_string(),
            port,
            ..BrokerSettings::default()
        };
        let (client, eventloop) = AsyncClient::new(mqtt_options(&settings, &identity), 8);
        let publisher = Arc::new(EventPublisher::new(identity, Arc::new(timeline.sink())));
        let (tx, _rx) = mpsc::channel(1);

        let result = SubscriptionManager::new(client, eventloop, publisher).run(tx).await;

        assert!(matches!(result, Err(WorkerError::Transport(_))));
    }

    /// Read one MQTT 3.1.1 packet: fixed header byte and body
    async fn read_packet(stream: &mut TcpStream) -> (u8, Vec<u8>) {
        let header = stream.read_u8().await.unwrap();
        let mut len = 0usize;
        let mut shift = 0;
        loop {
            let byte = stream.read_u8().await.unwrap();
            len |= ((byte & 0x7f) as usize) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        let mut body = vec![0u8; len];
        stream.read_exact(&mut body).await.unwrap();
        (header, body)
    }

    fn length_prefixed(bytes: &[u8]) -> String {
        let len = u16::from_be_bytes([bytes[0], bytes[1]]) as usize;
        String::from_utf8(bytes[2..2 + len].to_vec()).unwrap()
    }

    /// QoS 0 PUBLISH from broker to client
    fn publish_packet(topic: &str, payload: &[u8]) -> Vec<u8> {
        let mut remaining = 2 + topic.len() + payload.len();
        let mut packet = vec![0x30];
        loop {
            let mut byte = (remaining % 128) as u8;
            remaining /= 128;
            if remaining > 0 {
                byte |= 0x80;
            }
            packet.push(byte);
            if remaining == 0 {
                break;
            }
        }
        packet.extend_from_slice(&(topic.len() as u16).to_be_bytes());
        packet.extend_from_slice(topic.as_bytes());
        packet.extend_from_slice(payload);
        packet
    }

    /// Scripted broker side of the handshake. Answers CONNECT, answers the
    /// subscription with `suback_code` and records what the worker sent. A
    /// granted subscription reads on until the registration arrives.
    async fn handshake(
        listener: &TcpListener,
        suback_code: u8,
    ) -> (TcpStream, Vec<String>, Option<Value>) {
        let (mut stream, _) = listener.accept().await.unwrap();

        let (header, _) = read_packet(&mut stream).await;
        assert_eq!(header, 0x10, "expected CONNECT");
        stream.write_all(&[0x20, 0x02, 0x00, 0x00]).await.unwrap();

        let mut seen = Vec::new();
        loop {
            let (header, body) = read_packet(&mut stream).await;
            match header >> 4 {
                3 => {
                    let topic = length_prefixed(&body);
                    seen.push(format!("PUB {}", topic));
                    if topic == REGISTER_TOPIC {
                        let payload = serde_json::from_slice(&body[2 + topic.len()..]).unwrap();
                        return (stream, seen, Some(payload));
                    }
                }
                8 => {
                    seen.push(format!("SUB {}", length_prefixed(&body[2..])));
                    stream
                        .write_all(&[0x90, 0x03, body[0], body[1], suback_code])
                        .await
                        .unwrap();
                    if suback_code == 0x80 {
                        return (stream, seen, None);
                    }
                }
                _ => {}
            }
        }
    }

    fn broker_backed_manager(port: u16) -> (SubscriptionManager, WorkerIdentity) {
        let identity = WorkerIdentity::for_host("rust-worker", "test");
        let settings = BrokerSettings {
            host: "127.0.0.1".to_string(),
            port,
            ..BrokerSettings::default()
        };
        let (client, eventloop) = AsyncClient::new(mqtt_options(&settings, &identity), 16);
        let publisher = Arc::new(EventPublisher::new(
            identity.clone(),
            Arc::new(MqttSink::new(client.clone())),
        ));
        (SubscriptionManager::new(client, eventloop, publisher), identity)
    }

    #[tokio::test]
    async fn test_connect_subscribes_registers_and_forwards_tasks() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (manager, identity) = broker_backed_manager(listener.local_addr().unwrap().port());
        let topic = task_topic(identity.as_str());
        let (tx, mut rx) = mpsc::channel(1);
        let run = tokio::spawn(manager.run(tx));

        let (mut stream, seen, registration) =
            timeout(WAIT, handshake(&listener, 0x00)).await.unwrap();

        let subscribed = seen.iter().position(|p| *p == format!("SUB {}", topic));
        let registered = seen.iter().position(|p| *p == format!("PUB {}", REGISTER_TOPIC));
        assert!(subscribed.is_some(), "no subscription in {:?}", seen);
        assert!(subscribed < registered);
        let registration = registration.unwrap();
        assert_eq!(registration["worker_id"], identity.as_str());
        assert_eq!(registration["status"], "idle");
        assert_eq!(registration["language"], "Rust");

        // A malformed message is dropped; the next valid one still arrives
        stream.write_all(&publish_packet(&topic, b"{garbage")).await.unwrap();
        let payload = serde_json::to_vec(&sample_task(identity.as_str(), "S")).unwrap();
        stream.write_all(&publish_packet(&topic, &payload)).await.unwrap();

        let task = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(task.session_id, "S");
        assert_eq!(task.worker_id, identity.as_str());

        run.abort();
    }

    #[tokio::test]
    async fn test_rejected_subscription_is_fatal() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (manager, identity) = broker_backed_manager(listener.local_addr().unwrap().port());
        let (tx, _rx) = mpsc::channel(1);
        let run = tokio::spawn(manager.run(tx));

        let (_stream, seen, _) = timeout(WAIT, handshake(&listener, 0x80)).await.unwrap();
        assert!(seen.contains(&format!("SUB {}", task_topic(identity.as_str()))));

        let result = timeout(WAIT, run).await.unwrap().unwrap();
        match result {
            Err(WorkerError::Transport(msg)) => assert!(msg.contains("rejected subscription")),
            other => panic!("Expected Transport error, got {:?}", other),
        }
    }
}
