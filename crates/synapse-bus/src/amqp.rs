//! AMQP 0.9.1-backed [`MessageBus`], for deployments that span more than
//! one process.
//!
//! Unicast envelopes are published to the `synapse.direct` exchange with
//! the agent id as routing key; topic envelopes go to the
//! `synapse.topics` fan-out/topic exchange. Each subscription declares
//! its own exclusive, auto-delete queue bound to the relevant exchange
//! and drains it with a dedicated consumer task, mirroring the dispatch
//! shape of [`crate::memory::InMemoryBus`] so callers can swap
//! implementations without changing subscription code.

use crate::error::{BusError, BusResult, IntoBusReport};
use crate::metrics::BusMetrics;
use crate::traits::{Handler, MessageBus};
use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions,
    QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use synapse_protocol::{Destination, Envelope};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Direct exchange used for point-to-point delivery, keyed by agent id.
pub const DIRECT_EXCHANGE: &str = "synapse.direct";

/// Topic exchange used for fan-out delivery, keyed by topic name.
pub const TOPIC_EXCHANGE: &str = "synapse.topics";

/// Number of connection attempts made before giving up during `connect`.
pub const MAX_CONNECTION_ATTEMPTS: u32 = 5;

/// Delay between reconnection attempts.
pub const RECONNECT_DELAY: std::time::Duration = std::time::Duration::from_secs(5);

struct SharedState {
    connection: Mutex<Option<Connection>>,
    url: String,
    connected: AtomicBool,
    metrics: Arc<BusMetrics>,
    /// Envelopes accepted by `publish` while the connection is being
    /// (re-)established. Drained as soon as a channel is available.
    reconnect_buffer: Mutex<VecDeque<(String, bool, Envelope)>>,
    reconnect_buffer_limit: usize,
    /// One token per agent's exclusive-queue consumer, cancelled by
    /// `unsubscribe_agent` so that specific consumer stops pulling new
    /// deliveries immediately.
    agent_cancels: Mutex<HashMap<String, CancellationToken>>,
    /// Tokens for every consumer currently fanned out to a topic (each
    /// `subscribe_topic` call binds its own queue), cancelled together by
    /// `unsubscribe_topic`.
    topic_cancels: Mutex<HashMap<String, Vec<CancellationToken>>>,
}

/// Production message bus backed by a RabbitMQ-compatible AMQP 0.9.1
/// broker.
pub struct AmqpBus {
    state: Arc<SharedState>,
}

impl AmqpBus {
    /// `url` is an `amqp://` connection string. `reconnect_buffer_limit`
    /// bounds how many publishes are held in memory while reconnecting
    /// before `publish` fails with [`BusError::BackpressureExceeded`].
    pub fn new(url: impl Into<String>, reconnect_buffer_limit: usize) -> Self {
        Self {
            state: Arc::new(SharedState {
                connection: Mutex::new(None),
                url: url.into(),
                connected: AtomicBool::new(false),
                metrics: Arc::new(BusMetrics::new()),
                reconnect_buffer: Mutex::new(VecDeque::new()),
                reconnect_buffer_limit,
                agent_cancels: Mutex::new(HashMap::new()),
                topic_cancels: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn metrics(&self) -> &BusMetrics {
        &self.state.metrics
    }

    async fn open_channel(&self) -> BusResult<Channel> {
        let guard = self.state.connection.lock().await;
        let conn = guard
            .as_ref()
            .ok_or(BusError::NotConnected)
            .into_report()?;
        let channel = conn
            .create_channel()
            .await
            .map_err(|e| BusError::Transport(e.to_string()))
            .into_report()?;

        channel
            .exchange_declare(
                DIRECT_EXCHANGE,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::Transport(e.to_string()))
            .into_report()?;

        channel
            .exchange_declare(
                TOPIC_EXCHANGE,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::Transport(e.to_string()))
            .into_report()?;

        Ok(channel)
    }

    async fn connect_with_retry(&self) -> BusResult<Connection> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match Connection::connect(&self.state.url, ConnectionProperties::default()).await {
                Ok(conn) => return Ok(conn),
                Err(e) if attempt < MAX_CONNECTION_ATTEMPTS => {
                    warn!(
                        attempt,
                        max = MAX_CONNECTION_ATTEMPTS,
                        error = %e,
                        "AMQP connection attempt failed, retrying"
                    );
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
                Err(e) => {
                    error!(attempt, error = %e, "AMQP connection exhausted retries");
                    return Err(BusError::Transport(e.to_string())).into_report();
                }
            }
        }
    }

    async fn publish_raw(&self, routing_key: &str, to_topic: bool, envelope: &Envelope) -> BusResult<()> {
        let channel = self.open_channel().await?;
        let exchange = if to_topic { TOPIC_EXCHANGE } else { DIRECT_EXCHANGE };
        let body = envelope.encode();

        channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                body.as_bytes(),
                BasicProperties::default()
                    .with_content_type("application/json".into())
                    .with_delivery_mode(2),
            )
            .await
            .map_err(|e| BusError::Transport(e.to_string()))
            .into_report()?
            .await
            .map_err(|e| BusError::Transport(e.to_string()))
            .into_report()?;

        self.state.metrics.record_send();
        Ok(())
    }

    async fn drain_reconnect_buffer(&self) {
        let mut buffer = self.state.reconnect_buffer.lock().await;
        while let Some((key, is_topic, envelope)) = buffer.pop_front() {
            if let Err(e) = self.publish_raw(&key, is_topic, &envelope).await {
                warn!(error = %e, "failed to drain buffered publish, requeueing");
                buffer.push_front((key, is_topic, envelope));
                break;
            }
        }
    }

    async fn spawn_consumer(&self, queue: String, exchange: &'static str, handler: Handler) -> BusResult<CancellationToken> {
        let channel = self.open_channel().await?;
        channel
            .queue_declare(
                &queue,
                QueueDeclareOptions {
                    durable: false,
                    exclusive: true,
                    auto_delete: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::Transport(e.to_string()))
            .into_report()?;

        channel
            .queue_bind(
                &queue,
                exchange,
                &queue,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::Transport(e.to_string()))
            .into_report()?;

        let mut consumer = channel
            .basic_consume(
                &queue,
                &format!("{queue}-consumer"),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::Transport(e.to_string()))
            .into_report()?;

        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let metrics = Arc::clone(&self.state.metrics);

        tokio::spawn(async move {
            loop {
                let delivery = tokio::select! {
                    biased;
                    _ = task_cancel.cancelled() => break,
                    next = consumer.next() => next,
                };
                let Some(delivery) = delivery else { break };
                let Ok(delivery) = delivery else {
                    metrics.record_receive_error();
                    continue;
                };
                match std::str::from_utf8(&delivery.data)
                    .map_err(|e| e.to_string())
                    .and_then(|text| Envelope::decode(text).map_err(|e| e.to_string()))
                {
                    Ok(envelope) => {
                        metrics.record_receive();
                        handler(envelope).await;
                        let _ = delivery.ack(BasicAckOptions::default()).await;
                    }
                    Err(e) => {
                        metrics.record_receive_error();
                        warn!(error = %e, "dropping undecodable AMQP delivery");
                        let _ = delivery.ack(BasicAckOptions::default()).await;
                    }
                }
            }
        });

        Ok(cancel)
    }
}

#[async_trait]
impl MessageBus for AmqpBus {
    async fn connect(&self) -> BusResult<()> {
        let conn = self.connect_with_retry().await?;
        *self.state.connection.lock().await = Some(conn);
        self.state.connected.store(true, Ordering::Release);
        info!(url = %self.state.url, "connected to AMQP broker");
        self.drain_reconnect_buffer().await;
        Ok(())
    }

    async fn publish(&self, envelope: Envelope) -> BusResult<()> {
        let (routing_key, is_topic) = match envelope.destination() {
            Destination::Direct(agent_id) => (agent_id, false),
            Destination::Topic(topic) => (topic, true),
        };

        if !self.state.connected.load(Ordering::Acquire) {
            let mut buffer = self.state.reconnect_buffer.lock().await;
            if buffer.len() >= self.state.reconnect_buffer_limit {
                return Err(BusError::BackpressureExceeded {
                    pending: buffer.len(),
                    limit: self.state.reconnect_buffer_limit,
                })
                .into_report();
            }
            buffer.push_back((routing_key, is_topic, envelope));
            return Ok(());
        }

        self.publish_raw(&routing_key, is_topic, &envelope).await
    }

    async fn subscribe_agent(&self, agent_id: &str, handler: Handler) -> BusResult<()> {
        let cancel = self
            .spawn_consumer(agent_id.to_string(), DIRECT_EXCHANGE, handler)
            .await?;
        self.state
            .agent_cancels
            .lock()
            .await
            .insert(agent_id.to_string(), cancel);
        Ok(())
    }

    async fn subscribe_topic(&self, topic: &str, handler: Handler) -> BusResult<()> {
        let queue = format!("{topic}.{}", uuid::Uuid::new_v4());
        let cancel = self.spawn_consumer(queue, TOPIC_EXCHANGE, handler).await?;
        self.state
            .topic_cancels
            .lock()
            .await
            .entry(topic.to_string())
            .or_default()
            .push(cancel);
        Ok(())
    }

    async fn unsubscribe_agent(&self, agent_id: &str) -> BusResult<()> {
        if let Some(cancel) = self.state.agent_cancels.lock().await.remove(agent_id) {
            cancel.cancel();
        }
        Ok(())
    }

    async fn unsubscribe_topic(&self, topic: &str) -> BusResult<()> {
        if let Some(cancels) = self.state.topic_cancels.lock().await.remove(topic) {
            for cancel in cancels {
                cancel.cancel();
            }
        }
        Ok(())
    }

    async fn disconnect(&self) -> BusResult<()> {
        self.state.connected.store(false, Ordering::Release);
        for (_, cancel) in self.state.agent_cancels.lock().await.drain() {
            cancel.cancel();
        }
        for (_, cancels) in self.state.topic_cancels.lock().await.drain() {
            for cancel in cancels {
                cancel.cancel();
            }
        }
        if let Some(conn) = self.state.connection.lock().await.take() {
            let _ = conn.close(200, "shutdown").await;
        }
        Ok(())
    }
}
