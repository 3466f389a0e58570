//! In-process [`MessageBus`] implementation.
//!
//! Backs unicast delivery with a `tokio::sync::mpsc` channel per agent id
//! (exactly one handler can ever drain it) and topic fan-out with a
//! `tokio::sync::broadcast` channel per topic (every subscriber gets its
//! own receiver, so one slow handler cannot block another). Each
//! subscription spawns a dispatch task that loops on `recv()` and calls
//! the handler; the task only checks its `CancellationToken` between
//! iterations, so an envelope already pulled off the channel always
//! finishes dispatching before the task exits.

use crate::backpressure::{BusConfig, ChannelKey, LagPolicy};
use crate::error::{BusError, BusResult, IntoBusReport};
use crate::metrics::BusMetrics;
use crate::traits::{Handler, MessageBus};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use synapse_protocol::{Destination, Envelope};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

struct AgentSubscription {
    sender: mpsc::Sender<Envelope>,
    cancel: CancellationToken,
}

struct TopicSubscription {
    sender: broadcast::Sender<Envelope>,
    /// One token per subscriber task currently fanned out to this topic.
    /// `unsubscribe_topic` cancels all of them and drops the topic.
    cancels: Vec<CancellationToken>,
}

/// A [`MessageBus`] that routes entirely within the process, no broker
/// required. Intended for unit/integration tests and for single-binary
/// deployments that don't need cross-process fan-out.
pub struct InMemoryBus {
    config: BusConfig,
    metrics: Arc<BusMetrics>,
    connected: AtomicBool,
    agents: DashMap<String, AgentSubscription>,
    topics: DashMap<String, TopicSubscription>,
}

impl InMemoryBus {
    pub fn new(config: BusConfig) -> Self {
        Self {
            config,
            metrics: Arc::new(BusMetrics::new()),
            connected: AtomicBool::new(false),
            agents: DashMap::new(),
            topics: DashMap::new(),
        }
    }

    /// Access live delivery metrics.
    pub fn metrics(&self) -> &BusMetrics {
        &self.metrics
    }

    fn require_connected(&self) -> BusResult<()> {
        if self.connected.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(BusError::NotConnected).into_report()
        }
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn connect(&self) -> BusResult<()> {
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    async fn publish(&self, envelope: Envelope) -> BusResult<()> {
        self.require_connected()?;

        match envelope.destination() {
            Destination::Direct(agent_id) => {
                let Some(sub) = self.agents.get(&agent_id) else {
                    debug!(agent_id, "publish: no unicast subscriber, dropping");
                    return Ok(());
                };
                match sub.sender.send(envelope).await {
                    Ok(()) => {
                        self.metrics.record_send();
                        Ok(())
                    }
                    Err(e) => {
                        self.metrics.record_send_error();
                        Err(BusError::SendFailed(e.to_string())).into_report()
                    }
                }
            }
            Destination::Topic(topic) => {
                let Some(sub) = self.topics.get(&topic) else {
                    debug!(topic, "publish: no topic subscribers, dropping");
                    return Ok(());
                };
                match sub.sender.send(envelope) {
                    Ok(_receiver_count) => {
                        self.metrics.record_send();
                        Ok(())
                    }
                    Err(e) => {
                        self.metrics.record_send_error();
                        Err(BusError::SendFailed(e.to_string())).into_report()
                    }
                }
            }
        }
    }

    async fn subscribe_agent(&self, agent_id: &str, handler: Handler) -> BusResult<()> {
        self.require_connected()?;

        if self.agents.contains_key(agent_id) {
            return Err(BusError::AlreadySubscribed(agent_id.to_string())).into_report();
        }

        let buffer = self
            .config
            .resolve(&ChannelKey::Agent(agent_id.to_string()))
            .buffer_size();
        let (tx, mut rx) = mpsc::channel::<Envelope>(buffer);
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let metrics = Arc::clone(&self.metrics);

        tokio::spawn(async move {
            loop {
                if task_cancel.is_cancelled() {
                    break;
                }
                let envelope = tokio::select! {
                    biased;
                    _ = task_cancel.cancelled() => break,
                    msg = rx.recv() => msg,
                };
                match envelope {
                    Some(envelope) => {
                        metrics.record_receive();
                        handler(envelope).await;
                    }
                    None => break,
                }
            }
        });

        self.agents.insert(
            agent_id.to_string(),
            AgentSubscription { sender: tx, cancel },
        );
        Ok(())
    }

    async fn subscribe_topic(&self, topic: &str, handler: Handler) -> BusResult<()> {
        self.require_connected()?;

        let buffer = self
            .config
            .resolve(&ChannelKey::Topic(topic.to_string()))
            .buffer_size();
        let lag_policy = self
            .config
            .resolve(&ChannelKey::Topic(topic.to_string()))
            .lag_policy()
            .clone();

        let sender = match self.topics.get(topic) {
            Some(existing) => existing.sender.clone(),
            None => broadcast::channel(buffer).0,
        };

        let mut rx = sender.subscribe();
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let metrics = Arc::clone(&self.metrics);
        let topic_name = topic.to_string();

        tokio::spawn(async move {
            loop {
                let recv = tokio::select! {
                    biased;
                    _ = task_cancel.cancelled() => break,
                    msg = rx.recv() => msg,
                };
                match recv {
                    Ok(envelope) => {
                        metrics.record_receive();
                        handler(envelope).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        metrics.record_lag(missed);
                        match lag_policy {
                            LagPolicy::Error => {
                                warn!(topic = %topic_name, missed, "subscriber lagged, stopping");
                                break;
                            }
                            LagPolicy::SkipAndContinue => {
                                warn!(topic = %topic_name, missed, "subscriber lagged, skipping");
                                continue;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        self.topics
            .entry(topic.to_string())
            .and_modify(|existing| existing.cancels.push(cancel.clone()))
            .or_insert_with(|| TopicSubscription {
                sender,
                cancels: vec![cancel],
            });
        Ok(())
    }

    async fn unsubscribe_agent(&self, agent_id: &str) -> BusResult<()> {
        if let Some((_, sub)) = self.agents.remove(agent_id) {
            sub.cancel.cancel();
        }
        Ok(())
    }

    async fn unsubscribe_topic(&self, topic: &str) -> BusResult<()> {
        if let Some((_, sub)) = self.topics.remove(topic) {
            for cancel in sub.cancels {
                cancel.cancel();
            }
        }
        Ok(())
    }

    async fn disconnect(&self) -> BusResult<()> {
        self.connected.store(false, Ordering::Release);
        for entry in self.agents.iter() {
            entry.cancel.cancel();
        }
        for entry in self.topics.iter() {
            for cancel in &entry.cancels {
                cancel.cancel();
            }
        }
        self.agents.clear();
        self.topics.clear();
        Ok(())
    }
}
