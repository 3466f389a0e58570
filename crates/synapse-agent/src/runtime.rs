//! The lifecycle wrapper every worker agent runs inside: wires a worker's
//! `handle`/`tick` into bus subscriptions and a periodic loop.

use crate::error::{AgentError, AgentResult, IntoAgentReport};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use synapse_bus::{Handler, MessageBus};
use synapse_protocol::{Destination, Envelope, Payload, ProtocolResult};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// The capability set a concrete worker supplies; [`AgentRuntime`] supplies
/// everything lifecycle-related around it.
#[async_trait]
pub trait AgentWorker: Send + Sync + 'static {
    /// Unique unicast address this worker subscribes under.
    fn agent_id(&self) -> &str;

    /// Topics this worker additionally subscribes to. Most workers answer
    /// only unicast task assignments and return an empty list.
    fn topics(&self) -> Vec<String> {
        Vec::new()
    }

    /// Process one envelope. Multiple invocations may be in flight
    /// concurrently; the worker owns its own mutable-state discipline.
    async fn handle(&self, envelope: Envelope);

    /// Called once per second while the runtime is running. Optional.
    async fn tick(&self) {}
}

/// Runs an [`AgentWorker`]: subscribes its handler, drives its periodic
/// tick, and tears both down cleanly on [`stop`](Self::stop).
pub struct AgentRuntime<W: AgentWorker> {
    worker: Arc<W>,
    bus: Arc<dyn MessageBus>,
    topics: Vec<String>,
    in_flight: Arc<AtomicUsize>,
    tick_cancel: CancellationToken,
    tick_task: Mutex<Option<JoinHandle<()>>>,
    stop_grace: Duration,
    started: AtomicBool,
}

impl<W: AgentWorker> AgentRuntime<W> {
    pub fn new(worker: W, bus: Arc<dyn MessageBus>) -> Self {
        let topics = worker.topics();
        Self {
            worker: Arc::new(worker),
            bus,
            topics,
            in_flight: Arc::new(AtomicUsize::new(0)),
            tick_cancel: CancellationToken::new(),
            tick_task: Mutex::new(None),
            stop_grace: Duration::from_secs(5),
            started: AtomicBool::new(false),
        }
    }

    /// Override the grace period `stop()` waits for in-flight `handle`
    /// calls before returning regardless. Defaults to 5s per the
    /// recommended cancellation grace.
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn worker(&self) -> &W {
        &self.worker
    }

    /// Opens subscriptions and launches the periodic loop.
    pub async fn start(&self) -> AgentResult<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(AgentError::AlreadyStarted).into_report();
        }

        let handler = self.dispatch_handler();

        self.bus
            .subscribe_agent(self.worker.agent_id(), Arc::clone(&handler))
            .await
            .map_err(|e| AgentError::Bus(e.to_string()))
            .into_report()?;

        for topic in &self.topics {
            self.bus
                .subscribe_topic(topic, Arc::clone(&handler))
                .await
                .map_err(|e| AgentError::Bus(e.to_string()))
                .into_report()?;
        }

        let worker = Arc::clone(&self.worker);
        let cancel = self.tick_cancel.clone();
        let agent_id = self.worker.agent_id().to_string();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        worker.tick().await;
                    }
                }
            }
            debug!(agent_id, "periodic loop stopped");
        });
        *self.tick_task.lock().await = Some(task);

        Ok(())
    }

    fn dispatch_handler(&self) -> Handler {
        let worker = Arc::clone(&self.worker);
        let in_flight = Arc::clone(&self.in_flight);
        Arc::new(move |envelope: Envelope| {
            let worker = Arc::clone(&worker);
            let in_flight = Arc::clone(&in_flight);
            Box::pin(async move {
                in_flight.fetch_add(1, Ordering::AcqRel);
                worker.handle(envelope).await;
                in_flight.fetch_sub(1, Ordering::AcqRel);
            })
        })
    }

    /// Cancels the periodic loop, unsubscribes, and waits (bounded) for
    /// any `handle` invocations already in flight.
    pub async fn stop(&self) -> AgentResult<()> {
        if !self.started.swap(false, Ordering::AcqRel) {
            return Err(AgentError::NotStarted).into_report();
        }

        self.tick_cancel.cancel();
        if let Some(task) = self.tick_task.lock().await.take() {
            let _ = task.await;
        }

        self.bus
            .unsubscribe_agent(self.worker.agent_id())
            .await
            .map_err(|e| AgentError::Bus(e.to_string()))
            .into_report()?;
        for topic in &self.topics {
            self.bus
                .unsubscribe_topic(topic)
                .await
                .map_err(|e| AgentError::Bus(e.to_string()))
                .into_report()?;
        }

        let deadline = tokio::time::Instant::now() + self.stop_grace;
        while self.in_flight.load(Ordering::Acquire) > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        if self.in_flight.load(Ordering::Acquire) > 0 {
            warn!(agent_id = self.worker.agent_id(), "stop() grace elapsed with handlers still in flight");
        }

        Ok(())
    }

    /// Thin pass-through to bus publish.
    pub async fn send(&self, envelope: Envelope) -> AgentResult<()> {
        self.bus
            .publish(envelope)
            .await
            .map_err(|e| AgentError::Bus(e.to_string()))
            .into_report()
    }

    /// Builds an envelope from this worker, enforcing the destination-xor
    /// rule via [`Envelope::build`].
    pub fn make_envelope(&self, dest: Destination, payload: impl Into<Payload>) -> ProtocolResult<Envelope> {
        Envelope::build(self.worker.agent_id().to_string(), dest, payload)
    }
}
