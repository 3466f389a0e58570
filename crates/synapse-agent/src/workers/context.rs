//! Shared plumbing every worker agent uses: a handle to the bus, a
//! tool-client, the orchestrator's address, and the status/log emission
//! every observable transition produces.

use std::sync::Arc;
use synapse_bus::MessageBus;
use synapse_protocol::{DataSubmit, DataType, Destination, Envelope, LogBroadcast, LogLevel, Payload, StatusUpdate};
use synapse_tools::ToolClient;
use tracing::warn;

pub struct WorkerContext {
    agent_id: String,
    bus: Arc<dyn MessageBus>,
    tools: Arc<ToolClient>,
    orchestrator_id: String,
}

impl WorkerContext {
    pub fn new(agent_id: impl Into<String>, bus: Arc<dyn MessageBus>, tools: Arc<ToolClient>) -> Self {
        Self {
            agent_id: agent_id.into(),
            bus,
            tools,
            orchestrator_id: "orchestrator".to_string(),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn tools(&self) -> &ToolClient {
        &self.tools
    }

    pub fn bus(&self) -> &dyn MessageBus {
        self.bus.as_ref()
    }

    /// Emits a `StatusUpdate` to the orchestrator.
    pub async fn send_status(&self, status: impl Into<String>, progress: Option<f64>, task_id: Option<String>) {
        let mut update = StatusUpdate::new(status);
        if let Some(p) = progress {
            update = update.with_progress(p);
        }
        if let Some(t) = task_id {
            update = update.with_task_id(t);
        }
        self.send_to_orchestrator(update).await;
    }

    /// Emits the `"<prefix>_failed: <message>"` status convention every
    /// worker uses to signal failure, at 0% progress.
    pub async fn send_failure_status(&self, prefix: &str, message: impl std::fmt::Display, task_id: Option<String>) {
        self.send_status(format!("{prefix}: {message}"), Some(0.0), task_id).await;
    }

    /// Emits a `DataSubmit` to the orchestrator.
    pub async fn submit_data(
        &self,
        data_type: DataType,
        data: serde_json::Value,
        source: impl Into<String>,
        task_id: Option<String>,
    ) {
        let mut submit = DataSubmit::new(data_type, data).with_source(source);
        if let Some(t) = task_id {
            submit = submit.with_task_id(t);
        }
        self.send_to_orchestrator(submit).await;
    }

    pub async fn send_to_orchestrator(&self, payload: impl Into<Payload>) {
        let orchestrator_id = self.orchestrator_id.clone();
        self.send_direct(&orchestrator_id, payload).await;
    }

    pub async fn send_direct(&self, receiver_id: &str, payload: impl Into<Payload>) {
        match Envelope::build(self.agent_id.clone(), Destination::Direct(receiver_id.to_string()), payload) {
            Ok(envelope) => {
                if let Err(e) = self.bus.publish(envelope).await {
                    warn!(agent_id = %self.agent_id, receiver_id, error = %e, "failed to publish envelope");
                }
            }
            Err(e) => warn!(agent_id = %self.agent_id, error = %e, "failed to build envelope"),
        }
    }

    /// Broadcasts a `LogBroadcast` on the well-known `logs` topic.
    pub async fn log(&self, level: LogLevel, message: impl Into<String>) {
        let payload = LogBroadcast::new(level, message).with_component(self.agent_id.clone());
        match Envelope::build(self.agent_id.clone(), Destination::Topic("logs".to_string()), payload) {
            Ok(envelope) => {
                if let Err(e) = self.bus.publish(envelope).await {
                    warn!(agent_id = %self.agent_id, error = %e, "failed to publish log broadcast");
                }
            }
            Err(e) => warn!(agent_id = %self.agent_id, error = %e, "failed to build log broadcast"),
        }
    }
}
