//! A bus-connected stand-in for a worker agent: configured with a script
//! mapping an incoming task's data to canned replies, and keeping a
//! record of every envelope it receives. The bus-level analogue of
//! `MockTool`'s stubbed-result-plus-call-history shape.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};
use synapse_agent::{AgentWorker, WorkerContext};
use synapse_bus::MessageBus;
use synapse_protocol::{DataType, Envelope, Payload};
use synapse_tools::ToolClient;

/// One canned reply a [`ScriptedAgent`] sends back for a received task.
pub enum ScriptedReply {
    Data(DataType, Value),
    Status(String),
}

pub fn data(data_type: DataType, value: Value) -> ScriptedReply {
    ScriptedReply::Data(data_type, value)
}

pub fn status(status: impl Into<String>) -> ScriptedReply {
    ScriptedReply::Status(status.into())
}

type Script = Box<dyn Fn(&Map<String, Value>) -> Vec<ScriptedReply> + Send + Sync>;

pub struct ScriptedAgent {
    ctx: WorkerContext,
    script: Script,
    received: Mutex<Vec<Envelope>>,
}

impl ScriptedAgent {
    pub fn new(
        agent_id: impl Into<String>,
        bus: Arc<dyn MessageBus>,
        script: impl Fn(&Map<String, Value>) -> Vec<ScriptedReply> + Send + Sync + 'static,
    ) -> Self {
        Self {
            ctx: WorkerContext::new(agent_id, bus, Arc::new(ToolClient::new(Default::default()))),
            script: Box::new(script),
            received: Mutex::new(Vec::new()),
        }
    }

    /// Every envelope handed to this agent so far, in arrival order.
    pub fn received(&self) -> Vec<Envelope> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentWorker for ScriptedAgent {
    fn agent_id(&self) -> &str {
        self.ctx.agent_id()
    }

    async fn handle(&self, envelope: Envelope) {
        self.received.lock().unwrap().push(envelope.clone());

        let Payload::TaskAssign(task) = envelope.payload() else { return };
        let task_id = task.task_data.get("task_id").and_then(Value::as_str).map(str::to_string);

        for reply in (self.script)(&task.task_data) {
            match reply {
                ScriptedReply::Data(data_type, value) => {
                    self.ctx.submit_data(data_type, value, self.ctx.agent_id().to_string(), task_id.clone()).await
                }
                ScriptedReply::Status(status) => self.ctx.send_status(status, None, task_id.clone()).await,
            }
        }
    }
}
