//! Finds information sources for a query via the `search_web` tool.

use crate::runtime::AgentWorker;
use crate::workers::context::WorkerContext;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use synapse_bus::MessageBus;
use synapse_protocol::{DataType, Envelope, LogLevel, Payload};
use synapse_tools::{CallOptions, ToolClient};
use tracing::info;

const FAILURE_PREFIX: &str = "search_failed";

pub struct SearchWorker {
    ctx: WorkerContext,
}

impl SearchWorker {
    pub fn new(bus: Arc<dyn MessageBus>, tools: Arc<ToolClient>) -> Self {
        Self {
            ctx: WorkerContext::new("search_agent", bus, tools),
        }
    }

    async fn perform_web_search(&self, task_data: Map<String, Value>) {
        let task_id = task_data.get("task_id").and_then(Value::as_str).map(str::to_string);
        let max_results = task_data
            .get("max_results")
            .and_then(Value::as_u64)
            .unwrap_or(5) as usize;

        let Some(query) = task_data.get("query").and_then(Value::as_str).map(str::to_string) else {
            self.ctx
                .send_failure_status(FAILURE_PREFIX, "no search query provided", task_id)
                .await;
            return;
        };

        self.ctx.send_status("searching", Some(10.0), task_id.clone()).await;

        let params = json!({ "query": query });
        match self
            .ctx
            .tools()
            .call("primary_tooling", "search_web", params, CallOptions::new())
            .await
        {
            Ok(result) => {
                let mut results = result.get("results").cloned().unwrap_or_else(|| json!([]));
                if let Value::Array(arr) = &mut results {
                    arr.truncate(max_results);
                }
                let result_count = results.as_array().map(Vec::len).unwrap_or(0);

                self.ctx.send_status("search_complete", Some(100.0), task_id.clone()).await;

                let data = json!({
                    "query": query,
                    "results": results,
                    "result_count": result_count,
                });
                self.ctx
                    .submit_data(DataType::SearchResults, data, "web_search", task_id)
                    .await;

                info!(query, result_count, "web search completed");
                self.ctx
                    .log(
                        LogLevel::Info,
                        format!("Web search completed: '{query}' -> {result_count} results"),
                    )
                    .await;
            }
            Err(e) => {
                self.ctx
                    .log(LogLevel::Error, format!("Web search failed: '{query}' - {e}"))
                    .await;
                self.ctx
                    .send_failure_status(FAILURE_PREFIX, format!("web search failed for '{query}': {e}"), task_id)
                    .await;
            }
        }
    }
}

#[async_trait]
impl AgentWorker for SearchWorker {
    fn agent_id(&self) -> &str {
        self.ctx.agent_id()
    }

    async fn handle(&self, envelope: Envelope) {
        if let Payload::TaskAssign(task) = envelope.payload() {
            if task.task_type == "web_search" {
                self.perform_web_search(task.task_data.clone()).await;
            }
        }
    }
}
