//! Extracts content from a URL via the streaming `browse_and_extract` tool,
//! forwarding each progress event to the orchestrator as it arrives.

use crate::runtime::AgentWorker;
use crate::workers::context::WorkerContext;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use synapse_bus::MessageBus;
use synapse_protocol::{DataType, Envelope, LogLevel, Payload};
use synapse_tools::{CallOptions, ProgressHandler, ToolClient};
use tokio::sync::mpsc;
use tracing::info;

const FAILURE_PREFIX: &str = "extraction_failed";

pub struct ExtractionWorker {
    ctx: WorkerContext,
}

impl ExtractionWorker {
    pub fn new(bus: Arc<dyn MessageBus>, tools: Arc<ToolClient>) -> Self {
        Self {
            ctx: WorkerContext::new("extraction_agent", bus, tools),
        }
    }

    async fn extract_content_from_url(&self, task_data: Map<String, Value>) {
        let task_id = task_data.get("task_id").and_then(Value::as_str).map(str::to_string);
        let source_description = task_data
            .get("source_description")
            .and_then(Value::as_str)
            .unwrap_or("unknown_source")
            .to_string();

        let Some(url) = task_data.get("url").and_then(Value::as_str).map(str::to_string) else {
            self.ctx
                .send_failure_status(FAILURE_PREFIX, "no URL provided for extraction", task_id)
                .await;
            return;
        };

        self.ctx
            .send_status("extraction_starting", Some(5.0), task_id.clone())
            .await;

        let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
        let progress_handler: ProgressHandler = Box::new(move |value| {
            let _ = tx.send(value);
        });

        let call = self.ctx.tools().call(
            "primary_tooling",
            "browse_and_extract",
            json!({ "url": url }),
            CallOptions::new().streaming(progress_handler),
        );

        let drain = async {
            while let Some(progress) = rx.recv().await {
                let percentage = progress.get("percentage").and_then(Value::as_f64);
                let phase = progress.get("phase").and_then(Value::as_str).unwrap_or("unknown");
                let message = progress.get("message").and_then(Value::as_str).unwrap_or("Processing...");
                self.ctx
                    .send_status(format!("extracting_{phase}: {message}"), percentage, task_id.clone())
                    .await;
            }
        };

        let (result, ()) = tokio::join!(call, drain);

        match result {
            Ok(result) => {
                let extracted_url = result.get("url").and_then(Value::as_str).unwrap_or(&url).to_string();
                let title = result
                    .get("title")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Content from {url}"));
                let content = result.get("content").and_then(Value::as_str).unwrap_or("").to_string();
                let word_count = result.get("word_count").and_then(Value::as_u64).unwrap_or(0);

                self.ctx
                    .send_status("extraction_complete", Some(100.0), task_id.clone())
                    .await;

                let data = json!({
                    "url": extracted_url,
                    "title": title,
                    "content": content,
                    "word_count": word_count,
                    "source_description": source_description,
                    "extraction_successful": true,
                });
                self.ctx
                    .submit_data(DataType::ExtractedContent, data, url.clone(), task_id)
                    .await;

                info!(url, word_count, "content extraction completed");
                self.ctx
                    .log(LogLevel::Info, format!("Content extraction complete: {url} ({word_count} words)"))
                    .await;
            }
            Err(e) => {
                let error_msg = format!("failed to extract content from {url}: {e}");
                self.ctx
                    .send_failure_status(FAILURE_PREFIX, &error_msg, task_id.clone())
                    .await;

                let data = json!({
                    "url": url,
                    "title": format!("Failed extraction from {url}"),
                    "content": "",
                    "word_count": 0,
                    "source_description": source_description,
                    "extraction_successful": false,
                    "error_message": error_msg,
                });
                self.ctx
                    .submit_data(DataType::ExtractedContent, data, url.clone(), task_id)
                    .await;

                self.ctx
                    .log(LogLevel::Error, format!("Content extraction failed: {url} - {error_msg}"))
                    .await;
            }
        }
    }
}

#[async_trait]
impl AgentWorker for ExtractionWorker {
    fn agent_id(&self) -> &str {
        self.ctx.agent_id()
    }

    async fn handle(&self, envelope: Envelope) {
        if let Payload::TaskAssign(task) = envelope.payload() {
            if task.task_type == "extract_content" {
                self.extract_content_from_url(task.task_data.clone()).await;
            }
        }
    }
}
