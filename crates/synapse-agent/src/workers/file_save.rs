//! Saves generated content to disk through the filesystem authority,
//! validating the destination path before ever attempting a write.

use crate::runtime::AgentWorker;
use crate::workers::context::WorkerContext;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use synapse_bus::MessageBus;
use synapse_protocol::{DataType, Envelope, LogLevel, Payload};
use synapse_tools::{CallOptions, ToolClient};
use tracing::{debug, info, warn};

const FAILURE_PREFIX: &str = "file_save_failed";

pub struct FileSaveWorker {
    ctx: WorkerContext,
}

impl FileSaveWorker {
    pub fn new(bus: Arc<dyn MessageBus>, tools: Arc<ToolClient>) -> Self {
        Self {
            ctx: WorkerContext::new("file_save_agent", bus, tools),
        }
    }

    async fn validate_file_path(&self, file_path: &str) -> Value {
        match self
            .ctx
            .tools()
            .call("filesystem", "validate_path", json!({ "path": file_path }), CallOptions::new())
            .await
        {
            Ok(result) => result,
            Err(e) => {
                warn!(file_path, error = %e, "path validation failed");
                json!({ "is_allowed": false, "error": e.to_string() })
            }
        }
    }

    async fn save_file_securely(&self, task_data: Map<String, Value>) {
        let task_id = task_data.get("task_id").and_then(Value::as_str).map(str::to_string);
        let content = task_data.get("content").and_then(Value::as_str).unwrap_or("").to_string();

        let Some(file_path) = task_data.get("file_path").and_then(Value::as_str).map(str::to_string) else {
            self.ctx
                .send_failure_status(FAILURE_PREFIX, "No file path provided for save operation", task_id)
                .await;
            return;
        };

        if content.is_empty() {
            warn!(file_path, "empty content provided for save");
        }

        info!(file_path, "starting secure file save");
        self.ctx.send_status("file_save_starting", Some(10.0), task_id.clone()).await;
        self.ctx.send_status("validating_path", Some(25.0), task_id.clone()).await;

        let validation = self.validate_file_path(&file_path).await;
        if !validation.get("is_allowed").and_then(Value::as_bool).unwrap_or(false) {
            let error_msg = format!("File path not allowed by filesystem authority: {file_path}");
            warn!(file_path, "path rejected by filesystem authority");
            self.ctx.send_failure_status(FAILURE_PREFIX, error_msg, task_id).await;
            return;
        }

        info!(file_path, "path validation successful");
        self.ctx.send_status("preparing_file_save", Some(50.0), task_id.clone()).await;

        debug!(file_path, "calling save_file tool");
        let params = json!({ "file_path": file_path, "content": content });
        match self.ctx.tools().call("filesystem", "save_file", params, CallOptions::new()).await {
            Ok(result) => {
                let success = result.get("success").and_then(Value::as_bool).unwrap_or(false);
                let bytes_written = result.get("bytes_written").and_then(Value::as_u64).unwrap_or(0);
                let saved_path = result
                    .get("file_path")
                    .and_then(Value::as_str)
                    .unwrap_or(&file_path)
                    .to_string();

                if success {
                    info!(saved_path, bytes_written, "file saved successfully");
                    self.ctx.send_status("file_save_complete", Some(100.0), task_id.clone()).await;

                    let data = json!({
                        "file_path": saved_path,
                        "bytes_written": bytes_written,
                        "content_length": content.len(),
                        "save_successful": true,
                    });
                    self.ctx.submit_data(DataType::FileSaveResult, data, "filesystem", task_id).await;

                    self.ctx
                        .log(LogLevel::Info, format!("File saved successfully: {saved_path} ({bytes_written} bytes)"))
                        .await;
                } else {
                    let error_msg = format!("File save operation failed for {file_path}");
                    warn!(file_path, "save_file tool reported failure");
                    self.ctx.send_failure_status(FAILURE_PREFIX, error_msg, task_id).await;
                }
            }
            Err(e) => {
                let error_msg = format!("file save failed for {file_path}: {e}");
                self.ctx.send_failure_status(FAILURE_PREFIX, &error_msg, task_id).await;
                self.ctx
                    .log(LogLevel::Error, format!("File save failed: {file_path} - {error_msg}"))
                    .await;
            }
        }
    }
}

#[async_trait]
impl AgentWorker for FileSaveWorker {
    fn agent_id(&self) -> &str {
        self.ctx.agent_id()
    }

    async fn handle(&self, envelope: Envelope) {
        if let Payload::TaskAssign(task) = envelope.payload() {
            if task.task_type == "save_file" {
                self.save_file_securely(task.task_data.clone()).await;
            }
        }
    }
}
