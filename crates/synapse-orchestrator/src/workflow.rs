//! The workflow state machine: drives the research pipeline's worker
//! agents from a seed query through to a saved report.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use synapse_agent::{AgentWorker, WorkerContext};
use synapse_bus::MessageBus;
use synapse_protocol::{DataType, Envelope, LogLevel, Payload, TaskAssign};
use synapse_tools::ToolClient;
use tokio::sync::Mutex;
use tracing::{info, warn};

const MAX_EXTRACTIONS: usize = 3;
const SEARCH_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Default)]
struct WorkflowState {
    task_id: Option<String>,
    query: String,
    search_results: Vec<Value>,
    extracted_content: Vec<Value>,
    successful_extractions: usize,
    synthesis_dispatched: bool,
    file_save_dispatched: bool,
    search_retry_used: bool,
    started_at: Option<chrono::DateTime<Utc>>,
}

impl WorkflowState {
    fn reset(&mut self, task_id: String, query: String) {
        *self = WorkflowState {
            task_id: Some(task_id),
            query,
            started_at: Some(Utc::now()),
            ..WorkflowState::default()
        };
    }
}

/// Coordinates the six research-pipeline workers into a single pass over a
/// query: search, fan out extraction, synthesize once enough content has
/// arrived, save the report, and announce completion.
pub struct OrchestratorWorker {
    ctx: WorkerContext,
    state: Mutex<WorkflowState>,
}

impl OrchestratorWorker {
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self {
            ctx: WorkerContext::new("orchestrator", bus, Arc::new(ToolClient::new(Default::default()))),
            state: Mutex::new(WorkflowState::default()),
        }
    }

    fn generate_task_id() -> String {
        uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
    }

    /// Starts a fresh workflow for `query`: resets the workflow record and
    /// dispatches the initial search task.
    pub async fn start_research(&self, query: impl Into<String>) {
        let query = query.into();
        let task_id = Self::generate_task_id();

        {
            let mut state = self.state.lock().await;
            state.reset(task_id.clone(), query.clone());
        }

        self.ctx
            .log(LogLevel::Info, format!("Workflow {task_id} started for query: {query}"))
            .await;

        self.dispatch_search(&query, &task_id).await;
    }

    async fn dispatch_search(&self, query: &str, task_id: &str) {
        let mut task_data = Map::new();
        task_data.insert("query".into(), json!(query));
        task_data.insert("task_id".into(), json!(task_id));
        task_data.insert("max_results".into(), json!(5));

        self.ctx.send_direct("search_agent", TaskAssign::new("web_search", task_data)).await;
    }

    async fn handle_search_results(&self, data: &Value, task_id: Option<String>) {
        let results = data.get("results").and_then(Value::as_array).cloned().unwrap_or_default();

        {
            let mut state = self.state.lock().await;
            state.search_results.extend(results.clone());
        }

        let targets: Vec<(usize, String)> = results
            .iter()
            .take(MAX_EXTRACTIONS)
            .enumerate()
            .filter_map(|(i, r)| {
                let url = r.get("url").and_then(Value::as_str)?;
                if url.is_empty() {
                    return None;
                }
                Some((i, url.to_string()))
            })
            .collect();

        let dispatches = targets.into_iter().map(|(i, url)| {
            let task_id = task_id.clone();
            async move {
                let mut task_data = Map::new();
                task_data.insert("url".into(), json!(url));
                task_data.insert("source_description".into(), json!(format!("source_{i}")));
                if let Some(t) = task_id {
                    task_data.insert("task_id".into(), json!(t));
                }
                self.ctx.send_direct("extraction_agent", TaskAssign::new("extract_content", task_data)).await;
            }
        });
        futures::future::join_all(dispatches).await;
    }

    async fn handle_extracted_content(&self, data: &Value, task_id: Option<String>) {
        // Every extraction attempt is recorded, successful or not, since
        // synthesis still needs failures for its source analysis — but
        // only successful extractions count toward the dispatch threshold
        // (an unsuccessful extraction must not count toward "enough
        // content to synthesize").
        let successful = data.get("extraction_successful").and_then(Value::as_bool).unwrap_or(true);
        let should_synthesize = {
            let mut state = self.state.lock().await;
            state.extracted_content.push(data.clone());
            if successful {
                state.successful_extractions += 1;
            }
            state.successful_extractions == 2 && !state.synthesis_dispatched
        };

        if should_synthesize {
            {
                let mut state = self.state.lock().await;
                state.synthesis_dispatched = true;
            }
            self.dispatch_synthesis(task_id).await;
        }
    }

    async fn dispatch_synthesis(&self, task_id: Option<String>) {
        let (query, search_results, extracted_content) = {
            let state = self.state.lock().await;
            (state.query.clone(), state.search_results.clone(), state.extracted_content.clone())
        };

        let mut task_data = Map::new();
        task_data.insert("query".into(), json!(query));
        task_data.insert("search_results".into(), json!(search_results));
        task_data.insert("extracted_content".into(), json!(extracted_content));
        if let Some(t) = task_id {
            task_data.insert("task_id".into(), json!(t));
        }

        self.ctx.send_direct("synthesis_agent", TaskAssign::new("synthesize_research", task_data)).await;
    }

    async fn handle_synthesis_report(&self, data: &Value, task_id: Option<String>) {
        let already_dispatched = {
            let mut state = self.state.lock().await;
            let already = state.file_save_dispatched;
            state.file_save_dispatched = true;
            already
        };
        if already_dispatched {
            return;
        }

        let report_content = data.get("report_content").and_then(Value::as_str).unwrap_or_default();
        let word_count = data.get("word_count").and_then(Value::as_u64).unwrap_or(0);
        let file_path = format!("output/reports/research_report_{}.md", Utc::now().format("%Y%m%d_%H%M%S"));

        let mut task_data = Map::new();
        task_data.insert("file_path".into(), json!(file_path));
        task_data.insert("content".into(), json!(report_content));
        if let Some(t) = task_id {
            task_data.insert("task_id".into(), json!(t));
        }
        self.ctx.send_direct("file_save_agent", TaskAssign::new("save_file", task_data)).await;

        let (sources, duration_secs) = {
            let state = self.state.lock().await;
            let duration = state.started_at.map(|s| (Utc::now() - s).num_seconds()).unwrap_or(0);
            (state.extracted_content.len(), duration)
        };

        self.ctx
            .log(
                LogLevel::Info,
                format!("Workflow complete: {sources} sources, {word_count} words, {duration_secs}s"),
            )
            .await;
    }

    async fn handle_agent_failure(&self, sender_id: &str, status: &str) {
        let should_retry = {
            let mut state = self.state.lock().await;
            let eligible = sender_id.contains("search") && state.search_results.is_empty() && !state.search_retry_used;
            if eligible {
                state.search_retry_used = true;
            }
            eligible
        };

        if !should_retry {
            warn!(sender_id, status, "agent failure, not retried");
            self.ctx.log(LogLevel::Warning, format!("Agent failure from {sender_id}: {status}")).await;
            return;
        }

        let (query, task_id) = {
            let state = self.state.lock().await;
            (state.query.clone(), state.task_id.clone().unwrap_or_default())
        };
        info!(sender_id, "retrying search after failure");
        tokio::time::sleep(SEARCH_RETRY_DELAY).await;
        self.dispatch_search(&query, &task_id).await;
    }
}

#[async_trait]
impl AgentWorker for OrchestratorWorker {
    fn agent_id(&self) -> &str {
        self.ctx.agent_id()
    }

    async fn handle(&self, envelope: Envelope) {
        match envelope.payload() {
            Payload::StatusUpdate(status) => {
                if status.is_failure() {
                    self.handle_agent_failure(envelope.sender_id(), &status.status).await;
                }
            }
            Payload::DataSubmit(submit) => {
                let task_id = submit.task_id.clone();
                match submit.data_type {
                    DataType::SearchResults => self.handle_search_results(&submit.data, task_id).await,
                    DataType::ExtractedContent => self.handle_extracted_content(&submit.data, task_id).await,
                    DataType::SynthesisReport => self.handle_synthesis_report(&submit.data, task_id).await,
                    other => {
                        tracing::debug!(?other, "orchestrator ignoring data submission type");
                    }
                }
            }
            _ => {}
        }
    }
}
