//! Central log aggregation and monitoring agent. Subscribes to the `logs`
//! topic, keeps a bounded history, tracks per-component activity, and
//! raises a system alert when errors spike.

use crate::runtime::AgentWorker;
use crate::workers::context::WorkerContext;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use synapse_bus::MessageBus;
use synapse_protocol::{DataType, Envelope, LogLevel, Payload};
use synapse_tools::ToolClient;
use tracing::{debug, info, warn};

const BUFFER_CAPACITY: usize = 1000;
const RECENT_WINDOW: usize = 10;
const ERROR_SPIKE_THRESHOLD: usize = 3;

fn is_error_level(level: LogLevel) -> bool {
    matches!(level, LogLevel::Error | LogLevel::Critical)
}

#[derive(Clone, serde::Serialize)]
struct LogEntry {
    timestamp: String,
    level: LogLevel,
    message: String,
    component: Option<String>,
    correlation_id: Option<String>,
    sender_id: String,
}

#[derive(Clone, serde::Serialize, Default)]
struct AgentActivity {
    first_seen: String,
    last_activity: String,
    message_count: u64,
    error_count: u64,
}

#[derive(Clone, serde::Serialize, Default)]
struct AgentStatus {
    status: String,
    progress: Option<f64>,
    task_id: Option<String>,
    last_update: String,
}

struct LoggerState {
    log_buffer: VecDeque<LogEntry>,
    agent_status: std::collections::HashMap<String, AgentStatus>,
    agent_activity: std::collections::HashMap<String, AgentActivity>,
    log_count_by_level: std::collections::HashMap<&'static str, u64>,
    filter_level: LogLevel,
    /// Set once the current error spike has been reported, so the
    /// periodic tick alerts at most once per spike; cleared once the
    /// window drops back below the threshold.
    alert_active: bool,
}

impl Default for LoggerState {
    fn default() -> Self {
        let mut log_count_by_level = std::collections::HashMap::new();
        for level in ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"] {
            log_count_by_level.insert(level, 0);
        }
        Self {
            log_buffer: VecDeque::with_capacity(BUFFER_CAPACITY),
            agent_status: std::collections::HashMap::new(),
            agent_activity: std::collections::HashMap::new(),
            log_count_by_level,
            filter_level: LogLevel::Info,
            alert_active: false,
        }
    }
}

pub struct LogSinkWorker {
    ctx: WorkerContext,
    state: Mutex<LoggerState>,
    message_count: AtomicUsize,
}

impl LogSinkWorker {
    pub fn new(bus: Arc<dyn MessageBus>, tools: Arc<ToolClient>) -> Self {
        Self {
            ctx: WorkerContext::new("logger_agent", bus, tools),
            state: Mutex::new(LoggerState::default()),
            message_count: AtomicUsize::new(0),
        }
    }

    fn should_log_level(filter: LogLevel, level: LogLevel) -> bool {
        level >= filter
    }

    async fn handle_log_broadcast(&self, sender_id: &str, level: LogLevel, message: &str, component: Option<&str>) {
        let timestamp = Utc::now().to_rfc3339();
        let entry = LogEntry {
            timestamp: timestamp.clone(),
            level,
            message: message.to_string(),
            component: component.map(str::to_string),
            correlation_id: None,
            sender_id: sender_id.to_string(),
        };

        let filter_level;
        {
            let mut state = self.state.lock().expect("logger state poisoned");
            if state.log_buffer.len() == BUFFER_CAPACITY {
                state.log_buffer.pop_front();
            }
            state.log_buffer.push_back(entry.clone());

            let level_key = match level {
                LogLevel::Debug => "DEBUG",
                LogLevel::Info => "INFO",
                LogLevel::Warning => "WARNING",
                LogLevel::Error => "ERROR",
                LogLevel::Critical => "CRITICAL",
            };
            *state.log_count_by_level.entry(level_key).or_insert(0) += 1;

            if let Some(component) = component {
                let activity = state.agent_activity.entry(component.to_string()).or_insert_with(|| AgentActivity {
                    first_seen: timestamp.clone(),
                    last_activity: timestamp.clone(),
                    message_count: 0,
                    error_count: 0,
                });
                activity.last_activity = timestamp.clone();
                activity.message_count += 1;
                if is_error_level(level) {
                    activity.error_count += 1;
                }
            }

            filter_level = state.filter_level;
        }

        if Self::should_log_level(filter_level, level) {
            debug!(component = component.unwrap_or("?"), message, "log broadcast received");
        }
    }

    /// Checks the last [`RECENT_WINDOW`] buffered entries for an error
    /// spike and emits a `system_alert` once per spike, per §4.5.6 — not
    /// once per offending broadcast.
    async fn check_error_spike(&self) {
        let alert_entries = {
            let mut state = self.state.lock().expect("logger state poisoned");
            let recent_errors: Vec<LogEntry> =
                state.log_buffer.iter().rev().take(RECENT_WINDOW).filter(|e| is_error_level(e.level)).cloned().collect();

            if recent_errors.len() >= ERROR_SPIKE_THRESHOLD {
                if state.alert_active {
                    None
                } else {
                    state.alert_active = true;
                    Some(recent_errors)
                }
            } else {
                state.alert_active = false;
                None
            }
        };

        let Some(recent_errors) = alert_entries else { return };
        let error_count = recent_errors.len();
        warn!(error_count, "high error rate detected");

        let entries: Vec<Value> = recent_errors
            .iter()
            .map(|e| {
                json!({
                    "timestamp": e.timestamp,
                    "level": e.level,
                    "message": e.message,
                    "component": e.component,
                    "sender_id": e.sender_id,
                })
            })
            .collect();

        let alert_data = json!({
            "alert_type": "high_error_rate",
            "recent_errors": entries,
            "error_count": error_count,
            "timestamp": Utc::now().to_rfc3339(),
        });
        self.ctx.submit_data(DataType::SystemAlert, alert_data, "logger_agent", None).await;
    }

    async fn handle_status_update(&self, sender_id: &str, status: &str, progress: Option<f64>, task_id: Option<String>) {
        let timestamp = Utc::now().to_rfc3339();
        {
            let mut state = self.state.lock().expect("logger state poisoned");
            state.agent_status.insert(
                sender_id.to_string(),
                AgentStatus {
                    status: status.to_string(),
                    progress,
                    task_id: task_id.clone(),
                    last_update: timestamp,
                },
            );
        }

        let status_msg = match progress {
            Some(p) => format!("Status update from {sender_id}: {status} ({p:.1}%)"),
            None => format!("Status update from {sender_id}: {status}"),
        };
        debug!("{status_msg}");
    }

    async fn generate_summary_report(&self) -> Value {
        let state = self.state.lock().expect("logger state poisoned");
        let agents_with_errors = state.agent_activity.values().filter(|a| a.error_count > 0).count();
        json!({
            "report_type": "summary",
            "timestamp": Utc::now().to_rfc3339(),
            "total_messages": self.message_count.load(Ordering::Acquire),
            "total_logs": state.log_buffer.len(),
            "log_counts_by_level": state.log_count_by_level,
            "active_agents": state.agent_activity.len(),
            "agents_with_errors": agents_with_errors,
        })
    }

    async fn generate_detailed_report(&self) -> Value {
        let summary = self.generate_summary_report().await;
        let state = self.state.lock().expect("logger state poisoned");
        let recent_logs: Vec<Value> = state
            .log_buffer
            .iter()
            .rev()
            .take(50)
            .map(|e| {
                json!({
                    "timestamp": e.timestamp,
                    "level": e.level,
                    "message": e.message,
                    "component": e.component,
                    "sender_id": e.sender_id,
                })
            })
            .collect();
        let agent_status = serde_json::to_value(&state.agent_status).unwrap_or_else(|_| json!({}));
        json!({
            "report_type": "detailed",
            "timestamp": Utc::now().to_rfc3339(),
            "summary": summary,
            "recent_logs": recent_logs,
            "agent_status": agent_status,
        })
    }

    async fn generate_agent_activity_report(&self) -> Value {
        let state = self.state.lock().expect("logger state poisoned");
        let agent_activity = serde_json::to_value(&state.agent_activity).unwrap_or_else(|_| json!({}));
        let agent_status = serde_json::to_value(&state.agent_status).unwrap_or_else(|_| json!({}));
        json!({
            "report_type": "agent_activity",
            "timestamp": Utc::now().to_rfc3339(),
            "agent_activity": agent_activity,
            "agent_status": agent_status,
        })
    }

    async fn handle_task_assignment(&self, task_type: &str, task_data: Map<String, Value>) {
        match task_type {
            "generate_report" => {
                let report_type = task_data.get("report_type").and_then(Value::as_str).unwrap_or("summary");
                let report = match report_type {
                    "summary" => self.generate_summary_report().await,
                    "detailed" => self.generate_detailed_report().await,
                    "agent_activity" => self.generate_agent_activity_report().await,
                    other => json!({ "error": format!("Unknown report type: {other}") }),
                };
                self.ctx.submit_data(DataType::LogReport, report, "logger_agent", None).await;
                info!(report_type, "log report generated");
            }
            "set_log_level" => {
                let new_level = task_data.get("level").and_then(Value::as_str).unwrap_or("INFO").to_uppercase();
                let parsed = match new_level.as_str() {
                    "DEBUG" => Some(LogLevel::Debug),
                    "INFO" => Some(LogLevel::Info),
                    "WARNING" => Some(LogLevel::Warning),
                    "ERROR" => Some(LogLevel::Error),
                    "CRITICAL" => Some(LogLevel::Critical),
                    _ => None,
                };
                match parsed {
                    Some(level) => {
                        let mut state = self.state.lock().expect("logger state poisoned");
                        state.filter_level = level;
                        info!(new_level, "log filter level changed");
                    }
                    None => warn!(new_level, "invalid log level requested"),
                }
            }
            "get_agent_status" => {
                let status_report = {
                    let state = self.state.lock().expect("logger state poisoned");
                    let agent_status = serde_json::to_value(&state.agent_status).unwrap_or_else(|_| json!({}));
                    json!({
                        "timestamp": Utc::now().to_rfc3339(),
                        "agent_status": agent_status,
                        "message_count": self.message_count.load(Ordering::Acquire),
                        "log_buffer_size": state.log_buffer.len(),
                        "filter_level": format!("{:?}", state.filter_level),
                    })
                };
                self.ctx.submit_data(DataType::LoggerStatus, status_report, "logger_agent", None).await;
            }
            other => warn!(task_type = other, "unknown logger task type"),
        }
    }
}

#[async_trait]
impl AgentWorker for LogSinkWorker {
    fn agent_id(&self) -> &str {
        self.ctx.agent_id()
    }

    fn topics(&self) -> Vec<String> {
        vec!["logs".to_string()]
    }

    async fn tick(&self) {
        self.check_error_spike().await;
    }

    async fn handle(&self, envelope: Envelope) {
        self.message_count.fetch_add(1, Ordering::AcqRel);
        let sender_id = envelope.sender_id().to_string();

        match envelope.payload() {
            Payload::LogBroadcast(log) => {
                self.handle_log_broadcast(&sender_id, log.level, &log.message, log.component.as_deref()).await;
            }
            Payload::StatusUpdate(status) => {
                self.handle_status_update(&sender_id, &status.status, status.progress, status.task_id.clone()).await;
            }
            Payload::TaskAssign(task) => {
                self.handle_task_assignment(&task.task_type, task.task_data.clone()).await;
            }
            _ => {}
        }
    }
}
