//! Payload variants carried by an [`crate::Envelope`].
//!
//! Each variant's shape is fixed by the envelope's `msg_type`; decoding
//! rejects a payload that does not match its declared type.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The closed set of message types an envelope may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    TaskAssign,
    StatusUpdate,
    DataSubmit,
    ValidationRequest,
    ValidationResponse,
    LogBroadcast,
}

/// Discriminator for [`DataSubmit::data_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    SearchResults,
    ExtractedContent,
    FactCheckResults,
    SynthesisReport,
    FileSaveResult,
    SystemAlert,
    LogReport,
    LoggerStatus,
}

/// Severity of a [`LogBroadcast`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAssign {
    pub task_type: String,
    pub task_data: Map<String, Value>,
    pub priority: u8,
}

impl TaskAssign {
    /// Construct a task assignment with the default priority (1, highest).
    pub fn new(task_type: impl Into<String>, task_data: Map<String, Value>) -> Self {
        Self {
            task_type: task_type.into(),
            task_data,
            priority: 1,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    fn validate(&self) -> ProtocolResult<()> {
        if !(1..=5).contains(&self.priority) {
            return Err(ProtocolError::MalformedEnvelope(format!(
                "task_assign priority must be in 1..=5, got {}",
                self.priority
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

impl StatusUpdate {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            progress: None,
            task_id: None,
        }
    }

    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    /// Per the wire convention, a status whose text contains `"failed"`
    /// (case-insensitive) signals worker failure.
    pub fn is_failure(&self) -> bool {
        self.status.to_lowercase().contains("failed")
    }

    fn validate(&self) -> ProtocolResult<()> {
        if let Some(p) = self.progress {
            if !(0.0..=100.0).contains(&p) {
                return Err(ProtocolError::MalformedEnvelope(format!(
                    "status_update progress must be in [0, 100], got {p}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSubmit {
    pub data_type: DataType,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

impl DataSubmit {
    pub fn new(data_type: DataType, data: Value) -> Self {
        Self {
            data_type,
            data,
            source: None,
            task_id: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    fn validate(&self) -> ProtocolResult<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRequest {
    pub claim: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default = "default_validation_type")]
    pub validation_type: String,
}

fn default_validation_type() -> String {
    "fact_check".to_string()
}

impl ValidationRequest {
    pub fn new(claim: impl Into<String>) -> Self {
        Self {
            claim: claim.into(),
            source_url: None,
            validation_type: default_validation_type(),
        }
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    fn validate(&self) -> ProtocolResult<()> {
        if self.claim.trim().is_empty() {
            return Err(ProtocolError::MalformedEnvelope(
                "validation_request claim must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResponse {
    pub is_valid: bool,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl ValidationResponse {
    pub fn new(is_valid: bool, confidence: f64) -> Self {
        Self {
            is_valid,
            confidence,
            evidence: None,
            source: None,
        }
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = Some(evidence.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    fn validate(&self) -> ProtocolResult<()> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(ProtocolError::MalformedEnvelope(format!(
                "validation_response confidence must be in [0, 1], got {}",
                self.confidence
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogBroadcast {
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
}

impl LogBroadcast {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            component: None,
        }
    }

    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    fn validate(&self) -> ProtocolResult<()> {
        Ok(())
    }
}

/// The sealed sum of payload shapes. `msg_type` on the envelope and the
/// active variant here always agree — [`crate::Envelope::build`] and
/// [`crate::Envelope::decode`] are the only constructors and both enforce
/// this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Payload {
    TaskAssign(TaskAssign),
    StatusUpdate(StatusUpdate),
    DataSubmit(DataSubmit),
    ValidationRequest(ValidationRequest),
    ValidationResponse(ValidationResponse),
    LogBroadcast(LogBroadcast),
}

impl Payload {
    pub fn msg_type(&self) -> MessageType {
        match self {
            Payload::TaskAssign(_) => MessageType::TaskAssign,
            Payload::StatusUpdate(_) => MessageType::StatusUpdate,
            Payload::DataSubmit(_) => MessageType::DataSubmit,
            Payload::ValidationRequest(_) => MessageType::ValidationRequest,
            Payload::ValidationResponse(_) => MessageType::ValidationResponse,
            Payload::LogBroadcast(_) => MessageType::LogBroadcast,
        }
    }

    pub(crate) fn validate(&self) -> ProtocolResult<()> {
        match self {
            Payload::TaskAssign(p) => p.validate(),
            Payload::StatusUpdate(p) => p.validate(),
            Payload::DataSubmit(p) => p.validate(),
            Payload::ValidationRequest(p) => p.validate(),
            Payload::ValidationResponse(p) => p.validate(),
            Payload::LogBroadcast(p) => p.validate(),
        }
    }

    /// Serialize the inner struct to a JSON value, for wire encoding.
    pub(crate) fn to_value(&self) -> Value {
        match self {
            Payload::TaskAssign(p) => serde_json::to_value(p),
            Payload::StatusUpdate(p) => serde_json::to_value(p),
            Payload::DataSubmit(p) => serde_json::to_value(p),
            Payload::ValidationRequest(p) => serde_json::to_value(p),
            Payload::ValidationResponse(p) => serde_json::to_value(p),
            Payload::LogBroadcast(p) => serde_json::to_value(p),
        }
        .expect("payload structs always serialize")
    }

    /// Parse `value` into the payload shape declared by `msg_type`.
    pub(crate) fn from_value(msg_type: MessageType, value: Value) -> ProtocolResult<Self> {
        let map_err = |e: serde_json::Error| {
            ProtocolError::MalformedEnvelope(format!("payload does not match {msg_type:?}: {e}"))
        };
        let payload = match msg_type {
            MessageType::TaskAssign => {
                Payload::TaskAssign(serde_json::from_value(value).map_err(map_err)?)
            }
            MessageType::StatusUpdate => {
                Payload::StatusUpdate(serde_json::from_value(value).map_err(map_err)?)
            }
            MessageType::DataSubmit => {
                Payload::DataSubmit(serde_json::from_value(value).map_err(map_err)?)
            }
            MessageType::ValidationRequest => {
                Payload::ValidationRequest(serde_json::from_value(value).map_err(map_err)?)
            }
            MessageType::ValidationResponse => {
                Payload::ValidationResponse(serde_json::from_value(value).map_err(map_err)?)
            }
            MessageType::LogBroadcast => {
                Payload::LogBroadcast(serde_json::from_value(value).map_err(map_err)?)
            }
        };
        payload.validate()?;
        Ok(payload)
    }
}

impl From<TaskAssign> for Payload {
    fn from(p: TaskAssign) -> Self {
        Payload::TaskAssign(p)
    }
}
impl From<StatusUpdate> for Payload {
    fn from(p: StatusUpdate) -> Self {
        Payload::StatusUpdate(p)
    }
}
impl From<DataSubmit> for Payload {
    fn from(p: DataSubmit) -> Self {
        Payload::DataSubmit(p)
    }
}
impl From<ValidationRequest> for Payload {
    fn from(p: ValidationRequest) -> Self {
        Payload::ValidationRequest(p)
    }
}
impl From<ValidationResponse> for Payload {
    fn from(p: ValidationResponse) -> Self {
        Payload::ValidationResponse(p)
    }
}
impl From<LogBroadcast> for Payload {
    fn from(p: LogBroadcast) -> Self {
        Payload::LogBroadcast(p)
    }
}
