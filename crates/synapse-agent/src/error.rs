//! Errors surfaced by the agent runtime itself (not by worker logic, which
//! reports its own failures as [`synapse_protocol::StatusUpdate`]s).

use error_stack::Report;
use thiserror::Error;

pub type AgentResult<T> = ::std::result::Result<T, Report<AgentError>>;

pub trait IntoAgentReport<T> {
    fn into_report(self) -> AgentResult<T>;
}

impl<T> IntoAgentReport<T> for ::std::result::Result<T, AgentError> {
    #[inline]
    fn into_report(self) -> AgentResult<T> {
        self.map_err(Report::new)
    }
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent runtime already started")]
    AlreadyStarted,

    #[error("agent runtime not started")]
    NotStarted,

    #[error("bus operation failed: {0}")]
    Bus(String),
}
