//! Errors surfaced by the orchestrator's own plumbing (not by workflow
//! outcomes, which are recorded as state and observed over the bus).

use error_stack::Report;
use thiserror::Error;

pub type OrchestratorResult<T> = ::std::result::Result<T, Report<OrchestratorError>>;

pub trait IntoOrchestratorReport<T> {
    fn into_report(self) -> OrchestratorResult<T>;
}

impl<T> IntoOrchestratorReport<T> for ::std::result::Result<T, OrchestratorError> {
    #[inline]
    fn into_report(self) -> OrchestratorResult<T> {
        self.map_err(Report::new)
    }
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("bus operation failed: {0}")]
    Bus(String),
}
