//! Worker-agent runtime: the lifecycle wrapper ([`AgentRuntime`]) that
//! turns a [`AgentWorker`] into a running bus subscriber, and the six
//! concrete workers that make up the research pipeline.

mod error;
mod runtime;
mod text_improve;
mod workers;

pub use error::{AgentError, AgentResult, IntoAgentReport};
pub use runtime::{AgentRuntime, AgentWorker};
pub use text_improve::{improve_text, LexicalImprover, TextImprover};
pub use workers::{
    ExtractionWorker, FactCheckWorker, FileSaveWorker, LogSinkWorker, SearchWorker, SynthesisWorker, WorkerContext,
};
