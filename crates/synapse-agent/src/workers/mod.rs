//! The six research-pipeline worker agents and the plumbing they share.

pub mod context;
pub mod extraction;
pub mod fact_check;
pub mod file_save;
pub mod log_sink;
pub mod search;
pub mod synthesis;

pub use context::WorkerContext;
pub use extraction::ExtractionWorker;
pub use fact_check::FactCheckWorker;
pub use file_save::FileSaveWorker;
pub use log_sink::LogSinkWorker;
pub use search::SearchWorker;
pub use synthesis::SynthesisWorker;
