//! Fixtures shared by the cross-crate integration tests: mock HTTP tool
//! servers standing in for `primary_tooling` and `filesystem`.

pub mod mock_tools;
pub mod scripted_agent;

pub use mock_tools::{spawn_filesystem, spawn_flaky_primary_tooling, spawn_primary_tooling, ExtractionOutcome};
pub use scripted_agent::{data, status, ScriptedAgent};
