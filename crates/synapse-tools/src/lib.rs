//! HTTP client for invoking remote tool servers.
//!
//! A [`ToolClient`] resolves a server name to a base URL, then calls
//! `<base>/tools/<tool_name>` either as a single JSON request/response or
//! as a server-sent-events progress stream terminating in one `result` or
//! `error` event. See [`client::ToolClient::call`].

mod client;
mod error;
mod sse;

pub use client::{CallOptions, ProgressHandler, ToolClient};
pub use error::{IntoToolReport, ToolError, ToolResult};
