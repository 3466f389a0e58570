//! Errors surfaced by a tool call.

use error_stack::Report;
use thiserror::Error;

pub type ToolResult<T> = ::std::result::Result<T, Report<ToolError>>;

pub trait IntoToolReport<T> {
    fn into_report(self) -> ToolResult<T>;
}

impl<T> IntoToolReport<T> for ::std::result::Result<T, ToolError> {
    #[inline]
    fn into_report(self) -> ToolResult<T> {
        self.map_err(Report::new)
    }
}

/// A failed tool invocation. The `kind` names come directly from the
/// contract in `MessageBus`'s sibling client; callers branch on the
/// variant rather than parsing `Display` output.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ToolError {
    /// `server_name` has no entry in the client's server map. Failed
    /// before any network work was attempted.
    #[error("unknown tool server: {0}")]
    UnknownServer(String),

    /// Unary call returned a non-2xx HTTP status.
    #[error("remote tool call failed with status {status}: {body}")]
    RemoteFailure { status: u16, body: String },

    /// Streaming call emitted an `error` SSE event before a `result`.
    #[error("remote tool reported an error: {details}")]
    RemoteError { details: String },

    /// The SSE stream closed without a terminal `result` or `error` event.
    #[error("tool stream ended without a result or error event")]
    TruncatedStream,

    /// The call's deadline elapsed before completion; the underlying
    /// request was cancelled.
    #[error("tool call exceeded its deadline")]
    DeadlineExceeded,

    /// Transport-level failure (connection refused, DNS, TLS, I/O).
    #[error("transport error: {0}")]
    Transport(String),

    /// A response body failed to parse as JSON.
    #[error("invalid response body: {0}")]
    InvalidResponse(String),
}
