//! Server-sent-events parsing for the streaming tool-call mode.
//!
//! Mirrors the line-buffering approach used for LLM provider streaming
//! elsewhere in this workspace: pull raw bytes off the response as they
//! arrive, split complete lines out of an accumulating buffer, and
//! interpret `event:`/`data:` pairs one at a time. Unlike an LLM token
//! stream this protocol only has three event names and always
//! terminates in exactly one of two of them.

use crate::error::ToolError;
use serde_json::Value;

/// One parsed SSE frame relevant to a tool call.
pub(crate) enum ToolEvent {
    Progress(Value),
    Result(Value),
    Error(Value),
}

/// Pull SSE frames out of `resp` one at a time, in arrival order. Returns
/// `None` once the stream closes (whether or not a terminal frame was
/// seen — callers distinguish a clean end from a [`ToolError::TruncatedStream`]
/// by checking whether they ever received a `Result`/`Error`).
pub(crate) async fn next_event(
    resp: &mut reqwest::Response,
    buf: &mut String,
) -> Option<Result<ToolEvent, ToolError>> {
    let mut event_type = String::new();

    loop {
        if let Some(newline_pos) = buf.find('\n') {
            let line = buf[..newline_pos].trim_end_matches('\r').to_string();
            *buf = buf[newline_pos + 1..].to_string();

            if line.is_empty() {
                continue;
            }

            if let Some(rest) = line.strip_prefix("event:") {
                event_type = rest.trim().to_string();
                continue;
            }

            if let Some(json_str) = line.strip_prefix("data:") {
                let json_str = json_str.trim();
                let value: Value = match serde_json::from_str(json_str) {
                    Ok(v) => v,
                    Err(e) => return Some(Err(ToolError::InvalidResponse(e.to_string()))),
                };
                return Some(Ok(match event_type.as_str() {
                    "progress" => ToolEvent::Progress(value),
                    "result" => ToolEvent::Result(value),
                    "error" => ToolEvent::Error(value),
                    other => {
                        return Some(Err(ToolError::InvalidResponse(format!(
                            "unexpected SSE event type: {other}"
                        ))));
                    }
                }));
            }

            continue;
        }

        match resp.chunk().await {
            Ok(Some(bytes)) => buf.push_str(&String::from_utf8_lossy(&bytes)),
            Ok(None) => return None,
            Err(e) => return Some(Err(ToolError::Transport(e.to_string()))),
        }
    }
}
