//! The tool-invocation client: unary JSON calls and SSE-streamed calls
//! against a fixed map of named remote tool servers.

use crate::error::{IntoToolReport, ToolError, ToolResult};
use crate::sse::{next_event, ToolEvent};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Invoked synchronously, in arrival order, once per `progress` SSE event.
pub type ProgressHandler = Box<dyn FnMut(Value) + Send>;

/// Per-call knobs. Defaults to unary mode, no progress handler, no deadline.
#[derive(Default)]
pub struct CallOptions {
    stream: bool,
    progress_handler: Option<ProgressHandler>,
    deadline: Option<Duration>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch to server-sent-events streaming mode.
    pub fn streaming(mut self, handler: ProgressHandler) -> Self {
        self.stream = true;
        self.progress_handler = Some(handler);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Invokes tools on remote HTTP servers named at construction time.
///
/// Holds one `reqwest::Client`, hence one connection pool, shared by every
/// call this instance makes — workers share a `ToolClient` rather than
/// building their own.
pub struct ToolClient {
    http: reqwest::Client,
    servers: HashMap<String, String>,
}

impl ToolClient {
    /// `servers` maps a server name (e.g. `"primary_tooling"`) to its base
    /// URL (no trailing slash required).
    pub fn new(servers: HashMap<String, String>) -> Self {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .expect("reqwest client builds with static configuration");
        Self { http, servers }
    }

    /// Invoke `tool_name` on `server_name` with `params`, per `opts`.
    pub async fn call(
        &self,
        server_name: &str,
        tool_name: &str,
        params: Value,
        opts: CallOptions,
    ) -> ToolResult<Value> {
        let base = self
            .servers
            .get(server_name)
            .ok_or_else(|| ToolError::UnknownServer(server_name.to_string()))
            .into_report()?;
        let url = format!("{base}/tools/{tool_name}");

        let CallOptions {
            stream,
            progress_handler,
            deadline,
        } = opts;

        let call = async {
            if stream {
                self.call_streaming(&url, params, progress_handler).await
            } else {
                self.call_unary(&url, params).await
            }
        };

        match deadline {
            Some(d) => match tokio::time::timeout(d, call).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(server_name, tool_name, "tool call exceeded deadline");
                    Err(ToolError::DeadlineExceeded).into_report()
                }
            },
            None => call.await,
        }
    }

    async fn call_unary(&self, url: &str, params: Value) -> ToolResult<Value> {
        let resp = self
            .http
            .post(url)
            .json(&params)
            .send()
            .await
            .map_err(|e| ToolError::Transport(e.to_string()))
            .into_report()?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ToolError::RemoteFailure {
                status: status.as_u16(),
                body,
            })
            .into_report();
        }

        resp.json::<Value>()
            .await
            .map_err(|e| ToolError::InvalidResponse(e.to_string()))
            .into_report()
    }

    async fn call_streaming(
        &self,
        url: &str,
        params: Value,
        mut progress_handler: Option<ProgressHandler>,
    ) -> ToolResult<Value> {
        let mut resp = self
            .http
            .post(url)
            .json(&params)
            .send()
            .await
            .map_err(|e| ToolError::Transport(e.to_string()))
            .into_report()?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ToolError::RemoteFailure {
                status: status.as_u16(),
                body,
            })
            .into_report();
        }

        let mut buf = String::new();
        loop {
            match next_event(&mut resp, &mut buf).await {
                Some(Ok(ToolEvent::Progress(value))) => {
                    if let Some(handler) = progress_handler.as_mut() {
                        handler(value);
                    }
                }
                Some(Ok(ToolEvent::Result(value))) => return Ok(value),
                Some(Ok(ToolEvent::Error(value))) => {
                    let details = value
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("remote tool reported an error")
                        .to_string();
                    return Err(ToolError::RemoteError { details }).into_report();
                }
                Some(Err(e)) => return Err(e).into_report(),
                None => {
                    debug!(url, "tool stream closed without a terminal event");
                    return Err(ToolError::TruncatedStream).into_report();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::response::sse::{Event, Sse};
    use axum::routing::post;
    use axum::{Json, Router};
    use futures::stream;
    use std::convert::Infallible;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    async fn spawn(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client_for(name: &str, base: String) -> ToolClient {
        let mut servers = HashMap::new();
        servers.insert(name.to_string(), base);
        ToolClient::new(servers)
    }

    #[tokio::test]
    async fn unary_call_round_trips_json() {
        let router = Router::new().route(
            "/tools/search_web",
            post(|Json(body): Json<Value>| async move {
                Json(serde_json::json!({"echo": body}))
            }),
        );
        let base = spawn(router).await;
        let client = client_for("primary_tooling", base);

        let result = client
            .call(
                "primary_tooling",
                "search_web",
                serde_json::json!({"query": "rust"}),
                CallOptions::new(),
            )
            .await
            .unwrap();
        assert_eq!(result["echo"]["query"], "rust");
    }

    #[tokio::test]
    async fn unary_call_surfaces_non_2xx_as_remote_failure() {
        let router = Router::new().route(
            "/tools/search_web",
            post(|| async { (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let base = spawn(router).await;
        let client = client_for("primary_tooling", base);

        let err = client
            .call(
                "primary_tooling",
                "search_web",
                serde_json::json!({}),
                CallOptions::new(),
            )
            .await
            .unwrap_err();
        match err.current_context() {
            ToolError::RemoteFailure { status, .. } => assert_eq!(*status, 500),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_server_fails_before_any_network_work() {
        let client = ToolClient::new(HashMap::new());
        let err = client
            .call("nope", "search_web", serde_json::json!({}), CallOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err.current_context(), ToolError::UnknownServer(_)));
    }

    #[tokio::test]
    async fn streaming_call_delivers_progress_then_result() {
        async fn handler(
            State(_): State<()>,
        ) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
            let events = vec![
                Ok(Event::default().event("progress").data(r#"{"percentage":50}"#)),
                Ok(Event::default().event("result").data(r#"{"url":"u","content":"c"}"#)),
            ];
            Sse::new(stream::iter(events))
        }
        let router = Router::new()
            .route("/tools/browse_and_extract", post(handler))
            .with_state(());
        let base = spawn(router).await;
        let client = client_for("primary_tooling", base);

        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_clone = std::sync::Arc::clone(&seen);
        let opts = CallOptions::new().streaming(Box::new(move |v| {
            seen_clone.lock().unwrap().push(v);
        }));

        let result = client
            .call(
                "primary_tooling",
                "browse_and_extract",
                serde_json::json!({"url": "http://example.com"}),
                opts,
            )
            .await
            .unwrap();

        assert_eq!(result["url"], "u");
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn streaming_call_surfaces_error_event() {
        async fn handler() -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
            let events = vec![Ok(Event::default()
                .event("error")
                .data(r#"{"message":"extraction failed"}"#))];
            Sse::new(stream::iter(events))
        }
        let router = Router::new().route("/tools/browse_and_extract", post(handler));
        let base = spawn(router).await;
        let client = client_for("primary_tooling", base);

        let err = client
            .call(
                "primary_tooling",
                "browse_and_extract",
                serde_json::json!({}),
                CallOptions::new().streaming(Box::new(|_| {})),
            )
            .await
            .unwrap_err();
        assert!(matches!(err.current_context(), ToolError::RemoteError { .. }));
    }

    #[tokio::test]
    async fn deadline_elapses_before_slow_response() {
        async fn handler() -> Json<Value> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Json(serde_json::json!({}))
        }
        let router = Router::new().route("/tools/search_web", post(handler));
        let base = spawn(router).await;
        let client = client_for("primary_tooling", base);

        let err = client
            .call(
                "primary_tooling",
                "search_web",
                serde_json::json!({}),
                CallOptions::new().with_deadline(Duration::from_millis(20)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err.current_context(), ToolError::DeadlineExceeded));
    }
}
