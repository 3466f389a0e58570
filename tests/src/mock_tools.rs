//! Mock tool servers that stand in for the `primary_tooling` and
//! `filesystem` HTTP services during integration tests. Shapes mirror
//! the real endpoints documented in the core's external interfaces.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;

/// What `browse_and_extract` should report for a given URL.
#[derive(Clone)]
pub enum ExtractionOutcome {
    Success { title: String, content: String, word_count: u64 },
    Failure { message: String },
}

#[derive(Clone)]
struct PrimaryState {
    search_results: Arc<Vec<Value>>,
    extraction: Arc<HashMap<String, ExtractionOutcome>>,
}

/// Spawns a mock `primary_tooling` server: `search_web` always returns
/// `search_results`; `browse_and_extract` streams progress then a
/// `result`/`error` event per `extraction`, keyed by requested URL.
/// Returns the server's base URL.
pub async fn spawn_primary_tooling(search_results: Vec<Value>, extraction: HashMap<String, ExtractionOutcome>) -> String {
    let state = PrimaryState {
        search_results: Arc::new(search_results),
        extraction: Arc::new(extraction),
    };

    let router = Router::new()
        .route("/health", get(health))
        .route("/tools/search_web", post(search_web))
        .route("/tools/browse_and_extract", post(browse_and_extract))
        .with_state(state);

    spawn(router).await
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy", "service": "primary_tooling" }))
}

async fn search_web(State(state): State<PrimaryState>, Json(_params): Json<Value>) -> Json<Value> {
    Json(json!({ "results": state.search_results.as_ref(), "query_processed": "" }))
}

async fn browse_and_extract(
    State(state): State<PrimaryState>,
    Json(params): Json<Value>,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let url = params.get("url").and_then(Value::as_str).unwrap_or_default().to_string();

    let events: Vec<Result<Event, Infallible>> = match state.extraction.get(&url) {
        Some(ExtractionOutcome::Success { title, content, word_count }) => vec![
            Ok(progress_event("connecting", 10, "connection")),
            Ok(progress_event("downloading", 60, "download")),
            Ok(progress_event("parsing", 100, "parse")),
            Ok(Event::default().event("result").data(
                json!({ "url": url, "title": title, "content": content, "word_count": word_count }).to_string(),
            )),
        ],
        Some(ExtractionOutcome::Failure { message }) => vec![
            Ok(progress_event("connecting", 10, "connection")),
            Ok(Event::default()
                .event("error")
                .data(json!({ "error": "extraction_failed", "message": message }).to_string())),
        ],
        None => vec![Ok(Event::default()
            .event("error")
            .data(json!({ "error": "not_configured", "message": format!("no outcome configured for {url}") }).to_string()))],
    };

    Sse::new(stream::iter(events))
}

fn progress_event(message: &str, percentage: u32, phase: &str) -> Event {
    Event::default()
        .event("progress")
        .data(json!({ "message": message, "percentage": percentage, "phase": phase }).to_string())
}

/// Spawns a mock `primary_tooling` server whose `search_web` fails (HTTP
/// 500) on its first `fail_calls` invocations before returning
/// `search_results` — exercises the orchestrator's bounded search retry.
pub async fn spawn_flaky_primary_tooling(fail_calls: usize, search_results: Vec<Value>) -> String {
    let calls = Arc::new(AtomicUsize::new(0));
    let results = Arc::new(search_results);

    let router = Router::new().route("/health", get(health)).route(
        "/tools/search_web",
        post(move |Json(_params): Json<Value>| {
            let calls = Arc::clone(&calls);
            let results = Arc::clone(&results);
            async move {
                let attempt = calls.fetch_add(1, Ordering::SeqCst);
                flaky_response(attempt, fail_calls, &results)
            }
        }),
    );

    spawn(router).await
}

fn flaky_response(attempt: usize, fail_calls: usize, results: &[Value]) -> Response {
    if attempt < fail_calls {
        (StatusCode::INTERNAL_SERVER_ERROR, "search backend unavailable").into_response()
    } else {
        Json(json!({ "results": results, "query_processed": "" })).into_response()
    }
}

/// Spawns the real filesystem-authority router rooted at `root`, for
/// tests that need genuine path-allow-list enforcement over HTTP.
pub async fn spawn_filesystem(root: PathBuf) -> String {
    let canonical = synapse_fsauth::path::canonicalize_root(&root).expect("prepare allow-list root");
    let router = synapse_fsauth::server::router(synapse_fsauth::AppState::new(vec![canonical]));
    spawn(router).await
}

async fn spawn(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}
