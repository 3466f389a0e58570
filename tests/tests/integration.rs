//! End-to-end scenarios (S1-S6) exercising the orchestrator, the real
//! worker agents, and the filesystem authority together over an
//! in-memory bus.

use axum::response::sse::{Event, Sse};
use axum::routing::post;
use axum::{Json, Router};
use futures::stream;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use synapse_agent::{AgentRuntime, ExtractionWorker, FileSaveWorker};
use synapse_bus::{Handler, InMemoryBus, MessageBus};
use synapse_orchestrator::OrchestratorWorker;
use synapse_protocol::{DataType, Destination, Envelope, LogBroadcast, LogLevel, Payload, TaskAssign};
use synapse_testing::scripted_agent::{data, status, ScriptedAgent};
use synapse_testing::spawn_filesystem;
use synapse_tools::ToolClient;
use tokio::net::TcpListener;

async fn new_bus() -> Arc<dyn MessageBus> {
    let bus: Arc<dyn MessageBus> = Arc::new(InMemoryBus::default());
    bus.connect().await.unwrap();
    bus
}

fn recorder() -> (Handler, Arc<Mutex<Vec<Envelope>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&log);
    let handler: Handler = Arc::new(move |env: Envelope| {
        captured.lock().unwrap().push(env);
        Box::pin(async {})
    });
    (handler, log)
}

fn task_assigns(envelopes: &[Envelope], task_type: &str) -> Vec<Envelope> {
    envelopes
        .iter()
        .filter(|e| matches!(e.payload(), Payload::TaskAssign(t) if t.task_type == task_type))
        .cloned()
        .collect()
}

#[tokio::test]
async fn s1_happy_path_runs_search_through_save() {
    let bus = new_bus().await;

    let search_runtime = AgentRuntime::new(
        ScriptedAgent::new("search_agent", Arc::clone(&bus), |_| {
            vec![data(
                DataType::SearchResults,
                json!({ "results": [{"url": "u1"}, {"url": "u2"}, {"url": "u3"}] }),
            )]
        }),
        Arc::clone(&bus),
    );
    let extraction_runtime = AgentRuntime::new(
        ScriptedAgent::new("extraction_agent", Arc::clone(&bus), |task_data| {
            let url = task_data.get("url").and_then(Value::as_str).unwrap_or_default().to_string();
            vec![data(DataType::ExtractedContent, json!({ "url": url, "word_count": 100, "extraction_successful": true }))]
        }),
        Arc::clone(&bus),
    );
    let synthesis_runtime = AgentRuntime::new(
        ScriptedAgent::new("synthesis_agent", Arc::clone(&bus), |_| {
            vec![data(DataType::SynthesisReport, json!({ "report_content": "R", "word_count": 1 }))]
        }),
        Arc::clone(&bus),
    );
    let (file_save_handler, file_save_log) = recorder();
    bus.subscribe_agent("file_save_agent", file_save_handler).await.unwrap();

    search_runtime.start().await.unwrap();
    extraction_runtime.start().await.unwrap();
    synthesis_runtime.start().await.unwrap();

    let orchestrator_runtime = AgentRuntime::new(OrchestratorWorker::new(Arc::clone(&bus)), Arc::clone(&bus));
    orchestrator_runtime.start().await.unwrap();
    orchestrator_runtime.worker().start_research("Q").await;

    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(task_assigns(&search_runtime.worker().received(), "web_search").len(), 1);
    assert_eq!(task_assigns(&extraction_runtime.worker().received(), "extract_content").len(), 3);
    assert_eq!(task_assigns(&synthesis_runtime.worker().received(), "synthesize_research").len(), 1);

    let saves = task_assigns(&file_save_log.lock().unwrap(), "save_file");
    assert_eq!(saves.len(), 1);
    let Payload::TaskAssign(save) = saves[0].payload() else { unreachable!() };
    let file_path = save.task_data.get("file_path").and_then(Value::as_str).unwrap();
    assert!(file_path.starts_with("output/reports/research_report_"));
    assert_eq!(save.task_data.get("content").unwrap(), "R");
}

#[tokio::test]
async fn s2_search_failure_retries_once_then_proceeds() {
    tokio::time::pause();
    let bus = new_bus().await;

    let attempt = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let search_runtime = AgentRuntime::new(
        ScriptedAgent::new("search_agent", Arc::clone(&bus), move |_| {
            let n = attempt.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if n == 0 {
                vec![status("search_failed: backend unavailable")]
            } else {
                vec![data(DataType::SearchResults, json!({ "results": [{"url": "u1"}] }))]
            }
        }),
        Arc::clone(&bus),
    );
    search_runtime.start().await.unwrap();

    let orchestrator_runtime = AgentRuntime::new(OrchestratorWorker::new(Arc::clone(&bus)), Arc::clone(&bus));
    orchestrator_runtime.start().await.unwrap();
    orchestrator_runtime.worker().start_research("Q").await;

    tokio::task::yield_now().await;
    tokio::task::yield_now().await;
    assert_eq!(task_assigns(&search_runtime.worker().received(), "web_search").len(), 1);

    tokio::time::advance(Duration::from_secs(6)).await;
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;

    assert_eq!(task_assigns(&search_runtime.worker().received(), "web_search").len(), 2);
}

#[tokio::test]
async fn s3_extraction_shortfall_never_dispatches_synthesis() {
    let bus = new_bus().await;

    let search_runtime = AgentRuntime::new(
        ScriptedAgent::new("search_agent", Arc::clone(&bus), |_| {
            vec![data(DataType::SearchResults, json!({ "results": [{"url": "u1"}, {"url": "u2"}, {"url": "u3"}] }))]
        }),
        Arc::clone(&bus),
    );
    let extraction_runtime = AgentRuntime::new(
        ScriptedAgent::new("extraction_agent", Arc::clone(&bus), |task_data| {
            let url = task_data.get("url").and_then(Value::as_str).unwrap_or_default().to_string();
            if url == "u1" {
                vec![data(DataType::ExtractedContent, json!({ "url": url, "word_count": 50, "extraction_successful": true }))]
            } else {
                vec![data(DataType::ExtractedContent, json!({ "url": url, "extraction_successful": false, "error_message": "timeout" }))]
            }
        }),
        Arc::clone(&bus),
    );
    let (synthesis_handler, synthesis_log) = recorder();
    bus.subscribe_agent("synthesis_agent", synthesis_handler).await.unwrap();
    let (file_save_handler, file_save_log) = recorder();
    bus.subscribe_agent("file_save_agent", file_save_handler).await.unwrap();

    search_runtime.start().await.unwrap();
    extraction_runtime.start().await.unwrap();

    let orchestrator_runtime = AgentRuntime::new(OrchestratorWorker::new(Arc::clone(&bus)), Arc::clone(&bus));
    orchestrator_runtime.start().await.unwrap();
    orchestrator_runtime.worker().start_research("Q").await;

    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(task_assigns(&synthesis_log.lock().unwrap(), "synthesize_research").is_empty());
    assert!(task_assigns(&file_save_log.lock().unwrap(), "save_file").is_empty());
}

#[tokio::test]
async fn s4_filesystem_authority_rejects_traversal() {
    let dir = tempfile::tempdir().unwrap();
    let fs_url = spawn_filesystem(dir.path().join("output")).await;

    let bus = new_bus().await;
    let mut servers = HashMap::new();
    servers.insert("filesystem".to_string(), fs_url);
    let tools = Arc::new(ToolClient::new(servers));

    let (orchestrator_handler, orchestrator_log) = recorder();
    bus.subscribe_agent("orchestrator", orchestrator_handler).await.unwrap();
    let (logs_handler, logs_log) = recorder();
    bus.subscribe_topic("logs", logs_handler).await.unwrap();

    let file_save = AgentRuntime::new(FileSaveWorker::new(Arc::clone(&bus), tools), Arc::clone(&bus));
    file_save.start().await.unwrap();

    let mut task_data = serde_json::Map::new();
    task_data.insert("file_path".into(), json!("/etc/passwd"));
    task_data.insert("content".into(), json!("owned"));
    let env = Envelope::build(
        "test_driver",
        Destination::Direct("file_save_agent".to_string()),
        TaskAssign::new("save_file", task_data),
    )
    .unwrap();
    bus.publish(env).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;

    let statuses = orchestrator_log.lock().unwrap();
    let failed = statuses
        .iter()
        .any(|e| matches!(e.payload(), Payload::StatusUpdate(s) if s.status.contains("file_save_failed")));
    assert!(failed, "expected a file_save_failed status update");

    let logs = logs_log.lock().unwrap();
    let error_logged = logs
        .iter()
        .any(|e| matches!(e.payload(), Payload::LogBroadcast(l) if l.level == LogLevel::Error));
    assert!(error_logged, "expected an ERROR log broadcast");

    assert!(!dir.path().join("output").join("passwd").exists());
}

#[tokio::test]
async fn s5_topic_fan_out_does_not_block_on_a_slow_subscriber() {
    let bus = new_bus().await;

    let fast_seen = Arc::new(Mutex::new(None::<Instant>));
    let fast_seen_clone = Arc::clone(&fast_seen);
    let fast: Handler = Arc::new(move |_env: Envelope| {
        let fast_seen = Arc::clone(&fast_seen_clone);
        Box::pin(async move {
            *fast_seen.lock().unwrap() = Some(Instant::now());
        })
    });
    let slow: Handler = Arc::new(|_env: Envelope| {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
        })
    });

    bus.subscribe_topic("logs", fast).await.unwrap();
    bus.subscribe_topic("logs", slow).await.unwrap();

    let published_at = Instant::now();
    let env = Envelope::build(
        "test_driver",
        Destination::Topic("logs".to_string()),
        LogBroadcast::new(LogLevel::Info, "hello"),
    )
    .unwrap();
    bus.publish(env).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;

    let seen = fast_seen.lock().unwrap().expect("fast subscriber should have observed the broadcast");
    assert!(seen.duration_since(published_at) < Duration::from_millis(100));
}

#[tokio::test]
async fn s6_streamed_extraction_progress_arrives_in_order_then_one_submit() {
    async fn browse_and_extract() -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
        let steps = [10, 30, 60, 80, 100];
        let mut events: Vec<Result<Event, Infallible>> = steps
            .iter()
            .map(|p| {
                Ok(Event::default()
                    .event("progress")
                    .data(json!({ "message": "working", "percentage": p, "phase": "download" }).to_string()))
            })
            .collect();
        events.push(Ok(Event::default()
            .event("result")
            .data(json!({ "url": "u1", "title": "t", "content": "c", "word_count": 5 }).to_string())));
        Sse::new(stream::iter(events))
    }
    let router = Router::new().route("/tools/browse_and_extract", post(browse_and_extract));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

    let bus = new_bus().await;
    let mut servers = HashMap::new();
    servers.insert("primary_tooling".to_string(), format!("http://{addr}"));
    let tools = Arc::new(ToolClient::new(servers));

    let (orchestrator_handler, orchestrator_log) = recorder();
    bus.subscribe_agent("orchestrator", orchestrator_handler).await.unwrap();

    let extraction = AgentRuntime::new(ExtractionWorker::new(Arc::clone(&bus), tools), Arc::clone(&bus));
    extraction.start().await.unwrap();

    let mut task_data = serde_json::Map::new();
    task_data.insert("url".into(), json!("u1"));
    task_data.insert("task_id".into(), json!("t1"));
    let env = Envelope::build(
        "test_driver",
        Destination::Direct("extraction_agent".to_string()),
        TaskAssign::new("extract_content", task_data),
    )
    .unwrap();
    bus.publish(env).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;

    let received = orchestrator_log.lock().unwrap();
    let mut percentages = Vec::new();
    let mut submit_count = 0;
    let mut submit_index = None;
    for (i, env) in received.iter().enumerate() {
        match env.payload() {
            Payload::StatusUpdate(s) => {
                if let Some(p) = s.progress {
                    percentages.push(p);
                }
            }
            Payload::DataSubmit(d) if d.data_type == DataType::ExtractedContent => {
                submit_count += 1;
                submit_index = Some(i);
            }
            _ => {}
        }
    }

    let mut sorted = percentages.clone();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert_eq!(percentages, sorted, "progress percentages must arrive non-decreasing");
    assert_eq!(submit_count, 1, "extraction submits exactly one DataSubmit");
    assert_eq!(submit_index, Some(received.len() - 1), "the submit arrives after every progress update");
}
