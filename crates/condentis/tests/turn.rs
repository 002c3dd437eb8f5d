use std::fs;
use std::sync::Arc;
use std::time::Duration;

use condentis::agent::Agent;
use condentis::context::ContextManager;
use condentis::events::{AgentEvent, AgentEventType};
use condentis::models::role::Role;
use condentis::providers::configs::OpenAiProviderConfig;
use condentis::providers::decoder::StreamDecoder;
use condentis::providers::openai::OpenAiProvider;
use condentis::providers::retry::RetryPolicy;
use condentis::token_counter::TokenCounter;
use condentis::tools::default_registry;
use futures::StreamExt;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sse(events: &[String]) -> ResponseTemplate {
    let body: String = events
        .iter()
        .map(|data| format!("data: {}\n\n", data))
        .chain(std::iter::once("data: [DONE]\n\n".to_string()))
        .collect();
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body)
}

fn text_delta(content: &str) -> String {
    json!({"choices": [{"index": 0, "delta": {"content": content}, "finish_reason": null}]})
        .to_string()
}

fn read_file_call(arguments: &str) -> String {
    json!({"choices": [{"index": 0, "delta": {"tool_calls": [{
        "index": 0,
        "id": "call_1",
        "type": "function",
        "function": {"name": "read_file", "arguments": arguments}
    }]}, "finish_reason": null}]})
    .to_string()
}

fn finish(reason: &str) -> String {
    json!({"choices": [{"index": 0, "delta": {}, "finish_reason": reason}]}).to_string()
}

fn agent(server: &MockServer, cwd: &std::path::Path) -> Agent {
    let provider = OpenAiProvider::new(OpenAiProviderConfig::new(
        server.uri(),
        "test_api_key",
        "gpt-4o-mini",
    ))
    .unwrap();
    let counter = Arc::new(TokenCounter::new());
    let decoder = StreamDecoder::new(Arc::new(provider))
        .with_retry(RetryPolicy::new(2, Duration::from_millis(1)));
    let context = ContextManager::new("gpt-4o-mini", counter.clone())
        .with_system_prompt("You read files.");
    Agent::new(decoder, default_registry(counter), context, cwd)
}

async fn collect(agent: &mut Agent, message: &str) -> Vec<AgentEvent> {
    agent.run(message).collect().await
}

fn kinds(events: &[AgentEvent]) -> Vec<AgentEventType> {
    events.iter().map(|event| event.kind).collect()
}

#[tokio::test]
async fn test_turn_reads_file_through_provider() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("notes.txt"), "first\nsecond\n").unwrap();

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(sse(&[
            text_delta("Let me look."),
            read_file_call(r#"{"path":"#),
            read_file_call(r#""notes.txt"}"#),
            finish("tool_calls"),
        ]))
        .mount(&server)
        .await;

    let mut agent = agent(&server, dir.path());
    let events = collect(&mut agent, "What is in notes.txt?").await;

    assert_eq!(
        kinds(&events),
        vec![
            AgentEventType::AgentStart,
            AgentEventType::TextDelta,
            AgentEventType::TextComplete,
            AgentEventType::ToolCallStart,
            AgentEventType::ToolCallComplete,
            AgentEventType::AgentEnd,
        ]
    );

    let start = &events[3];
    assert_eq!(start.text("call_id"), Some("call_1"));
    assert_eq!(start.data["arguments"], json!({"path": "notes.txt"}));

    let complete = &events[4];
    assert_eq!(complete.data["success"], json!(true));
    assert_eq!(complete.text("output"), Some("     1 | first\n     2 | second"));
    assert_eq!(complete.data["metadata"]["total_lines"], json!(2));

    assert_eq!(events[5].text("response"), Some("Let me look."));

    let history = agent.context().history();
    assert_eq!(history.len(), 3);
    assert_eq!(history[1].role, Role::Assistant);
    assert_eq!(history[1].tool_calls().len(), 1);
    assert_eq!(history[2].role, Role::Tool);
    assert_eq!(history[2].tool_call_id.as_deref(), Some("call_1"));
    assert!(!history[2].is_error);
}

#[tokio::test]
async fn test_turn_retries_unavailable_provider() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(sse(&[text_delta("Hello"), finish("stop")]))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut agent = agent(&server, dir.path());
    let events = collect(&mut agent, "Hi").await;

    assert_eq!(
        kinds(&events),
        vec![
            AgentEventType::AgentStart,
            AgentEventType::TextDelta,
            AgentEventType::TextComplete,
            AgentEventType::AgentEnd,
        ]
    );
    assert_eq!(events[3].text("response"), Some("Hello"));
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_turn_reports_rejected_request_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"error": {"message": "Invalid API key"}})),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut agent = agent(&server, dir.path());
    let events = collect(&mut agent, "Hi").await;

    assert_eq!(
        kinds(&events),
        vec![
            AgentEventType::AgentStart,
            AgentEventType::AgentError,
            AgentEventType::TextComplete,
            AgentEventType::AgentEnd,
        ]
    );
    assert_eq!(events[1].data["details"]["kind"], json!("rejected"));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_turn_missing_file_is_folded_as_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(sse(&[read_file_call(r#"{"path":"absent.txt"}"#), finish("tool_calls")]))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut agent = agent(&server, dir.path());
    let events = collect(&mut agent, "Read absent.txt").await;

    let complete = events
        .iter()
        .find(|event| event.kind == AgentEventType::ToolCallComplete)
        .unwrap();
    assert_eq!(complete.data["success"], json!(false));

    let tool_message = agent.context().history().last().unwrap();
    assert_eq!(tool_message.role, Role::Tool);
    assert!(tool_message.is_error);
    assert!(tool_message.content.starts_with("Error: "));
}
