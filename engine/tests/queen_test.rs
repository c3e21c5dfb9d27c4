//! Integration tests for the Queen Bee
//!
//! The planner and evaluator are real `LlmTool`s talking to a mocked Ollama
//! server, so these tests cover the prompt → reply → parse path end to end.

use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use hive_engine::llm::{LLMProvider, OllamaProvider};
use hive_engine::memory::InMemoryNamespace;
use hive_engine::queen::{QueenBee, SubTask, SubTaskStatus, WorkerBot, GENERAL_CAPABILITY};
use hive_engine::tools::{LlmTool, ToolRegistry};
use sdk::tool::{ToolContext, ToolMetadata};

fn ctx() -> ToolContext {
    ToolContext::new(
        ToolMetadata::new("queen", "run-1", "user-1"),
        Arc::new(InMemoryNamespace::ephemeral("run-1")),
    )
}

fn chat_reply(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "model": "llama3.1:8b",
        "message": {"role": "assistant", "content": content},
        "done": true
    }))
}

fn queen_for(server: &MockServer) -> QueenBee {
    let provider: Arc<dyn LLMProvider> =
        Arc::new(OllamaProvider::new(server.uri(), "llama3.1:8b"));
    QueenBee::new(
        ToolRegistry::empty()
            .with(Arc::new(LlmTool::planner(Arc::clone(&provider))))
            .with(Arc::new(LlmTool::evaluator(provider))),
    )
}

fn worker(id: &str, name: &str, capabilities: &[&str]) -> WorkerBot {
    WorkerBot {
        id: id.to_string(),
        name: name.to_string(),
        capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
        description: String::new(),
    }
}

#[tokio::test]
async fn test_hackernews_goal_decomposes_into_pending_subtasks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(chat_reply(
            "Sure! Here is the plan:\n```json\n[\
             {\"description\": \"Search Hacker News for posts mentioning AI\", \"requiredCapability\": \"web.search\"},\
             {\"description\": \"Send the matches to Slack\", \"requiredCapability\": \"notify.slack\"}\
             ]\n```",
        ))
        .mount(&server)
        .await;

    let tasks = queen_for(&server)
        .decompose("Monitor hackernews for 'AI' and slack me", &ctx())
        .await;

    assert!(!tasks.is_empty());
    assert_eq!(tasks.len(), 2);
    assert!(tasks.iter().all(|t| t.status == SubTaskStatus::Pending));
    assert!(tasks.iter().all(|t| t.assigned_worker_id.is_none()));
    assert_eq!(tasks[0].required_capability, "web.search");
    assert_eq!(tasks[1].required_capability, "notify.slack");
    assert!(tasks[0].id.starts_with("task_"));
    assert!(tasks[1].id.ends_with("_1"));
}

#[tokio::test]
async fn test_decompose_falls_back_on_garbage_and_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(chat_reply("I would rather not produce JSON today."))
        .mount(&server)
        .await;

    let tasks = queen_for(&server).decompose("write a haiku", &ctx()).await;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].description, "write a haiku");
    assert_eq!(tasks[0].required_capability, GENERAL_CAPABILITY);
    assert_eq!(tasks[0].status, SubTaskStatus::Pending);

    let broken = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model crashed"))
        .mount(&broken)
        .await;

    let tasks = queen_for(&broken).decompose("", &ctx()).await;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].required_capability, GENERAL_CAPABILITY);
}

#[tokio::test]
async fn test_assign_worker_none_only_without_capable_worker() {
    let server = MockServer::start().await;
    let queen = queen_for(&server);
    let task = SubTask::new("task_1_0", "post to slack", "notify.slack");

    let unrelated = vec![worker("b1", "Searcher", &["web.search"])];
    assert!(queen.assign_worker(&task, &unrelated, &ctx()).await.is_none());
    assert!(queen.assign_worker(&task, &[], &ctx()).await.is_none());

    let generalist = vec![
        worker("b1", "Searcher", &["web.search"]),
        worker("b2", "Helper", &[GENERAL_CAPABILITY]),
    ];
    let chosen = queen.assign_worker(&task, &generalist, &ctx()).await;
    assert_eq!(chosen.map(|w| w.id), Some("b2".to_string()));

    // A single candidate never reaches the evaluator
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_assign_worker_uses_evaluator_choice() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_string_contains("Candidates"))
        .respond_with(chat_reply("name: Slack Pro\nIt has the newest integration."))
        .mount(&server)
        .await;

    let workers = vec![
        worker("b1", "Slack Basic", &["notify.slack"]),
        worker("b2", "Slack Pro", &["notify.slack"]),
    ];
    let task = SubTask::new("task_1_0", "post to slack", "notify.slack");

    let chosen = queen_for(&server)
        .assign_worker(&task, &workers, &ctx())
        .await
        .unwrap();
    assert_eq!(chosen.id, "b2");
}

#[tokio::test]
async fn test_assign_worker_accepts_name_led_and_bare_replies() {
    let workers = vec![
        worker("b1", "Slack Basic", &["notify.slack"]),
        worker("b2", "Slack Pro", &["notify.slack"]),
    ];
    let task = SubTask::new("task_1_0", "post to slack", "notify.slack");

    for reply in ["Slack Pro: newest integration", "Slack Pro"] {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(chat_reply(reply))
            .mount(&server)
            .await;

        let chosen = queen_for(&server)
            .assign_worker(&task, &workers, &ctx())
            .await
            .unwrap();
        assert_eq!(chosen.id, "b2", "reply {:?}", reply);
    }
}

#[tokio::test]
async fn test_assign_worker_falls_back_to_first_capable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(chat_reply("name: Nobody I know"))
        .mount(&server)
        .await;

    let workers = vec![
        worker("b1", "Alpha", &["notify.slack"]),
        worker("b2", "Beta", &[GENERAL_CAPABILITY]),
    ];
    let task = SubTask::new("task_1_0", "post to slack", "notify.slack");

    let chosen = queen_for(&server)
        .assign_worker(&task, &workers, &ctx())
        .await
        .unwrap();
    assert_eq!(chosen.id, "b1");
}

#[test]
fn test_assignment_is_never_replaced() {
    let mut task = SubTask::new("task_1_0", "search", "web.search");
    assert!(task.assign("b1"));
    assert!(task.assign("b1"));
    assert!(!task.assign("b2"));
    assert_eq!(task.assigned_worker_id.as_deref(), Some("b1"));
}
