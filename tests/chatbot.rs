//! End-to-end tests for the answer pipeline against mock model servers.
//!
//! Each test starts a small axum app on an ephemeral port that mimics the
//! remote chat-completions API or the local text-generation server, then
//! drives `ChatbotService` through the real HTTP backends.

use agri_assist::chatbot::ChatbotService;
use agri_assist::config::{Config, LocalModelConfig, RemoteConfig};
use agri_assist::generation::local::LocalModelBackend;
use agri_assist::generation::remote::RemoteChatBackend;
use agri_assist::generation::DecodingParams;
use agri_assist::knowledge::KnowledgeBase;
use agri_assist::models::{BackendKind, ConversationTurn};
use agri_assist::strategy::{GenerationStrategy, LocalStrategy, RemoteStrategy};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

// ─── Helpers ────────────────────────────────────────────────────────

type Captured = Arc<Mutex<Vec<(HeaderMap, Value)>>>;

async fn spawn_mock(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    format!("http://{}", addr)
}

async fn mock_openai(answer: &'static str) -> (String, Captured) {
    let captured: Captured = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route(
            "/v1/chat/completions",
            post(
                move |State(seen): State<Captured>, headers: HeaderMap, Json(body): Json<Value>| async move {
                    seen.lock().unwrap().push((headers, body));
                    Json(json!({
                        "choices": [{"message": {"role": "assistant", "content": answer}}]
                    }))
                },
            ),
        )
        .with_state(captured.clone());
    (format!("{}/v1", spawn_mock(app).await), captured)
}

async fn mock_failing_openai() -> String {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|| async { (StatusCode::TOO_MANY_REQUESTS, "rate limited") }),
    );
    format!("{}/v1", spawn_mock(app).await)
}

/// Local text-generation server that echoes the prompt and appends `continuation`.
async fn mock_local_model(continuation: &'static str) -> (String, Captured) {
    let captured: Captured = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route(
            "/generate",
            post(
                move |State(seen): State<Captured>, headers: HeaderMap, Json(body): Json<Value>| async move {
                    let prompt = body["inputs"].as_str().unwrap_or_default().to_string();
                    seen.lock().unwrap().push((headers, body));
                    Json(json!([{ "generated_text": format!("{} {}", prompt, continuation) }]))
                },
            ),
        )
        .route("/health", get(|| async { "ok" }))
        .with_state(captured.clone());
    (spawn_mock(app).await, captured)
}

fn kb() -> Arc<KnowledgeBase> {
    Arc::new(KnowledgeBase::bundled().unwrap())
}

fn remote(base_url: String) -> Box<dyn GenerationStrategy> {
    let cfg = RemoteConfig {
        base_url,
        timeout_secs: 5,
        ..RemoteConfig::default()
    };
    let backend = RemoteChatBackend::new(&cfg, "sk-test".to_string()).unwrap();
    Box::new(RemoteStrategy::new(Box::new(backend)))
}

async fn local(base: &str) -> Box<dyn GenerationStrategy> {
    let cfg = LocalModelConfig {
        url: Some(format!("{}/generate", base)),
        health_url: Some(format!("{}/health", base)),
        timeout_secs: 5,
        ..LocalModelConfig::default()
    };
    let backend = LocalModelBackend::connect(&cfg).await.unwrap();
    Box::new(LocalStrategy::new(Box::new(backend), DecodingParams::default()))
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_remote_answer_with_context_and_history() {
    let (base, captured) = mock_openai("  Tomatoes need 6-8 hours of sun.  ").await;
    let bot = ChatbotService::new(kb(), vec![remote(base)]);

    let history: Vec<ConversationTurn> = (0..6)
        .map(|i| ConversationTurn::new(format!("question {}", i), format!("answer {}", i)))
        .collect();
    let reply = bot.get_response("How do I grow tomato?", &history).await;

    assert!(reply.success);
    assert_eq!(reply.bot_response, "Tomatoes need 6-8 hours of sun.");
    assert_eq!(reply.confidence, 0.85);

    let seen = captured.lock().unwrap();
    let (headers, body) = &seen[0];
    assert_eq!(headers["authorization"], "Bearer sk-test");
    assert_eq!(body["model"], "gpt-3.5-turbo");
    assert_eq!(body["max_tokens"], 300);

    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages[0]["role"], "system");
    assert!(messages[1]["content"]
        .as_str()
        .unwrap()
        .contains("Crop: Tomato"));
    // Only the last five turns are sent.
    assert!(!messages.iter().any(|m| m["content"] == "question 0"));
    assert!(messages.iter().any(|m| m["content"] == "question 1"));
    let last = messages.last().unwrap();
    assert_eq!(last["role"], "user");
    assert_eq!(last["content"], "How do I grow tomato?");
}

#[tokio::test]
async fn test_local_answer_is_cleaned() {
    let (base, captured) = mock_local_model("Water deeply once a week at the base of the plant.").await;
    let bot = ChatbotService::new(kb(), vec![local(&base).await]);

    let reply = bot.get_response("wheat irrigation schedule", &[]).await;
    assert_eq!(reply.confidence, 0.85);
    assert_eq!(
        reply.bot_response,
        "Water deeply once a week at the base of the plant."
    );

    let seen = captured.lock().unwrap();
    let body = &seen[0].1;
    assert!(body["inputs"].as_str().unwrap().ends_with("User: wheat irrigation schedule\nBot:"));
    assert_eq!(body["parameters"]["num_beams"], 5);
    assert_eq!(body["parameters"]["return_full_text"], true);
}

#[tokio::test]
async fn test_short_local_answer_falls_back() {
    let (base, _) = mock_local_model("Ok.").await;
    let bot = ChatbotService::new(kb(), vec![local(&base).await]);

    let reply = bot.get_response("How do I grow tomato?", &[]).await;
    assert_eq!(reply.confidence, 0.7);
    assert!(reply
        .bot_response
        .starts_with("Here's information about growing Tomato:"));
}

#[tokio::test]
async fn test_remote_failure_cascades_to_local() {
    let remote_base = mock_failing_openai().await;
    let (local_base, _) = mock_local_model("Apply urea at tillering and again at jointing.").await;
    let bot = ChatbotService::new(kb(), vec![remote(remote_base), local(&local_base).await]);

    assert_eq!(bot.health().backend, BackendKind::Remote);
    let reply = bot.get_response("wheat fertilizer", &[]).await;
    assert_eq!(reply.confidence, 0.85);
    assert_eq!(
        reply.bot_response,
        "Apply urea at tillering and again at jointing."
    );
}

#[tokio::test]
async fn test_remote_failure_without_local_uses_knowledge_base() {
    let bot = ChatbotService::new(kb(), vec![remote(mock_failing_openai().await)]);
    let reply = bot.get_response("My tomato has blight", &[]).await;
    assert!(reply.success);
    assert_eq!(reply.confidence, 0.7);
    assert!(reply.bot_response.contains("Tomato"));
}

#[tokio::test]
async fn test_initialize_with_local_model_from_config() {
    let (base, _) = mock_local_model("Harvest when the grains are hard.").await;
    let mut cfg = Config::minimal();
    cfg.chatbot.local.url = Some(format!("{}/generate", base));
    cfg.chatbot.local.health_url = Some(format!("{}/health", base));

    let bot = ChatbotService::initialize(&cfg, kb()).await;
    let health = bot.health();
    assert!(health.model_loaded);
    assert!(health.rag_enabled);
}
