use async_trait::async_trait;
use axum::http::StatusCode;
use axum_test::TestServer;
use futures::stream;
use serde_json::{ json, Value };
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use std::sync::atomic::{ AtomicUsize, Ordering };
use std::time::Duration;
use support_agent::cache::memory::MemoryCache;
use support_agent::config::prompt::SystemPrompt;
use support_agent::llm::chat::{ ChatClient, TokenStream };
use support_agent::llm::error::ChatError;
use support_agent::models::chat::ModelMessage;
use support_agent::server::api::{ build_router, AppState };
use support_agent::store::ConversationStore;
use support_agent::store::sqlite::{ init_schema, SqliteConversationStore };

/// Chat client that replays a fixed token sequence and counts invocations.
struct ScriptedChatClient {
    tokens: Vec<String>,
    has_key: bool,
    calls: AtomicUsize,
}

impl ScriptedChatClient {
    fn replying(tokens: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
            has_key: true,
            calls: AtomicUsize::new(0),
        })
    }

    fn without_credentials() -> Arc<Self> {
        Arc::new(Self {
            tokens: Vec::new(),
            has_key: false,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ChatClient for ScriptedChatClient {
    async fn stream_chat(&self, _messages: &[ModelMessage]) -> Result<TokenStream, ChatError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let items: Vec<Result<String, ChatError>> = self.tokens
            .iter()
            .cloned()
            .map(Ok)
            .collect();
        Ok(Box::pin(stream::iter(items)))
    }

    fn has_credentials(&self) -> bool {
        self.has_key
    }
}

async fn test_state(chat_client: Arc<dyn ChatClient>) -> (AppState, Arc<dyn ConversationStore>) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:").await
        .unwrap();
    init_schema(&pool).await.unwrap();
    let store: Arc<dyn ConversationStore> = Arc::new(SqliteConversationStore::new(pool));

    let state = AppState {
        store: store.clone(),
        cache: Some(Arc::new(MemoryCache::new())),
        chat_client,
        system_prompt: Arc::new(SystemPrompt::base()),
        max_history_messages: 20,
        cache_ttl: Duration::from_secs(90),
    };
    (state, store)
}

fn user_message(text: &str) -> Value {
    json!({ "role": "user", "parts": [{ "type": "text", "text": text }] })
}

/// Assistant-message persistence runs after the response body completes, so
/// tests poll the store instead of racing it.
async fn wait_for_messages(store: &Arc<dyn ConversationStore>, conversation_id: &str, count: usize) {
    for _ in 0..100 {
        let messages = store.list_messages(conversation_id).await.unwrap();
        if messages.len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {} messages in {}", count, conversation_id);
}

#[tokio::test]
async fn chat_creates_conversation_streams_and_persists_both_sides() {
    let (state, store) = test_state(ScriptedChatClient::replying(&["Hello ", "there!"])).await;
    let server = TestServer::new(build_router(state, "*")).unwrap();

    let res = server
        .post("/api/ai")
        .json(&json!({ "messages": [user_message("Hi")], "sessionId": "s1" })).await;

    res.assert_status(StatusCode::OK);
    let conversation_id = res.header("x-conversation-id").to_str().unwrap().to_string();
    let body = res.text();
    assert!(body.contains("text-delta"));
    assert!(body.contains("data: [DONE]"));

    wait_for_messages(&store, &conversation_id, 2).await;
    let messages = store.list_messages(&conversation_id).await.unwrap();
    assert_eq!(messages[0].role, "user");
    assert_eq!(messages[0].content, "Hi");
    assert_eq!(messages[1].role, "ai");
    assert_eq!(messages[1].content, "Hello there!");
}

#[tokio::test]
async fn conversation_list_is_miss_then_hit_with_first_message_preview() {
    let (state, store) = test_state(ScriptedChatClient::replying(&["ok"])).await;
    let server = TestServer::new(build_router(state, "*")).unwrap();

    let conv = store.create_conversation(Some("s1")).await.unwrap();
    store.add_message(&conv.id, "user", "Hi").await.unwrap();

    let first = server.get("/api/conversations").add_query_param("sessionId", "s1").await;
    first.assert_status(StatusCode::OK);
    assert_eq!(first.header("x-cache"), "MISS");
    let listed: Vec<Value> = first.json();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["firstMessage"], "Hi");

    let second = server.get("/api/conversations").add_query_param("sessionId", "s1").await;
    assert_eq!(second.header("x-cache"), "HIT");
    assert_eq!(second.text(), first.text());
}

#[tokio::test]
async fn conversation_list_without_session_is_never_cached() {
    let (state, store) = test_state(ScriptedChatClient::replying(&["ok"])).await;
    let server = TestServer::new(build_router(state, "*")).unwrap();
    store.create_conversation(None).await.unwrap();

    let first = server.get("/api/conversations").await;
    assert_eq!(first.header("x-cache"), "MISS");
    let second = server.get("/api/conversations").await;
    assert_eq!(second.header("x-cache"), "MISS");
}

#[tokio::test]
async fn message_list_invalidation_cycles_miss_hit_miss() {
    let (state, store) = test_state(ScriptedChatClient::replying(&["reply"])).await;
    let server = TestServer::new(build_router(state, "*")).unwrap();

    let res = server
        .post("/api/ai")
        .json(&json!({ "messages": [user_message("Hi")], "sessionId": "s1" })).await;
    let conversation_id = res.header("x-conversation-id").to_str().unwrap().to_string();
    res.text();
    wait_for_messages(&store, &conversation_id, 2).await;

    let path = format!("/api/conversations/{}/messages", conversation_id);
    let first = server.get(&path).await;
    assert_eq!(first.header("x-cache"), "MISS");
    let second = server.get(&path).await;
    assert_eq!(second.header("x-cache"), "HIT");

    // A new assistant message invalidates the entry, so the next read
    // recomputes exactly once.
    let res = server
        .post("/api/ai")
        .json(
            &json!({
            "messages": [user_message("Hi"), user_message("More")],
            "conversationId": conversation_id,
            "sessionId": "s1",
        })
        ).await;
    res.assert_status(StatusCode::OK);
    res.text();
    wait_for_messages(&store, &conversation_id, 4).await;

    let third = server.get(&path).await;
    assert_eq!(third.header("x-cache"), "MISS");
    let messages: Vec<Value> = third.json();
    assert_eq!(messages.len(), 4);
    let fourth = server.get(&path).await;
    assert_eq!(fourth.header("x-cache"), "HIT");
}

#[tokio::test]
async fn unknown_conversation_is_404_and_writes_nothing() {
    let (state, store) = test_state(ScriptedChatClient::replying(&["ok"])).await;
    let server = TestServer::new(build_router(state, "*")).unwrap();

    let res = server
        .post("/api/ai")
        .json(
            &json!({
            "messages": [user_message("Hi")],
            "conversationId": "does-not-exist",
        })
        ).await;

    res.assert_status(StatusCode::NOT_FOUND);
    let body: Value = res.json();
    assert_eq!(body["error"], "Conversation not found");
    assert!(store.list_conversations(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_messages_endpoint_returns_404_body() {
    let (state, _store) = test_state(ScriptedChatClient::replying(&["ok"])).await;
    let server = TestServer::new(build_router(state, "*")).unwrap();

    let res = server.get("/api/conversations/bad-id/messages").await;
    res.assert_status(StatusCode::NOT_FOUND);
    let body: Value = res.json();
    assert_eq!(body["error"], "Conversation not found");
}

#[tokio::test]
async fn empty_history_fails_before_any_provider_call() {
    let client = ScriptedChatClient::replying(&["never"]);
    let (state, _store) = test_state(client.clone()).await;
    let server = TestServer::new(build_router(state, "*")).unwrap();

    let res = server.post("/api/ai").json(&json!({ "messages": [], "sessionId": "s1" })).await;

    res.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = res.json();
    assert_eq!(body["code"], "INVALID_INPUT");
    assert_eq!(client.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_credentials_map_to_500_with_stable_code() {
    let (state, _store) = test_state(ScriptedChatClient::without_credentials()).await;
    let server = TestServer::new(build_router(state, "*")).unwrap();

    let res = server
        .post("/api/ai")
        .json(&json!({ "messages": [user_message("Hi")] })).await;

    res.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = res.json();
    assert_eq!(body["code"], "MISSING_API_KEY");
}

#[tokio::test]
async fn sessions_never_see_each_others_conversations() {
    let (state, store) = test_state(ScriptedChatClient::replying(&["ok"])).await;
    let server = TestServer::new(build_router(state, "*")).unwrap();

    let mine = store.create_conversation(Some("s1")).await.unwrap();
    store.create_conversation(Some("s2")).await.unwrap();

    let res = server.get("/api/conversations").add_query_param("sessionId", "s1").await;
    let listed: Vec<Value> = res.json();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["id"], mine.id.as_str());
}
