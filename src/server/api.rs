use crate::cache::{ conversation_list_key, conversation_messages_key, ResponseCache };
use crate::cli::Args;
use crate::config::prompt::SystemPrompt;
use crate::llm::chat::ChatClient;
use crate::llm::error::ChatError;
use crate::llm::reply::generate_reply;
use crate::models::chat::{ ui_messages_to_model, UiMessage };
use crate::store::{ ConversationStore, ROLE_AI, ROLE_USER };
use axum::{
    body::Body,
    extract::{ Path, Query, State },
    http::{ header, HeaderValue, StatusCode },
    response::{ IntoResponse, Response },
    routing::{ get, post },
    Json,
    Router,
};
use log::{ error, info, warn };
use serde::{ Deserialize, Serialize };
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{ Any, CorsLayer };

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ConversationStore>,
    pub cache: Option<Arc<dyn ResponseCache>>,
    pub chat_client: Arc<dyn ChatClient>,
    pub system_prompt: Arc<SystemPrompt>,
    pub max_history_messages: usize,
    pub cache_ttl: Duration,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<UiMessage>,
    pub conversation_id: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub session_id: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    let cors = if cors_origin == "*" {
        CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
    } else {
        match cors_origin.parse::<HeaderValue>() {
            Ok(origin) => CorsLayer::new().allow_origin(origin).allow_methods(Any).allow_headers(Any),
            Err(e) => {
                warn!("Invalid CORS origin '{}' ({}), allowing any", cors_origin, e);
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            }
        }
    };

    Router::new()
        .route("/api/ai", post(chat_handler))
        .route("/api/conversations", get(list_conversations_handler))
        .route("/api/conversations/{id}/messages", get(list_messages_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn start_http_server(
    addr: &str,
    state: AppState,
    args: &Args
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = addr.parse::<SocketAddr>()?;
    info!("Starting HTTP API server on: http://{}", addr);

    let app = build_router(state, &args.cors_origin);

    if args.enable_tls && args.tls_cert_path.is_some() && args.tls_key_path.is_some() {
        let cert_path = args.tls_cert_path.as_deref().unwrap_or_default();
        let key_path = args.tls_key_path.as_deref().unwrap_or_default();
        let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
            cert_path,
            key_path
        ).await?;
        info!("TLS enabled");
        axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service()).await?;
    } else {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app.into_make_service()).await?;
    }
    Ok(())
}

async fn chat_handler(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> Response {
    // Resolve or create the conversation.
    let conversation_id = match &req.conversation_id {
        Some(id) =>
            match state.store.find_conversation(id).await {
                Ok(Some(conversation)) => conversation.id,
                Ok(None) => {
                    return error_response(StatusCode::NOT_FOUND, "Conversation not found", None);
                }
                Err(e) => {
                    error!("Error loading conversation {}: {}", id, e);
                    return internal_error();
                }
            }
        None =>
            match state.store.create_conversation(req.session_id.as_deref()).await {
                Ok(conversation) => conversation.id,
                Err(e) => {
                    error!("Error creating conversation: {}", e);
                    return internal_error();
                }
            }
    };

    // Persist the trailing user message before the model call so it survives
    // a model failure.
    if let Some(last) = req.messages.last() {
        if last.role == "user" {
            if let Some(text) = last.text_content() {
                if !text.is_empty() {
                    if let Err(e) = state.store.add_message(&conversation_id, ROLE_USER, &text).await {
                        error!("Error saving user message for {}: {}", conversation_id, e);
                        return internal_error();
                    }
                }
            }
        }
    }

    let history = ui_messages_to_model(&req.messages);
    let mut reply = match
        generate_reply(
            state.chat_client.clone(),
            state.system_prompt.as_str(),
            &history,
            state.max_history_messages
        ).await
    {
        Ok(reply) => reply,
        Err(e) => {
            error!("Chat generation failed for {}: {}", conversation_id, e);
            return chat_error_response(&e);
        }
    };

    // Persist the assistant reply, then drop the now-stale cache entries.
    // Invalidation strictly follows persistence so a concurrent reader can
    // never repopulate the cache from pre-write state.
    {
        let store = state.store.clone();
        let cache = state.cache.clone();
        let conversation_id = conversation_id.clone();
        let session_id = req.session_id.clone();
        reply.on_finish(move |event| async move {
            match store.add_message(&conversation_id, ROLE_AI, &event.text).await {
                Ok(_) => {
                    if let Some(cache) = cache {
                        let mut keys = vec![conversation_messages_key(&conversation_id)];
                        if let Some(session_id) = &session_id {
                            keys.push(conversation_list_key(session_id));
                        }
                        cache.delete(&keys).await;
                    }
                }
                Err(e) => {
                    error!("Error saving assistant message for {}: {}", conversation_id, e);
                }
            }
        });
    }

    let mut response = reply.into_response();
    match HeaderValue::from_str(&conversation_id) {
        Ok(value) => {
            response.headers_mut().insert("X-Conversation-Id", value);
        }
        Err(e) => {
            error!("Conversation id {} is not header-safe: {}", conversation_id, e);
        }
    }
    response
}

async fn list_conversations_handler(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>
) -> Response {
    let cache_key = query.session_id.as_deref().map(conversation_list_key);

    if let (Some(cache), Some(key)) = (&state.cache, &cache_key) {
        if let Some(cached) = cache.get(key).await {
            return json_response(cached, "HIT");
        }
    }

    let summaries = match state.store.list_conversations(query.session_id.as_deref()).await {
        Ok(summaries) => summaries,
        Err(e) => {
            error!("Error listing conversations: {}", e);
            return internal_error();
        }
    };
    let body = match serde_json::to_string(&summaries) {
        Ok(body) => body,
        Err(e) => {
            error!("Error serializing conversation list: {}", e);
            return internal_error();
        }
    };

    if let (Some(cache), Some(key)) = (&state.cache, &cache_key) {
        cache.set(key, &body, state.cache_ttl).await;
    }
    json_response(body, "MISS")
}

async fn list_messages_handler(
    State(state): State<AppState>,
    Path(id): Path<String>
) -> Response {
    let cache_key = conversation_messages_key(&id);

    if let Some(cache) = &state.cache {
        if let Some(cached) = cache.get(&cache_key).await {
            return json_response(cached, "HIT");
        }
    }

    match state.store.find_conversation(&id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return error_response(StatusCode::NOT_FOUND, "Conversation not found", None);
        }
        Err(e) => {
            error!("Error loading conversation {}: {}", id, e);
            return internal_error();
        }
    }

    let messages = match state.store.list_messages(&id).await {
        Ok(messages) => messages,
        Err(e) => {
            error!("Error listing messages for {}: {}", id, e);
            return internal_error();
        }
    };
    let body = match serde_json::to_string(&messages) {
        Ok(body) => body,
        Err(e) => {
            error!("Error serializing messages for {}: {}", id, e);
            return internal_error();
        }
    };

    if let Some(cache) = &state.cache {
        cache.set(&cache_key, &body, state.cache_ttl).await;
    }
    json_response(body, "MISS")
}

fn json_response(body: String, cache_marker: &'static str) -> Response {
    let mut response = Response::new(Body::from(body));
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response.headers_mut().insert("X-Cache", HeaderValue::from_static(cache_marker));
    response
}

fn error_response(status: StatusCode, message: &str, code: Option<&str>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
            code: code.map(str::to_string),
        }),
    ).into_response()
}

fn internal_error() -> Response {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
}

fn chat_error_response(e: &ChatError) -> Response {
    error_response(e.status(), e.user_message(), Some(e.code()))
}
