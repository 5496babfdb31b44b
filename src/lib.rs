pub mod cache;
pub mod cli;
pub mod config;
pub mod llm;
pub mod models;
pub mod server;
pub mod store;

use cli::Args;
use config::prompt::SystemPrompt;
use llm::{ parse_llm_type, LlmConfig };
use llm::chat::new_client as new_chat_client;
use log::info;
use server::api::AppState;
use server::Server;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Database URL: {}", args.database_url);
    info!("Chat LLM Type: {}", args.chat_llm_type);
    info!("Max History Messages: {}", args.max_history_messages);
    info!("Cache Enabled: {}", args.enable_cache);
    if args.enable_cache {
        info!("Cache Backend: {}", args.cache_backend);
        info!("Cache TTL: {}s", args.cache_ttl_secs);
    }
    info!("-------------------------");

    let store = store::init(&args).await?;
    let cache = cache::init(&args).await;

    let chat_config = LlmConfig {
        llm_type: parse_llm_type(&args.chat_llm_type)?,
        api_key: Some(args.chat_api_key.clone()).filter(|k| !k.is_empty()),
        completion_model: args.chat_model.clone(),
        base_url: args.chat_base_url.clone(),
        max_output_tokens: args.max_output_tokens,
        timeout: Duration::from_secs(args.chat_timeout_secs),
    };
    let chat_client = new_chat_client(&chat_config)?;
    info!(
        "Chat client configured: Type={}, Model={:?}, BaseURL={:?}",
        args.chat_llm_type,
        chat_config.completion_model.as_deref().unwrap_or("adapter default"),
        chat_config.base_url.as_deref().unwrap_or("adapter default")
    );

    let system_prompt = Arc::new(SystemPrompt::load(store.as_ref()).await);

    let state = AppState {
        store,
        cache,
        chat_client,
        system_prompt,
        max_history_messages: args.max_history_messages,
        cache_ttl: Duration::from_secs(args.cache_ttl_secs),
    };

    let server = Server::new(args.server_addr.clone(), state, args);
    server.run().await
}
