pub mod ollama;
pub mod openai;

use self::ollama::OllamaChatClient;
use self::openai::OpenAIChatClient;
use super::{ LlmConfig, LlmType };
use super::error::ChatError;
use crate::models::chat::ModelMessage;
use async_trait::async_trait;
use futures::Stream;
use std::error::Error as StdError;
use std::pin::Pin;
use std::sync::Arc;

/// Stream of reply tokens from a provider.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, ChatError>> + Send>>;

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Request a streamed completion for the given model messages. Fails
    /// before any bytes stream on configuration or request errors.
    async fn stream_chat(&self, messages: &[ModelMessage]) -> Result<TokenStream, ChatError>;

    /// Whether the provider has the credentials it needs. Providers without
    /// an auth requirement always report true.
    fn has_credentials(&self) -> bool {
        true
    }
}

pub fn new_client(
    config: &LlmConfig
) -> Result<Arc<dyn ChatClient>, Box<dyn StdError + Send + Sync>> {
    let client: Arc<dyn ChatClient> = match config.llm_type {
        LlmType::OpenAI => Arc::new(OpenAIChatClient::from_config(config)?),
        LlmType::Ollama => Arc::new(OllamaChatClient::from_config(config)?),
    };
    Ok(client)
}
