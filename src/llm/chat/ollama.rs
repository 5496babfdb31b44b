use super::{ ChatClient, TokenStream };
use crate::llm::LlmConfig;
use crate::llm::error::ChatError;
use crate::models::chat::ModelMessage;
use async_trait::async_trait;
use futures::StreamExt;
use log::debug;
use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

pub struct OllamaChatClient {
    http: HttpClient,
    base_url: String,
    model: String,
    max_output_tokens: u32,
}

#[derive(Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ModelMessage>,
    stream: bool,
    options: OllamaOptions,
}

/// Ollama carries the reply-length cap in a nested options object as
/// `num_predict`.
#[derive(Serialize)]
struct OllamaOptions {
    num_predict: u32,
}

#[derive(Deserialize)]
struct OllamaStreamResponse {
    message: Option<OllamaStreamMessage>,
    done: bool,
}

#[derive(Deserialize)]
struct OllamaStreamMessage {
    content: String,
}

impl OllamaChatClient {
    pub fn new(
        base_url: Option<String>,
        model: Option<String>,
        max_output_tokens: u32,
        timeout: std::time::Duration,
    ) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Box::new(e) as Box<dyn StdError + Send + Sync>)?;

        Ok(Self {
            http,
            base_url: base_url.unwrap_or_else(|| "http://localhost:11434".to_string()),
            model: model.unwrap_or_else(|| "llama3".to_string()),
            max_output_tokens,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        Self::new(
            config.base_url.clone(),
            config.completion_model.clone(),
            config.max_output_tokens,
            config.timeout,
        )
    }
}

#[async_trait]
impl ChatClient for OllamaChatClient {
    async fn stream_chat(&self, messages: &[ModelMessage]) -> Result<TokenStream, ChatError> {
        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        let req = OllamaChatRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            stream: true,
            options: OllamaOptions {
                num_predict: self.max_output_tokens,
            },
        };

        let resp = self.http.post(&url).json(&req).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ChatError::from_provider_status(status.as_u16()));
        }

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            let mut stream = resp.bytes_stream();
            let mut pending = String::new();

            while let Some(chunk_result) = stream.next().await {
                let chunk = match chunk_result {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx.send(Err(ChatError::from(e))).await;
                        return;
                    }
                };
                let Ok(text) = String::from_utf8(chunk.to_vec()) else {
                    continue;
                };
                pending.push_str(&text);

                while let Some(newline) = pending.find('\n') {
                    let line = pending[..newline].to_string();
                    pending.drain(..=newline);

                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<OllamaStreamResponse>(&line) {
                        Ok(stream_resp) => {
                            if let Some(message) = stream_resp.message {
                                if !message.content.is_empty() {
                                    if tx.send(Ok(message.content)).await.is_err() {
                                        return;
                                    }
                                }
                            }
                            if stream_resp.done {
                                return;
                            }
                        }
                        Err(e) => {
                            debug!("Ollama stream parse error: {} for line: {}", e, line);
                        }
                    }
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}
