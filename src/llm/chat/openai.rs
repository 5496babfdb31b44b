use super::{ ChatClient, TokenStream };
use crate::llm::LlmConfig;
use crate::llm::error::ChatError;
use crate::models::chat::ModelMessage;
use async_trait::async_trait;
use futures::StreamExt;
use log::{ debug, warn };
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE } };
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

pub struct OpenAIChatClient {
    http: HttpClient,
    api_key: String,
    model: String,
    base_url: String,
    max_output_tokens: u32,
}

#[derive(Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<ModelMessage>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct OpenAIStreamResponse {
    choices: Vec<OpenAIStreamChoice>,
}

#[derive(Deserialize)]
struct OpenAIStreamChoice {
    delta: OpenAIDelta,
    #[serde(rename = "finish_reason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIDelta {
    content: Option<String>,
}

impl OpenAIChatClient {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        max_output_tokens: u32,
        timeout: std::time::Duration,
    ) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let chat_model = model.unwrap_or_else(|| "gpt-4o-mini".to_string());
        let api_url = base_url
            .unwrap_or_else(|| "https://api.openai.com/v1/chat/completions".to_string());
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = HttpClient::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| Box::new(e) as Box<dyn StdError + Send + Sync>)?;

        Ok(Self {
            http,
            api_key,
            model: chat_model,
            base_url: api_url,
            max_output_tokens,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        // A missing key is not a construction error: the credential check
        // happens per request so the server can start without one.
        Self::new(
            config.api_key.clone().unwrap_or_default(),
            config.completion_model.clone(),
            config.base_url.clone(),
            config.max_output_tokens,
            config.timeout,
        )
    }
}

#[async_trait]
impl ChatClient for OpenAIChatClient {
    async fn stream_chat(&self, messages: &[ModelMessage]) -> Result<TokenStream, ChatError> {
        let url = self.base_url.trim_end_matches('/').to_string();
        let req = OpenAIChatRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            temperature: 0.7,
            max_tokens: self.max_output_tokens,
            stream: true,
        };

        let resp = self.http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ChatError::from_provider_status(status.as_u16()));
        }

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            let mut stream = resp.bytes_stream();
            // SSE lines can split across chunks; carry the tail over.
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
                    let line = pending[..newline].trim_end_matches('\r').to_string();
                    pending.drain(..=newline);

                    if line.is_empty() || line == "data: [DONE]" {
                        continue;
                    }
                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    match serde_json::from_str::<OpenAIStreamResponse>(data) {
                        Ok(stream_resp) => {
                            for choice in stream_resp.choices {
                                if let Some(content) = choice.delta.content {
                                    if !content.is_empty() {
                                        if tx.send(Ok(content)).await.is_err() {
                                            return;
                                        }
                                    }
                                }
                                if choice.finish_reason.as_deref() == Some("stop") {
                                    return;
                                }
                            }
                        }
                        Err(e) => {
                            debug!("OpenAI stream parse error: {} for data: {}", e, data);
                        }
                    }
                }
            }
            if !pending.trim().is_empty() {
                warn!("OpenAI stream ended with unparsed data");
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    fn has_credentials(&self) -> bool {
        !self.api_key.is_empty()
    }
}
