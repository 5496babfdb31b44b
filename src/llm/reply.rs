use super::chat::{ ChatClient, TokenStream };
use super::error::ChatError;
use crate::models::chat::ModelMessage;
use axum::body::{ Body, Bytes };
use axum::http::{ header, HeaderValue };
use axum::response::Response;
use futures::StreamExt;
use log::error;
use serde_json::json;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Event handed to finish callbacks after the last token.
#[derive(Clone, Debug)]
pub struct FinishEvent {
    /// Full accumulated reply text.
    pub text: String,
}

type FinishCallback = Box<
    dyn (FnOnce(FinishEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send
>;

/// Wrapper around a provider token stream that hides provider types from the
/// rest of the system. Callers get exactly two capabilities: registering
/// finish callbacks and materializing the HTTP streaming response.
pub struct StreamingReply {
    stream: TokenStream,
    finish_callbacks: Vec<FinishCallback>,
}

impl std::fmt::Debug for StreamingReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingReply")
            .field("finish_callbacks", &self.finish_callbacks.len())
            .finish_non_exhaustive()
    }
}

impl StreamingReply {
    pub fn new(stream: TokenStream) -> Self {
        Self {
            stream,
            finish_callbacks: Vec::new(),
        }
    }

    /// Register a callback invoked exactly once after the stream completes,
    /// errors or is abandoned by the client.
    pub fn on_finish<F, Fut>(&mut self, callback: F)
        where F: FnOnce(FinishEvent) -> Fut + Send + 'static, Fut: Future<Output = ()> + Send + 'static
    {
        self.finish_callbacks.push(Box::new(move |event| Box::pin(callback(event))));
    }

    /// Turn the reply into an SSE response. The provider stream keeps being
    /// drained when the client disconnects, so finish callbacks always see
    /// the full reply text and persistence does not depend on the client
    /// staying connected.
    pub fn into_response(self) -> Response {
        let StreamingReply { mut stream, finish_callbacks } = self;
        let (tx, rx) = mpsc::channel::<Result<Bytes, Infallible>>(32);

        tokio::spawn(async move {
            let mut full_text = String::new();
            let mut client_gone = false;
            let mut truncated = false;

            while let Some(item) = stream.next().await {
                match item {
                    Ok(token) => {
                        full_text.push_str(&token);
                        if !client_gone {
                            let event = sse_event(&json!({ "type": "text-delta", "delta": token }));
                            if tx.send(Ok(event)).await.is_err() {
                                client_gone = true;
                            }
                        }
                    }
                    Err(e) => {
                        error!("Reply stream error after {} chars: {}", full_text.len(), e);
                        // The reply is truncated; tell the client instead of
                        // framing it as a clean completion.
                        if !client_gone {
                            let event = sse_event(&json!({ "type": "error", "code": e.code() }));
                            let _ = tx.send(Ok(event)).await;
                        }
                        truncated = true;
                        break;
                    }
                }
            }

            if !client_gone && !truncated {
                let _ = tx.send(Ok(sse_event(&json!({ "type": "finish" })))).await;
                let _ = tx.send(Ok(Bytes::from("data: [DONE]\n\n"))).await;
            }

            for callback in finish_callbacks {
                callback(FinishEvent { text: full_text.clone() }).await;
            }
        });

        let body = Body::from_stream(ReceiverStream::new(rx));
        let mut response = Response::new(body);
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        response
    }
}

fn sse_event(payload: &serde_json::Value) -> Bytes {
    Bytes::from(format!("data: {}\n\n", payload))
}

/// Bound the history, prefix the system instruction and request a streamed
/// completion. Configuration and input errors fail here, before any bytes
/// stream.
pub async fn generate_reply(
    client: Arc<dyn ChatClient>,
    system_prompt: &str,
    history: &[ModelMessage],
    max_history_messages: usize
) -> Result<StreamingReply, ChatError> {
    if !client.has_credentials() {
        return Err(ChatError::MissingCredentials);
    }
    if history.is_empty() {
        return Err(ChatError::InvalidInput("empty conversation history".to_string()));
    }

    let messages = prepare_messages(system_prompt, history, max_history_messages);
    let stream = client.stream_chat(&messages).await?;
    Ok(StreamingReply::new(stream))
}

/// System instruction first, then the most recent messages up to the bound.
fn prepare_messages(
    system_prompt: &str,
    history: &[ModelMessage],
    max_history_messages: usize
) -> Vec<ModelMessage> {
    let start = history.len().saturating_sub(max_history_messages);
    let mut messages = Vec::with_capacity(history.len() - start + 1);
    messages.push(ModelMessage {
        role: "system".to_string(),
        content: system_prompt.to_string(),
    });
    messages.extend_from_slice(&history[start..]);
    messages
}
