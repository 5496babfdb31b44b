use serde::{ Serialize, Deserialize };

/// Number of leading characters of a conversation's first message shown in list responses.
pub const FIRST_MESSAGE_PREVIEW_CHARS: usize = 100;

pub const NO_MESSAGES_PLACEHOLDER: &str = "(no messages)";

/// One part of a UI message. Only text parts carry content we use.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UiMessagePart {
    #[serde(rename = "type")]
    pub part_type: String,
    #[serde(default)]
    pub text: Option<String>,
}

/// Message as sent by the browser client. Roles are "user", "assistant" or
/// "system". Newer clients send a parts array; older ones a plain content string.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UiMessage {
    #[serde(default)]
    pub id: Option<String>,
    pub role: String,
    #[serde(default)]
    pub parts: Vec<UiMessagePart>,
    #[serde(default)]
    pub content: Option<String>,
}

impl UiMessage {
    /// Extract the message text: first text part, falling back to the legacy content field.
    pub fn text_content(&self) -> Option<String> {
        self.parts
            .iter()
            .find(|p| p.part_type == "text")
            .and_then(|p| p.text.clone())
            .or_else(|| self.content.clone())
    }
}

/// Message in the shape the LLM provider expects.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelMessage {
    pub role: String,
    pub content: String,
}

/// Map a persisted role ("user"/"ai") to the role used on the model/browser boundary.
pub fn storage_role_to_model(role: &str) -> &str {
    if role == "ai" { "assistant" } else { role }
}

/// Map a model/browser role back to the persisted form.
pub fn model_role_to_storage(role: &str) -> &str {
    if role == "assistant" { "ai" } else { role }
}

pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Flatten UI messages into model messages, dropping anything without text.
/// Roles are normalized to the model form, so persisted-shape messages
/// (role "ai") are accepted too.
pub fn ui_messages_to_model(messages: &[UiMessage]) -> Vec<ModelMessage> {
    messages
        .iter()
        .filter_map(|m| {
            let content = m.text_content()?;
            if content.is_empty() {
                return None;
            }
            Some(ModelMessage {
                role: storage_role_to_model(&m.role).to_string(),
                content,
            })
        })
        .collect()
}
