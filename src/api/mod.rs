//! Wire payloads for the Ollama HTTP API.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod models;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Serialize, Debug)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<ChatOptions>,
}

/// Sampling options sent with a chat request.
///
/// The reasoning switches are hints; servers and models are free to ignore
/// them, so suppression is enforced client-side as well.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ChatOptions {
    pub temperature: f32,
    pub hide_thinking: bool,
    pub show_reasoning: bool,
    pub thinking: bool,
}

impl ChatOptions {
    pub fn suppress_reasoning() -> Self {
        ChatOptions {
            temperature: 0.7,
            hide_thinking: true,
            show_reasoning: false,
            thinking: false,
        }
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: String,
}

/// Body of a non-streamed `/api/chat` response.
#[derive(Deserialize, Debug)]
pub struct ChatResponse {
    pub message: ResponseMessage,
    #[serde(default)]
    pub done: bool,
}

/// One line of a streamed `/api/chat` or `/api/pull` response.
#[derive(Deserialize, Debug, Default)]
pub struct StreamRecord {
    #[serde(default)]
    pub message: Option<ResponseMessage>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub digest: Option<String>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub completed: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Body of `GET /api/tags`. Entries stay untyped so that one malformed
/// descriptor cannot poison the whole listing.
#[derive(Deserialize, Debug, Default)]
pub struct TagsResponse {
    #[serde(default)]
    pub models: Vec<Value>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TagEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub modified_at: Option<String>,
    #[serde(default)]
    pub digest: Option<String>,
    #[serde(default)]
    pub details: Option<TagDetails>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct TagDetails {
    #[serde(default)]
    pub parent_model: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub family: Option<String>,
    #[serde(default)]
    pub parameter_size: Option<String>,
    #[serde(default)]
    pub quantization_level: Option<String>,
}

/// Body of `POST /api/pull` and `DELETE /api/delete`.
#[derive(Serialize, Debug)]
pub struct ModelNameRequest<'a> {
    pub name: &'a str,
}
