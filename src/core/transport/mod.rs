//! HTTP client for the Ollama API.
//!
//! Every operation targets the single validated [`Endpoint`] the client was
//! built with and carries its own timeout. Failures are classified into
//! [`TransportError`] variants and never panic.

use std::sync::Arc;

use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::{RequestBuilder, Response, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::models::{decode_tag_entry, sort_models, ModelDescriptor};
use crate::api::{
    ChatMessage, ChatOptions, ChatRequest, ChatResponse, ModelNameRequest, TagsResponse,
};
use crate::core::constants::{
    CHAT_TIMEOUT, DELETE_TIMEOUT, LIST_MODELS_TIMEOUT, PROBE_TIMEOUT, PULL_TIMEOUT,
};
use crate::core::endpoint::Endpoint;
use crate::core::stream_parser::{parse_records, ProtocolRecord, PullProgress};
use crate::core::thinking::{filter_thinking, normalize_whitespace, ThinkingFilter};
use crate::core::validator::{ValidationError, Validator};


/// Receiver for streamed chat text.
pub type ChunkSink<'a> = dyn FnMut(&str) + Send + 'a;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("server unreachable: {0}")]
    Unreachable(String),
    #[error("{}", format_rejection(.status, .message))]
    Rejected {
        status: Option<u16>,
        message: String,
    },
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("operation cancelled")]
    Cancelled,
}

impl TransportError {
    pub fn classification(&self) -> &'static str {
        match self {
            TransportError::Invalid(_) => "invalid",
            TransportError::Unreachable(_) => "unreachable",
            TransportError::Rejected { .. } => "rejected",
            TransportError::Protocol(_) => "protocol error",
            TransportError::Cancelled => "cancelled",
        }
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            TransportError::Unreachable(err.to_string())
        } else if err.is_decode() {
            TransportError::Protocol(err.to_string())
        } else if let Some(status) = err.status() {
            TransportError::Rejected {
                status: Some(status.as_u16()),
                message: err.to_string(),
            }
        } else {
            // resets and truncated bodies, including mid-stream
            TransportError::Unreachable(err.to_string())
        }
    }
}

fn format_rejection(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(status) => format!("request rejected ({status}): {message}"),
        None => format!("request rejected: {message}"),
    }
}

#[derive(Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    endpoint: Endpoint,
    validator: Arc<Validator>,
}

impl OllamaClient {
    pub fn new(endpoint: Endpoint, validator: Arc<Validator>) -> Self {
        Self::with_http_client(reqwest::Client::new(), endpoint, validator)
    }

    pub fn with_http_client(
        http: reqwest::Client,
        endpoint: Endpoint,
        validator: Arc<Validator>,
    ) -> Self {
        OllamaClient {
            http,
            endpoint,
            validator,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn validator(&self) -> &Arc<Validator> {
        &self.validator
    }

    /// Whether the server answers `/api/version`. Failure is an ordinary
    /// `false`, not an error.
    pub async fn probe(&self) -> bool {
        let url = self.endpoint.api_url("api/version");
        match self.http.get(url).timeout(PROBE_TIMEOUT).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                debug!(status = %response.status(), "probe answered with failure status");
                false
            }
            Err(err) => {
                debug!(error = %err, "probe failed");
                false
            }
        }
    }

    /// Installed models, newest first. Descriptors that fail to decode or
    /// carry an invalid name are dropped and logged.
    pub async fn list_models(&self) -> Result<Vec<ModelDescriptor>, TransportError> {
        let url = self.endpoint.api_url("api/tags");
        let response = self
            .send(self.http.get(url).timeout(LIST_MODELS_TIMEOUT))
            .await?;
        let body: TagsResponse = response.json().await.map_err(|err| {
            TransportError::Protocol(format!("malformed model listing: {err}"))
        })?;

        let mut models = Vec::with_capacity(body.models.len());
        for raw in &body.models {
            let Some(model) = decode_tag_entry(raw) else {
                self.validator
                    .security_log()
                    .record("malformed model descriptor", &raw.to_string());
                continue;
            };
            if self
                .validator
                .validate_model_identifier(&model.name)
                .is_err()
            {
                continue;
            }
            models.push(model);
        }

        sort_models(&mut models);
        debug!(count = models.len(), "model listing received");
        Ok(models)
    }

    /// Pull `name`, reporting every progress record. Returns `true` only
    /// when the server sends the terminal `success` record.
    pub async fn pull<F>(
        &self,
        name: &str,
        mut on_progress: F,
        cancel: &CancellationToken,
    ) -> Result<bool, TransportError>
    where
        F: FnMut(&PullProgress) + Send,
    {
        self.validator.validate_model_identifier(name)?;
        let log = self.validator.security_log();
        log.record("model pull started", name);

        let url = self.endpoint.api_url("api/pull");
        let request = self
            .http
            .post(url)
            .json(&ModelNameRequest { name })
            .timeout(PULL_TIMEOUT);

        let outcome: Result<bool, TransportError> = tokio::select! {
            outcome = async {
                let response = self.send(request).await?;
                let mut records = std::pin::pin!(parse_records(response.bytes_stream()));
                while let Some(record) = records.next().await {
                    match record.map_err(TransportError::from_reqwest)? {
                        ProtocolRecord::Progress(progress) => {
                            on_progress(&progress);
                            if progress.is_success() {
                                return Ok(true);
                            }
                        }
                        ProtocolRecord::Failure(message) => {
                            warn!(model = name, error = %message, "pull reported an error");
                            return Ok(false);
                        }
                        ProtocolRecord::Content { .. } => {}
                    }
                }
                Ok::<bool, TransportError>(false)
            } => outcome,
            _ = cancel.cancelled() => Err(TransportError::Cancelled),
        };

        match &outcome {
            Ok(true) => {
                info!(model = name, "pull completed");
                log.record("model pull completed", name);
            }
            Ok(false) => log.record("model pull failed", name),
            Err(err) => log.record(
                "model pull failed",
                &format!("{name} ({})", err.classification()),
            ),
        }
        outcome
    }

    /// Delete an installed model. `false` means the server does not know it.
    pub async fn delete(&self, name: &str) -> Result<bool, TransportError> {
        self.validator.validate_model_identifier(name)?;

        let url = self.endpoint.api_url("api/delete");
        let response = self
            .http
            .delete(url)
            .json(&ModelNameRequest { name })
            .timeout(DELETE_TIMEOUT)
            .send()
            .await
            .map_err(TransportError::from_reqwest)?;

        let status = response.status();
        if status.is_success() {
            self.validator.security_log().record("model deleted", name);
            return Ok(true);
        }
        if status == StatusCode::NOT_FOUND {
            debug!(model = name, "delete target not found");
            return Ok(false);
        }
        Err(rejection(response).await)
    }

    /// Send a chat exchange and return the full reply.
    ///
    /// With `on_chunk` the reply is streamed and every visible fragment is
    /// handed to the sink as it arrives; without it a single request and
    /// response are used. `suppress_reasoning` asks the server to hide
    /// reasoning and also filters it locally.
    pub async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        on_chunk: Option<&mut ChunkSink<'_>>,
        suppress_reasoning: bool,
        cancel: &CancellationToken,
    ) -> Result<String, TransportError> {
        self.validator.validate_model_identifier(model)?;

        let request = ChatRequest {
            model,
            messages,
            stream: on_chunk.is_some(),
            options: suppress_reasoning.then(ChatOptions::suppress_reasoning),
        };
        let body = serde_json::to_vec(&request)
            .map_err(|err| TransportError::Protocol(err.to_string()))?;
        self.validator
            .validate_payload_size(body.len(), &format!("chat request for {model}"))?;

        let url = self.endpoint.api_url("api/chat");
        let builder = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .timeout(CHAT_TIMEOUT);

        tokio::select! {
            result = self.run_chat(builder, on_chunk, suppress_reasoning) => result,
            _ = cancel.cancelled() => Err(TransportError::Cancelled),
        }
    }

    async fn run_chat(
        &self,
        request: RequestBuilder,
        on_chunk: Option<&mut ChunkSink<'_>>,
        suppress_reasoning: bool,
    ) -> Result<String, TransportError> {
        let response = self.send(request).await?;

        let Some(on_chunk) = on_chunk else {
            let reply: ChatResponse = response.json().await.map_err(|err| {
                TransportError::Protocol(format!("malformed chat response: {err}"))
            })?;
            let content = reply.message.content;
            return Ok(if suppress_reasoning {
                filter_thinking(&content)
            } else {
                content
            });
        };

        let mut filter = suppress_reasoning.then(ThinkingFilter::new);
        let mut accumulated = String::new();
        let mut records = std::pin::pin!(parse_records(response.bytes_stream()));
        while let Some(record) = records.next().await {
            match record.map_err(TransportError::from_reqwest)? {
                ProtocolRecord::Content { content, .. } => {
                    let visible = match filter.as_mut() {
                        Some(filter) => filter.push(&content),
                        None => content,
                    };
                    if !visible.is_empty() {
                        on_chunk(&visible);
                        accumulated.push_str(&visible);
                    }
                }
                ProtocolRecord::Failure(message) => {
                    return Err(TransportError::Rejected {
                        status: None,
                        message,
                    });
                }
                ProtocolRecord::Progress(_) => {}
            }
        }

        match filter.as_mut() {
            Some(filter) => {
                let tail = filter.finish();
                if !tail.is_empty() {
                    on_chunk(&tail);
                    accumulated.push_str(&tail);
                }
                Ok(normalize_whitespace(&accumulated))
            }
            None => Ok(accumulated),
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, TransportError> {
        let response = request
            .send()
            .await
            .map_err(TransportError::from_reqwest)?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(rejection(response).await)
        }
    }
}

async fn rejection(response: Response) -> TransportError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = summarize_error_body(&body);
    warn!(status = %status, error = %message, "request rejected");
    TransportError::Rejected {
        status: Some(status.as_u16()),
        message,
    }
}

/// One-line summary of an error body. Ollama answers `{"error": "..."}`.
fn summarize_error_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    let summary = serde_json::from_str::<serde_json::Value>(trimmed)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .or_else(|| value.get("error"))
                .or_else(|| value.get("message"))
                .and_then(|v| v.as_str())
                .map(str::to_owned)
        })
        .unwrap_or_else(|| trimmed.to_string());

    let collapsed = summary.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.char_indices().nth(200) {
        Some((cut, _)) => format!("{}…", &collapsed[..cut]),
        None => collapsed,
    }
}
