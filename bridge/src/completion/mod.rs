use anyhow::Context;
use futures_util::{Stream, StreamExt};
use hello_vim_protocol::{ChatMessage, ChatRequest};
use serde::Serialize;
use std::pin::Pin;

use crate::config::Config;

pub mod sse;

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("chat completion transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("chat completion error (HTTP {status}): {message}")]
    Api { status: u16, message: String },
    #[error("chat completion stream error: {0}")]
    Stream(String),
    #[error("invalid chat completion chunk: {0}")]
    Decode(#[from] serde_json::Error),
}

type ChunkStream = Pin<Box<dyn Stream<Item = Result<String, CompletionError>> + Send>>;

/// A started completion: a finite, non-restartable sequence of text
/// fragments. The underlying response is released by [`close`](Self::close),
/// on the first error or end of stream, or when the handle is dropped.
pub struct CompletionStream {
    inner: Option<ChunkStream>,
}

impl CompletionStream {
    pub fn new(stream: impl Stream<Item = Result<String, CompletionError>> + Send + 'static) -> Self {
        Self {
            inner: Some(Box::pin(stream)),
        }
    }

    /// Next fragment; `None` once the stream has ended, failed or been closed.
    pub async fn recv(&mut self) -> Option<Result<String, CompletionError>> {
        let stream = self.inner.as_mut()?;
        let next = stream.next().await;
        if !matches!(next, Some(Ok(_))) {
            self.inner = None;
        }
        next
    }

    pub fn close(mut self) {
        self.inner.take();
    }
}

#[async_trait::async_trait]
pub trait Completer: Send + Sync {
    async fn create_completion(&self, req: &ChatRequest) -> Result<CompletionStream, CompletionError>;
}

/// System prompt first when present, then the conversation in order.
pub fn build_messages(req: &ChatRequest) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(req.messages.len() + 1);
    if !req.system_prompt.is_empty() {
        messages.push(ChatMessage::system(req.system_prompt.clone()));
    }
    messages.extend(req.messages.iter().cloned());
    messages
}

#[derive(Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    stream: bool,
}

pub struct CompletionClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl CompletionClient {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("hello-vim-plugin/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build http client")?;
        Ok(Self {
            http,
            endpoint: format!(
                "{}/chat/completions",
                cfg.base_url.as_str().trim_end_matches('/')
            ),
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait::async_trait]
impl Completer for CompletionClient {
    async fn create_completion(&self, req: &ChatRequest) -> Result<CompletionStream, CompletionError> {
        let body = CompletionBody {
            model: &self.model,
            messages: build_messages(req),
            temperature: 0.0,
            stream: true,
        };
        tracing::debug!(model = %self.model, messages = ?body.messages, "creating chat completion");

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(CompletionError::Api {
                status: status.as_u16(),
                message: sse::api_error_message(&text),
            });
        }

        Ok(CompletionStream::new(sse::text_chunks(resp.bytes_stream())))
    }
}
