use anyhow::Context;
use hello_vim_protocol::{ChatRequest, FileOperation, FileResponse, Reply, Request};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;

use crate::completion::Completer;
use crate::fs_ops;
use crate::outbox::Outbox;

/// Routes one input line at a time. Nothing is remembered between lines;
/// each chat request carries its whole conversation.
pub struct Dispatcher<C> {
    completer: C,
    outbox: Outbox,
    cancel: CancellationToken,
}

impl<C: Completer> Dispatcher<C> {
    pub fn new(completer: C, outbox: Outbox, cancel: CancellationToken) -> Self {
        Self {
            completer,
            outbox,
            cancel,
        }
    }

    /// Process lines until end of input, a read error, or cancellation.
    pub async fn run<R: AsyncBufRead + Unpin>(&self, mut reader: R) -> anyhow::Result<()> {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let n = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(()),
                read = reader.read_until(b'\n', &mut buf) => read.context("read input")?,
            };
            if n == 0 {
                return Ok(());
            }

            match std::str::from_utf8(&buf) {
                Ok(line) => self.handle_line(line).await,
                Err(err) => tracing::warn!(error = %err, "input line is not valid UTF-8; skipping"),
            }
        }
    }

    pub async fn handle_line(&self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        tracing::debug!(line, "received input");

        let env = match hello_vim_protocol::decode(line) {
            Ok(env) => env,
            Err(err) => {
                tracing::warn!(error = %err, "error parsing message; skipping");
                return;
            }
        };
        let request = match Request::try_from(env) {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!(error = %err, "error parsing request content; skipping");
                return;
            }
        };

        match request {
            Request::Chat(req) => self.chat(req).await,
            Request::File(op) => self.file(op).await,
            Request::Ping(content) => self.outbox.send_or_log(&Reply::Pong(content)).await,
            Request::Unrecognized { r#type, .. } => {
                tracing::warn!(kind = %r#type, "unknown message type");
            }
        }
    }

    async fn chat(&self, req: ChatRequest) {
        tracing::debug!(
            has_system_prompt = !req.system_prompt.is_empty(),
            messages = req.messages.len(),
            "processing chat request"
        );

        let created = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return,
            created = self.completer.create_completion(&req) => created,
        };
        let mut stream = match created {
            Ok(stream) => stream,
            Err(err) => {
                tracing::warn!(error = %err, "error creating chat completion");
                self.outbox.send_or_log(&Reply::Error(err.to_string())).await;
                return;
            }
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::debug!("chat completion cancelled");
                    break;
                }
                next = stream.recv() => next,
            };
            match next {
                Some(Ok(text)) => self.outbox.send_or_log(&Reply::Response(text)).await,
                Some(Err(err)) => {
                    tracing::warn!(error = %err, "error receiving response");
                    self.outbox.send_or_log(&Reply::Error(err.to_string())).await;
                    break;
                }
                None => break,
            }
        }
        stream.close();
    }

    async fn file(&self, op: FileOperation) {
        tracing::debug!(op = %op.operation, path = %op.path, "processing file operation");

        let response = match tokio::task::spawn_blocking(move || fs_ops::handle(&op)).await {
            Ok(response) => response,
            Err(err) => FileResponse::failure(format!("file operation aborted: {err}")),
        };
        if let Some(err) = &response.error {
            tracing::debug!(error = %err, "file operation failed");
        }
        self.outbox.send_or_log(&Reply::FileResponse(response)).await;
    }
}
