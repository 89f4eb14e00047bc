use hello_vim_protocol::Reply;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

type Sink = Box<dyn AsyncWrite + Send + Unpin>;

/// Line writer for outgoing envelopes. Each reply is written and flushed
/// under one lock, so lines from different tasks never interleave.
#[derive(Clone)]
pub struct Outbox {
    sink: Arc<Mutex<Sink>>,
}

impl Outbox {
    pub fn new(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub async fn send(&self, reply: &Reply) -> anyhow::Result<()> {
        let line = hello_vim_protocol::encode(reply)?;
        tracing::debug!(line = %line.trim_end(), "sending");

        let mut sink = self.sink.lock().await;
        sink.write_all(line.as_bytes()).await?;
        sink.flush().await?;
        Ok(())
    }

    /// Send and log failures; stdout errors never stop the bridge.
    pub async fn send_or_log(&self, reply: &Reply) {
        if let Err(err) = self.send(reply).await {
            tracing::warn!(error = %err, kind = reply.kind(), "failed to send reply");
        }
    }
}
