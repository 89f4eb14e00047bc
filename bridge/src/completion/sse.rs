//! Server-sent events from the chat-completions endpoint.
//!
//! Only `data:` lines matter: each carries one JSON chunk, and the literal
//! `[DONE]` marks the end of the completion.

use futures_util::{Stream, StreamExt};
use serde::Deserialize;

use super::CompletionError;

/// Buffers raw body bytes and hands back the payload of every complete
/// `data:` line. Bytes are only decoded once a full line is present, so a
/// UTF-8 sequence split across network reads stays intact.
#[derive(Debug, Default)]
pub struct SseLines {
    buf: Vec<u8>,
}

impl SseLines {
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if let Some(data) = data_payload(&line[..pos]) {
                out.push(data);
            }
        }
        out
    }

    /// Payload of a final line that arrived without a newline.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        data_payload(&rest)
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let line = String::from_utf8_lossy(line);
    let data = line.strip_prefix("data:")?;
    Some(data.strip_prefix(' ').unwrap_or(data).to_string())
}

#[derive(Debug, PartialEq)]
pub enum SseData {
    Text(String),
    /// Role announcements, empty deltas, finish markers.
    Skip,
    Done,
}

#[derive(Deserialize)]
struct ChunkBody {
    #[serde(default)]
    choices: Vec<Choice>,
    error: Option<ApiErrorBody>,
}

#[derive(Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ApiErrorBody,
}

pub fn parse_payload(data: &str) -> Result<SseData, CompletionError> {
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(SseData::Done);
    }
    if data.is_empty() {
        return Ok(SseData::Skip);
    }

    let body: ChunkBody = serde_json::from_str(data)?;
    if let Some(err) = body.error {
        return Err(CompletionError::Stream(err.message));
    }
    match body.choices.into_iter().next().and_then(|c| c.delta.content) {
        Some(text) if !text.is_empty() => Ok(SseData::Text(text)),
        _ => Ok(SseData::Skip),
    }
}

/// Pull the `message` out of an API error body, falling back to the raw text.
pub fn api_error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(env) => env.error.message,
        Err(_) => body.trim().to_string(),
    }
}

/// Turn a response body into the sequence of non-empty text deltas.
pub fn text_chunks<S, B, E>(body: S) -> impl Stream<Item = Result<String, CompletionError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Send,
    CompletionError: From<E>,
{
    async_stream::try_stream! {
        futures_util::pin_mut!(body);
        let mut lines = SseLines::default();
        let mut done = false;

        'read: while let Some(bytes) = body.next().await {
            let bytes = bytes?;
            for data in lines.feed(bytes.as_ref()) {
                match parse_payload(&data)? {
                    SseData::Text(text) => yield text,
                    SseData::Skip => {}
                    SseData::Done => {
                        done = true;
                        break 'read;
                    }
                }
            }
        }

        if !done {
            if let Some(data) = lines.finish() {
                if let SseData::Text(text) = parse_payload(&data)? {
                    yield text;
                }
            }
        }
    }
}
