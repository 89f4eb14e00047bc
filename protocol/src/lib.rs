use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod payload;

pub use payload::{ChatMessage, ChatRequest, FileOperation, FileResponse};

/// Content of the `status` envelope written once the bridge is ready.
pub const STARTED: &str = "hello-vim-plugin started";

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("invalid envelope: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("invalid {kind} content: {source}")]
    Content {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("encode envelope: {0}")]
    Encode(#[source] serde_json::Error),
}

/// One line of the wire protocol before its content is interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub r#type: String,
    #[serde(default)]
    pub content: Value,
}

impl Envelope {
    pub fn new(r#type: impl Into<String>, content: Value) -> Self {
        Self {
            r#type: r#type.into(),
            content,
        }
    }
}

/// Editor-originated envelope with its content decoded by type.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Chat(ChatRequest),
    File(FileOperation),
    Ping(Value),
    /// Any other type; the payload is kept untouched.
    Unrecognized { r#type: String, content: Value },
}

impl TryFrom<Envelope> for Request {
    type Error = CodecError;

    fn try_from(env: Envelope) -> Result<Self, Self::Error> {
        let Envelope { r#type, content } = env;
        match r#type.as_str() {
            "chat" => content_or_default(content)
                .map(Request::Chat)
                .map_err(|source| CodecError::Content { kind: r#type, source }),
            "file" => content_or_default(content)
                .map(Request::File)
                .map_err(|source| CodecError::Content { kind: r#type, source }),
            "ping" => Ok(Request::Ping(content)),
            _ => Ok(Request::Unrecognized { r#type, content }),
        }
    }
}

/// Missing or `null` content decodes as the zero value.
fn content_or_default<T: DeserializeOwned + Default>(content: Value) -> Result<T, serde_json::Error> {
    if content.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(content)
}

/// Envelopes written back to the editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum Reply {
    Status(String),
    /// One streamed completion fragment.
    Response(String),
    FileResponse(FileResponse),
    Pong(Value),
    /// A chat request failed; sent after any fragments already streamed.
    Error(String),
}

impl Reply {
    pub fn kind(&self) -> &'static str {
        match self {
            Reply::Status(_) => "status",
            Reply::Response(_) => "response",
            Reply::FileResponse(_) => "file_response",
            Reply::Pong(_) => "pong",
            Reply::Error(_) => "error",
        }
    }
}

/// Parse a single input line into an envelope.
pub fn decode(line: &str) -> Result<Envelope, CodecError> {
    serde_json::from_str(line).map_err(CodecError::Decode)
}

/// Serialize a reply as one newline-terminated JSON line.
pub fn encode(reply: &Reply) -> Result<String, CodecError> {
    let mut line = serde_json::to_string(reply).map_err(CodecError::Encode)?;
    line.push('\n');
    Ok(line)
}
