//! Minimal Ollama client.
//!
//! Talks to a local Ollama server over its native API:
//! - `GET /api/tags` for connection checks and the model list
//! - `POST /api/chat` with `stream: true`, read back as newline-delimited JSON

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio_stream::Stream;

/// Default Ollama base URL.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Default chat model.
pub const DEFAULT_MODEL: &str = "mistral:latest";

#[derive(Debug, Error)]
pub enum Error {
    #[error("Ollama not reachable at {url}: {message}")]
    Unreachable { url: String, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Ollama API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),
}

/// A boxed stream of chat chunks.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatChunk, Error>> + Send>>;

/// Client for a local Ollama server.
#[derive(Clone)]
pub struct Ollama {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl Ollama {
    pub fn new(base_url: &str, model: &str) -> Self {
        // Local models can take a long while on the first token.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    /// Create a client from `OLLAMA_BASE_URL` and `OLLAMA_MODEL`, falling back to defaults.
    pub fn from_env() -> Self {
        let base_url =
            std::env::var("OLLAMA_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Self::new(&base_url, &model)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    /// Confirm the server answers `/api/tags`.
    pub async fn check_connection(&self) -> Result<(), Error> {
        self.tags().await.map(|_| ())
    }

    /// Names of the models installed on the server.
    pub async fn list_models(&self) -> Result<Vec<String>, Error> {
        let tags = self.tags().await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn tags(&self) -> Result<TagsResponse, Error> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Unreachable {
                url: self.base_url.clone(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Api { status, message });
        }

        response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))
    }

    /// Start a streaming chat. Each item carries one content fragment.
    pub async fn chat_stream(&self, messages: Vec<ChatMessage>) -> Result<ChunkStream, Error> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: true,
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Api { status, message });
        }

        let stream = response
            .bytes_stream()
            .scan(Vec::new(), |buffer, result| {
                let chunks = match result {
                    Ok(bytes) => {
                        buffer.extend_from_slice(&bytes);
                        parse_ndjson_buffered(buffer)
                    }
                    Err(e) => vec![Err(Error::Network(e.to_string()))],
                };
                futures::future::ready(Some(chunks))
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(stream))
    }

    /// Run a chat to completion and return the concatenated reply.
    pub async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, Error> {
        let mut stream = self.chat_stream(messages).await?;
        let mut reply = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            reply.push_str(&chunk.content);
            if chunk.done {
                break;
            }
        }
        Ok(reply)
    }
}

impl Default for Ollama {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL, DEFAULT_MODEL)
    }
}

/// One message of a chat transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// A fragment of a streamed reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatChunk {
    pub content: String,
    pub done: bool,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ChatLine {
    #[serde(default)]
    message: Option<ChatLineMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatLineMessage {
    #[serde(default)]
    content: String,
}

/// Consume every complete line in `buffer`. Lines that are not valid JSON are skipped.
fn parse_ndjson_buffered(buffer: &mut Vec<u8>) -> Vec<Result<ChatChunk, Error>> {
    let mut chunks = Vec::new();

    while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
        let line = String::from_utf8_lossy(&buffer[..newline_pos]).into_owned();
        let line = line.trim();
        if !line.is_empty() {
            if let Ok(parsed) = serde_json::from_str::<ChatLine>(line) {
                if let Some(error) = parsed.error {
                    chunks.push(Err(Error::Api {
                        status: 200,
                        message: error,
                    }));
                } else {
                    chunks.push(Ok(ChatChunk {
                        content: parsed.message.map(|m| m.content).unwrap_or_default(),
                        done: parsed.done,
                    }));
                }
            }
        }
        buffer.drain(..=newline_pos);
    }

    chunks
}
