//! Minimal Anthropic Claude API client.
//!
//! This crate provides a focused client for Claude's Messages API with:
//! - Text completions (used for connection checks)
//! - Streaming completions with buffered SSE parsing
//! - Model selection

use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio_stream::Stream;

const API_BASE: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

/// Model used when neither the client nor the request names one.
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";

/// Models offered in the model picker.
pub const KNOWN_MODELS: [&str; 3] = [
    "claude-3-5-sonnet-20241022",
    "claude-3-5-haiku-20241022",
    "claude-3-opus-20240229",
];

/// Errors that can occur when using the Claude client.
#[derive(Debug, Error)]
pub enum Error {
    #[error("API key not configured")]
    NoApiKey,

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// A boxed stream of server-sent events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, Error>> + Send>>;

/// Claude API client.
#[derive(Clone)]
pub struct Claude {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl Claude {
    /// Create a new Claude client with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Create a Claude client from the ANTHROPIC_API_KEY environment variable.
    pub fn from_env() -> Result<Self, Error> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| Error::NoApiKey)?;
        if api_key.trim().is_empty() {
            return Err(Error::NoApiKey);
        }
        Ok(Self::new(api_key))
    }

    /// Set the default model for this client.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// The model requests fall back to.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a completion request and return the full response.
    pub async fn complete(&self, request: Request) -> Result<Response, Error> {
        let response = self.post(&request, false).await?;

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))?;

        Ok(parse_response(api_response))
    }

    /// Send a tiny request to confirm the key and model are accepted.
    pub async fn check_connection(&self) -> Result<(), Error> {
        let request = Request::new(vec![Message::user("test")]).with_max_tokens(10);
        self.complete(request).await.map(|_| ())
    }

    /// Send a completion request and stream the response.
    pub async fn stream(&self, request: Request) -> Result<EventStream, Error> {
        let response = self.post(&request, true).await?;

        // Keep a buffer across chunks: an SSE line may be split between two reads.
        let stream = response
            .bytes_stream()
            .scan(Vec::new(), |buffer, result| {
                let events = match result {
                    Ok(bytes) => {
                        buffer.extend_from_slice(&bytes);
                        parse_sse_events_buffered(buffer)
                    }
                    Err(e) => vec![Err(Error::Network(e.to_string()))],
                };
                futures::future::ready(Some(events))
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(stream))
    }

    async fn post(&self, request: &Request, stream: bool) -> Result<reqwest::Response, Error> {
        let api_request = self.build_api_request(request, stream);
        let headers = self.build_headers()?;

        let response = self
            .client
            .post(format!("{API_BASE}/messages"))
            .headers(headers)
            .json(&api_request)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Api { status, message });
        }

        Ok(response)
    }

    fn build_headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key)
                .map_err(|e| Error::Config(format!("Invalid API key: {e}")))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        Ok(headers)
    }

    fn build_api_request(&self, request: &Request, stream: bool) -> ApiRequest {
        ApiRequest {
            model: request.model.clone().unwrap_or_else(|| self.model.clone()),
            max_tokens: request.max_tokens,
            system: request.system.clone(),
            messages: request
                .messages
                .iter()
                .map(|m| ApiMessage {
                    role: m.role.as_str(),
                    content: m.content.clone(),
                })
                .collect(),
            temperature: request.temperature,
            stream,
        }
    }
}

// ============================================================================
// Public types
// ============================================================================

/// A completion request to send to Claude.
#[derive(Debug, Clone)]
pub struct Request {
    pub model: Option<String>,
    pub max_tokens: usize,
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub temperature: Option<f32>,
}

impl Request {
    /// Create a new request with the given messages.
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            model: None,
            max_tokens: 4096,
            system: None,
            messages,
            temperature: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// A text message in the conversation.
#[derive(Debug, Clone)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
        }
    }
}

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A completion response from Claude.
#[derive(Debug, Clone)]
pub struct Response {
    pub id: String,
    pub model: String,
    pub text: String,
    pub stop_reason: StopReason,
    pub usage: Usage,
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
}

impl StopReason {
    fn parse(s: &str) -> Self {
        match s {
            "max_tokens" => StopReason::MaxTokens,
            "stop_sequence" => StopReason::StopSequence,
            _ => StopReason::EndTurn,
        }
    }
}

/// Token usage information.
#[derive(Debug, Clone)]
pub struct Usage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// Events from a streaming response.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    MessageStart { id: String, model: String },
    TextDelta { index: usize, text: String },
    ContentBlockStop { index: usize },
    MessageDelta { stop_reason: Option<StopReason> },
    MessageStop,
    Ping,
    Error { message: String },
}

// ============================================================================
// Internal API types
// ============================================================================

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    id: String,
    model: String,
    content: Vec<ApiContent>,
    stop_reason: Option<String>,
    usage: ApiUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiContent {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    input_tokens: usize,
    output_tokens: usize,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiStreamEvent {
    MessageStart { message: ApiMessageStart },
    ContentBlockStart { index: usize },
    ContentBlockDelta { index: usize, delta: ApiDelta },
    ContentBlockStop { index: usize },
    MessageDelta { delta: ApiMessageDelta },
    MessageStop,
    Ping,
    Error { error: ApiError },
}

#[derive(Debug, Deserialize)]
struct ApiMessageStart {
    id: String,
    model: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiDelta {
    TextDelta {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ApiMessageDelta {
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

fn parse_response(api_response: ApiResponse) -> Response {
    let text = api_response
        .content
        .into_iter()
        .filter_map(|c| match c {
            ApiContent::Text { text } => Some(text),
            ApiContent::Other => None,
        })
        .collect::<Vec<_>>()
        .join("");

    Response {
        id: api_response.id,
        model: api_response.model,
        text,
        stop_reason: api_response
            .stop_reason
            .as_deref()
            .map(StopReason::parse)
            .unwrap_or(StopReason::EndTurn),
        usage: Usage {
            input_tokens: api_response.usage.input_tokens,
            output_tokens: api_response.usage.output_tokens,
        },
    }
}

/// Parse SSE events from a buffer, consuming complete lines and leaving a
/// trailing partial line for the next chunk.
fn parse_sse_events_buffered(buffer: &mut Vec<u8>) -> Vec<Result<StreamEvent, Error>> {
    let mut events = Vec::new();

    while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
        let line = String::from_utf8_lossy(&buffer[..newline_pos]).into_owned();
        let line = line.trim_end_matches('\r');

        if let Some(json_str) = line.strip_prefix("data: ") {
            if json_str == "[DONE]" {
                events.push(Ok(StreamEvent::MessageStop));
            } else if !json_str.is_empty() {
                match serde_json::from_str::<ApiStreamEvent>(json_str) {
                    Ok(event) => {
                        if let Some(event) = convert_stream_event(event) {
                            events.push(Ok(event));
                        }
                    }
                    Err(e) => events.push(Err(Error::Parse(format!("SSE parse error: {e}")))),
                }
            }
        }
        // event: lines, blank separators and comments carry nothing we need

        buffer.drain(..=newline_pos);
    }

    events
}

fn convert_stream_event(event: ApiStreamEvent) -> Option<StreamEvent> {
    let event = match event {
        ApiStreamEvent::MessageStart { message } => StreamEvent::MessageStart {
            id: message.id,
            model: message.model,
        },
        ApiStreamEvent::ContentBlockStart { .. } => return None,
        ApiStreamEvent::ContentBlockDelta { index, delta } => match delta {
            ApiDelta::TextDelta { text } => StreamEvent::TextDelta { index, text },
            ApiDelta::Other => return None,
        },
        ApiStreamEvent::ContentBlockStop { index } => StreamEvent::ContentBlockStop { index },
        ApiStreamEvent::MessageDelta { delta } => StreamEvent::MessageDelta {
            stop_reason: delta.stop_reason.as_deref().map(StopReason::parse),
        },
        ApiStreamEvent::MessageStop => StreamEvent::MessageStop,
        ApiStreamEvent::Ping => StreamEvent::Ping,
        ApiStreamEvent::Error { error } => StreamEvent::Error {
            message: error.message,
        },
    };
    Some(event)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = Claude::new("test-key");
        assert_eq!(client.model(), DEFAULT_MODEL);
    }

    #[test]
    fn test_client_with_model() {
        let client = Claude::new("test-key").with_model("claude-3-opus-20240229");
        assert_eq!(client.model(), "claude-3-opus-20240229");
    }

    #[test]
    fn test_request_builder() {
        let request = Request::new(vec![Message::user("Hello")])
            .with_system("You are the Dungeon Master")
            .with_max_tokens(1000)
            .with_temperature(0.7);

        assert_eq!(request.max_tokens, 1000);
        assert!(request.system.is_some());
        assert_eq!(request.temperature, Some(0.7));
    }

    #[test]
    fn test_api_request_uses_client_model_by_default() {
        let client = Claude::new("k").with_model("claude-3-5-haiku-20241022");
        let request = Request::new(vec![Message::user("hi"), Message::assistant("hello")]);
        let api = client.build_api_request(&request, true);
        assert_eq!(api.model, "claude-3-5-haiku-20241022");
        assert_eq!(api.messages[1].role, "assistant");
        assert!(api.stream);
    }

    #[test]
    fn test_sse_text_delta() {
        let mut buffer = Vec::from(
            "event: content_block_delta\n\
             data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"The goblin\"}}\n\n",
        );
        let events = parse_sse_events_buffered(&mut buffer);
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].as_ref().ok(),
            Some(&StreamEvent::TextDelta {
                index: 0,
                text: "The goblin".to_string()
            })
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_sse_split_across_chunks() {
        let mut buffer = Vec::from("data: {\"type\":\"message_st");
        assert!(parse_sse_events_buffered(&mut buffer).is_empty());
        assert!(!buffer.is_empty());

        buffer.extend_from_slice(b"op\"}\n");
        let events = parse_sse_events_buffered(&mut buffer);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Ok(StreamEvent::MessageStop)));
    }

    #[test]
    fn test_sse_multibyte_split_across_chunks() {
        let line = "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"The dragon’s café 🐉\"}}\n";
        let split = line.find('’').unwrap() + 1;
        let (first, second) = line.as_bytes().split_at(split);

        let mut buffer = first.to_vec();
        assert!(parse_sse_events_buffered(&mut buffer).is_empty());
        buffer.extend_from_slice(second);
        let events = parse_sse_events_buffered(&mut buffer);
        assert_eq!(
            events[0].as_ref().ok(),
            Some(&StreamEvent::TextDelta {
                index: 0,
                text: "The dragon’s café 🐉".to_string()
            })
        );
    }

    #[test]
    fn test_sse_error_event() {
        let mut buffer =
            Vec::from("data: {\"type\":\"error\",\"error\":{\"message\":\"overloaded\"}}\n");
        let events = parse_sse_events_buffered(&mut buffer);
        assert!(matches!(
            &events[0],
            Ok(StreamEvent::Error { message }) if message == "overloaded"
        ));
    }
}
