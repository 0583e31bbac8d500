//! The seam between the game and whichever model narrates it.
//!
//! [`LlmBridge`] hides the provider: the session hands it a system prompt and
//! the recent conversation and gets back a stream of text fragments. Two
//! implementations ship: [`OllamaBridge`] for a local server and
//! [`ClaudeBridge`] for the hosted API.

use async_trait::async_trait;
use futures::future;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

use claude::{Claude, StreamEvent};
use ollama::{ChatMessage, Ollama};

use crate::config::{BridgeConfig, Provider};
use crate::prompt::{ChatTurn, Speaker};

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Claude(#[from] claude::Error),

    #[error(transparent)]
    Ollama(#[from] ollama::Error),

    #[error("LLM bridge not configured: {0}")]
    NotConfigured(String),

    #[error("Stream error: {0}")]
    Stream(String),
}

/// Text fragments of one reply, in order.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, BridgeError>> + Send>>;

#[async_trait]
pub trait LlmBridge: Send + Sync {
    fn provider(&self) -> Provider;

    fn model(&self) -> &str;

    /// Models the provider can serve.
    async fn list_models(&self) -> Result<Vec<String>, BridgeError>;

    async fn check_connection(&self) -> Result<(), BridgeError>;

    /// Start streaming a reply to `history` under the `system` prompt.
    async fn stream_reply(
        &self,
        system: &str,
        history: &[ChatTurn],
    ) -> Result<TextStream, BridgeError>;
}

/// Build the bridge `config` asks for.
pub fn connect(config: &BridgeConfig) -> Result<Arc<dyn LlmBridge>, BridgeError> {
    match config.provider {
        Provider::Ollama => {
            let client = Ollama::new(&config.ollama_base_url, &config.ollama_model);
            tracing::info!(url = %client.base_url(), model = %client.model(), "Using Ollama");
            Ok(Arc::new(OllamaBridge::new(client)))
        }
        Provider::Claude => {
            let key = config.claude_api_key.as_deref().ok_or_else(|| {
                BridgeError::NotConfigured("ANTHROPIC_API_KEY is not set".to_string())
            })?;
            let client = Claude::new(key).with_model(&config.claude_model);
            tracing::info!(model = %client.model(), "Using Claude");
            Ok(Arc::new(
                ClaudeBridge::new(client)
                    .with_max_tokens(config.max_tokens)
                    .with_temperature(config.temperature),
            ))
        }
    }
}

/// Collapse runs of same-speaker turns so roles alternate. The hosted API
/// also insists the first turn is the player's.
fn alternate(history: &[ChatTurn]) -> Vec<ChatTurn> {
    let mut turns: Vec<ChatTurn> = Vec::with_capacity(history.len() + 1);
    for turn in history {
        match turns.last_mut() {
            Some(last) if last.speaker == turn.speaker => {
                last.text.push_str("\n\n");
                last.text.push_str(&turn.text);
            }
            _ => turns.push(turn.clone()),
        }
    }
    if turns.first().map(|t| t.speaker) != Some(Speaker::Player) {
        turns.insert(0, ChatTurn::player("Begin the session."));
    }
    turns
}

// ============================================================================
// Ollama
// ============================================================================

pub struct OllamaBridge {
    client: Ollama,
}

impl OllamaBridge {
    pub fn new(client: Ollama) -> Self {
        Self { client }
    }

    fn messages(system: &str, history: &[ChatTurn]) -> Vec<ChatMessage> {
        std::iter::once(ChatMessage::system(system))
            .chain(history.iter().map(|turn| match turn.speaker {
                Speaker::Player => ChatMessage::user(&turn.text),
                Speaker::Narrator => ChatMessage::assistant(&turn.text),
            }))
            .collect()
    }
}

#[async_trait]
impl LlmBridge for OllamaBridge {
    fn provider(&self) -> Provider {
        Provider::Ollama
    }

    fn model(&self) -> &str {
        self.client.model()
    }

    async fn list_models(&self) -> Result<Vec<String>, BridgeError> {
        Ok(self.client.list_models().await?)
    }

    async fn check_connection(&self) -> Result<(), BridgeError> {
        Ok(self.client.check_connection().await?)
    }

    async fn stream_reply(
        &self,
        system: &str,
        history: &[ChatTurn],
    ) -> Result<TextStream, BridgeError> {
        let chunks = self
            .client
            .chat_stream(Self::messages(system, history))
            .await?;

        let text = chunks.filter_map(|chunk| {
            future::ready(match chunk {
                Ok(chunk) if chunk.content.is_empty() => None,
                Ok(chunk) => Some(Ok(chunk.content)),
                Err(e) => Some(Err(BridgeError::from(e))),
            })
        });
        Ok(Box::pin(text))
    }
}

// ============================================================================
// Claude
// ============================================================================

pub struct ClaudeBridge {
    client: Claude,
    max_tokens: usize,
    temperature: Option<f32>,
}

impl ClaudeBridge {
    pub fn new(client: Claude) -> Self {
        Self {
            client,
            max_tokens: 4096,
            temperature: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    fn request(&self, system: &str, history: &[ChatTurn]) -> claude::Request {
        let messages = alternate(history)
            .into_iter()
            .map(|turn| match turn.speaker {
                Speaker::Player => claude::Message::user(turn.text),
                Speaker::Narrator => claude::Message::assistant(turn.text),
            })
            .collect();

        let request = claude::Request::new(messages)
            .with_system(system)
            .with_max_tokens(self.max_tokens);
        match self.temperature {
            Some(t) => request.with_temperature(t),
            None => request,
        }
    }
}

#[async_trait]
impl LlmBridge for ClaudeBridge {
    fn provider(&self) -> Provider {
        Provider::Claude
    }

    fn model(&self) -> &str {
        self.client.model()
    }

    async fn list_models(&self) -> Result<Vec<String>, BridgeError> {
        Ok(claude::KNOWN_MODELS.iter().map(|m| m.to_string()).collect())
    }

    async fn check_connection(&self) -> Result<(), BridgeError> {
        Ok(self.client.check_connection().await?)
    }

    async fn stream_reply(
        &self,
        system: &str,
        history: &[ChatTurn],
    ) -> Result<TextStream, BridgeError> {
        let events = self.client.stream(self.request(system, history)).await?;

        let text = events.filter_map(|event| {
            future::ready(match event {
                Ok(StreamEvent::TextDelta { text, .. }) => Some(Ok(text)),
                Ok(StreamEvent::Error { message }) => Some(Err(BridgeError::Stream(message))),
                Ok(_) => None,
                Err(e) => Some(Err(BridgeError::from(e))),
            })
        });
        Ok(Box::pin(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_claude_requires_key() {
        let config = BridgeConfig::new(Provider::Claude);
        let err = connect(&config).err().unwrap();
        assert!(matches!(err, BridgeError::NotConfigured(_)));
    }

    #[test]
    fn test_connect_picks_provider() {
        let ollama = connect(&BridgeConfig::new(Provider::Ollama)).unwrap();
        assert_eq!(ollama.provider(), Provider::Ollama);
        assert_eq!(ollama.model(), ollama::DEFAULT_MODEL);

        let config = BridgeConfig::new(Provider::Claude)
            .with_claude_key("sk-test")
            .with_claude_model("claude-3-5-haiku-20241022");
        let claude = connect(&config).unwrap();
        assert_eq!(claude.provider(), Provider::Claude);
        assert_eq!(claude.model(), "claude-3-5-haiku-20241022");
    }

    #[test]
    fn test_ollama_messages_lead_with_system() {
        let history = [ChatTurn::player("Hello"), ChatTurn::narrator("Greetings.")];
        let messages = OllamaBridge::messages("Be the DM.", &history);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0], ChatMessage::system("Be the DM."));
        assert_eq!(messages[1].role, "user");
        assert_eq!(messages[2].role, "assistant");
    }

    #[test]
    fn test_alternate_merges_and_starts_with_player() {
        let history = [
            ChatTurn::narrator("The cave mouth yawns."),
            ChatTurn::narrator("Water drips."),
            ChatTurn::player("I listen."),
            ChatTurn::player("Then I step in."),
        ];
        let turns = alternate(&history);
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].speaker, Speaker::Player);
        assert_eq!(turns[1].text, "The cave mouth yawns.\n\nWater drips.");
        assert_eq!(turns[2].text, "I listen.\n\nThen I step in.");
    }

    #[test]
    fn test_alternate_empty_history() {
        assert_eq!(alternate(&[]), vec![ChatTurn::player("Begin the session.")]);
    }

    #[tokio::test]
    async fn test_claude_lists_known_models() {
        let bridge = ClaudeBridge::new(Claude::new("sk-test"));
        let models = bridge.list_models().await.unwrap();
        assert_eq!(models.len(), claude::KNOWN_MODELS.len());
        assert!(models.contains(&claude::DEFAULT_MODEL.to_string()));
    }
}
