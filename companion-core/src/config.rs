//! Session and LLM bridge configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unknown LLM provider '{0}' (expected 'ollama' or 'claude')")]
    UnknownProvider(String),
}

// ============================================================================
// Combat rules
// ============================================================================

/// How an enemy hit turns into damage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnemyDamage {
    /// Every hit deals this much.
    Fixed(i32),
    /// Roll the attack's damage notation; a notation that fails to parse
    /// falls back to the contained amount.
    Notation { fallback: i32 },
}

impl Default for EnemyDamage {
    fn default() -> Self {
        EnemyDamage::Fixed(3)
    }
}

/// Numbers the combat resolver falls back on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CombatRules {
    /// Player attack bonus when no character is selected.
    pub fallback_attack_bonus: i32,
    /// Armor class enemies attack when no character is selected.
    pub fallback_armor_class: i32,
    pub enemy_damage: EnemyDamage,
}

impl Default for CombatRules {
    fn default() -> Self {
        Self {
            fallback_attack_bonus: 2,
            fallback_armor_class: 10,
            enemy_damage: EnemyDamage::default(),
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// Configuration for a game session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long after a player attack the enemy answers.
    pub enemy_turn_delay: Duration,

    pub rules: CombatRules,

    /// Seed for the session RNG. `None` seeds from entropy.
    pub rng_seed: Option<u64>,

    pub bridge: BridgeConfig,
}

impl SessionConfig {
    pub fn new() -> Self {
        Self {
            enemy_turn_delay: Duration::from_secs(1),
            rules: CombatRules::default(),
            rng_seed: None,
            bridge: BridgeConfig::default(),
        }
    }

    pub fn with_enemy_turn_delay(mut self, delay: Duration) -> Self {
        self.enemy_turn_delay = delay;
        self
    }

    pub fn with_fallback_attack_bonus(mut self, bonus: i32) -> Self {
        self.rules.fallback_attack_bonus = bonus;
        self
    }

    pub fn with_fallback_armor_class(mut self, ac: i32) -> Self {
        self.rules.fallback_armor_class = ac;
        self
    }

    pub fn with_enemy_damage(mut self, damage: EnemyDamage) -> Self {
        self.rules.enemy_damage = damage;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    pub fn with_bridge(mut self, bridge: BridgeConfig) -> Self {
        self.bridge = bridge;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// LLM bridge
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Provider {
    #[default]
    Ollama,
    Claude,
}

impl FromStr for Provider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" | "local" => Ok(Provider::Ollama),
            "claude" | "anthropic" => Ok(Provider::Claude),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Provider::Ollama => "ollama",
            Provider::Claude => "claude",
        })
    }
}

/// Which LLM backend narrates, and how to reach it.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    pub provider: Provider,
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub claude_api_key: Option<String>,
    pub claude_model: String,
    pub max_tokens: usize,
    pub temperature: f32,
}

impl BridgeConfig {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            ollama_base_url: ollama::DEFAULT_BASE_URL.to_string(),
            ollama_model: ollama::DEFAULT_MODEL.to_string(),
            claude_api_key: None,
            claude_model: claude::DEFAULT_MODEL.to_string(),
            max_tokens: 4096,
            temperature: 0.7,
        }
    }

    /// Read `COMPANION_LLM_PROVIDER`, `OLLAMA_BASE_URL`, `OLLAMA_MODEL`,
    /// `ANTHROPIC_API_KEY` and `CLAUDE_MODEL`. Unset variables keep defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let provider = match std::env::var("COMPANION_LLM_PROVIDER") {
            Ok(value) if !value.trim().is_empty() => value.parse()?,
            _ => Provider::default(),
        };

        let mut config = Self::new(provider);
        if let Ok(url) = std::env::var("OLLAMA_BASE_URL") {
            config.ollama_base_url = url;
        }
        if let Ok(model) = std::env::var("OLLAMA_MODEL") {
            config.ollama_model = model;
        }
        config.claude_api_key = std::env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());
        if let Ok(model) = std::env::var("CLAUDE_MODEL") {
            config.claude_model = model;
        }
        Ok(config)
    }

    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_ollama(mut self, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        self.ollama_base_url = base_url.into();
        self.ollama_model = model.into();
        self
    }

    pub fn with_claude_key(mut self, api_key: impl Into<String>) -> Self {
        self.claude_api_key = Some(api_key.into());
        self
    }

    pub fn with_claude_model(mut self, model: impl Into<String>) -> Self {
        self.claude_model = model.into();
        self
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::new(Provider::default())
    }
}
