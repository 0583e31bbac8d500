//! Tabletop RPG companion engine.
//!
//! This crate provides:
//! - Adventure modules with a reference validator and the bundled Goblin Cave
//! - Characters, derived stats and dice
//! - The game store: movement, progress and the encounter state machine
//! - A narrator bridge to a local Ollama server or the Claude API
//! - A session actor that ties it together on a tokio task
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use companion_core::{adventure::goblin_cave, GameSession, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = GameSession::spawn(SessionConfig::new(), Some(Arc::new(goblin_cave())), None);
//!     let mut events = session.subscribe();
//!
//!     session.move_to("east").await?;
//!     while let Ok(event) = events.try_recv() {
//!         println!("{event:?}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod adventure;
pub mod bridge;
pub mod character;
pub mod config;
pub mod dice;
pub mod log;
pub mod prompt;
pub mod session;
pub mod store;
pub mod testing;

// Primary public API
pub use adventure::{goblin_cave, validate, AdventureModule, ModuleReport};
pub use bridge::{connect, BridgeError, LlmBridge};
pub use character::{Character, Skill};
pub use config::{BridgeConfig, CombatRules, Provider, SessionConfig};
pub use log::{GameLog, LogEntry, Role};
pub use session::{GameSession, SessionError, SessionEvent, SessionHandle};
pub use store::{CommandOutcome, GameStore, PlayerAction};
pub use testing::{ScriptedBridge, TestHarness};
