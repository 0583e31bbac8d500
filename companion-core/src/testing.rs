//! Fixtures for exercising the store and the session without a model.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::adventure::{
    AdventureModule, AttackBlock, DamageType, Encounter, EncounterEnemyRef, Room, StatBlock,
};
use crate::bridge::{BridgeError, LlmBridge, TextStream};
use crate::character::{AbilityScores, Character};
use crate::config::{CombatRules, Provider};
use crate::prompt::ChatTurn;
use crate::store::GameStore;

/// Rooms `A --east--> B`; `B` holds encounter `e1`, a single bandit with
/// 5 HP and AC 10.
pub fn two_room_module() -> AdventureModule {
    let bandit = StatBlock::new(10, 5).with_attack(AttackBlock::new(
        "Club",
        3,
        "1d4+1",
        DamageType::Bludgeoning,
    ));

    AdventureModule {
        id: "two-rooms".to_string(),
        title: "Two Rooms".to_string(),
        summary: "A hallway and a bandit.".to_string(),
        level_range: (1, 1),
        rooms: vec![
            Room::new("A", "Hallway", "A narrow hallway.").with_exit("east", "B"),
            Room::new("B", "Guard Room", "A bandit leans on a table.")
                .with_exit("west", "A")
                .with_encounter("e1"),
        ],
        encounters: vec![Encounter::new("e1", "Lone Bandit", "The bandit draws a club.")
            .with_enemy(EncounterEnemyRef::new("Bandit", Arc::new(bandit)))],
        npcs: Vec::new(),
        containers: Vec::new(),
        items: Vec::new(),
        objectives: Vec::new(),
        rules: None,
    }
}

/// Level 17 with STR 20: +11 to hit, 1d8+5 damage. Never misses AC 10 and
/// always drops a 5 HP enemy.
pub fn sure_hit_character() -> Character {
    Character::new("Vala")
        .with_identity("Human", "Fighter", "Soldier")
        .with_level(17)
        .with_abilities(AbilityScores::new(20, 14, 16, 10, 12, 10))
        .with_max_hp(150)
        .with_armor_class(18)
}

/// A seeded store plus shortcuts for reaching common states.
pub struct TestHarness {
    pub store: GameStore,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_rules(CombatRules::default())
    }

    pub fn with_rules(rules: CombatRules) -> Self {
        Self {
            store: GameStore::seeded(rules, 42),
        }
    }

    pub fn with_module(mut self, module: AdventureModule) -> Self {
        self.store.load_module(Arc::new(module));
        self
    }

    pub fn with_character(mut self, character: Character) -> Self {
        self.store.add_character(character);
        self
    }

    /// Instance ids of the enemies still standing.
    pub fn enemy_ids(&self) -> Vec<Uuid> {
        self.store
            .active_encounter()
            .map(|e| e.enemies().iter().map(|x| x.instance_id).collect())
            .unwrap_or_default()
    }

    pub fn room_id(&self) -> Option<&str> {
        self.store.progress().map(|p| p.current_room.as_str())
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

enum Script {
    Reply(Vec<String>),
    Fail(String),
    Stall,
}

/// A bridge that answers every request from a script and remembers what it
/// was asked.
pub struct ScriptedBridge {
    script: Script,
    prompts: Mutex<Vec<(String, Vec<ChatTurn>)>>,
}

impl ScriptedBridge {
    /// Stream `chunks` in order, then finish.
    pub fn replying<S: Into<String>>(chunks: impl IntoIterator<Item = S>) -> Self {
        Self::new(Script::Reply(chunks.into_iter().map(Into::into).collect()))
    }

    /// Fail every request with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self::new(Script::Fail(message.into()))
    }

    /// Accept the request and never produce anything.
    pub fn stalled() -> Self {
        Self::new(Script::Stall)
    }

    fn new(script: Script) -> Self {
        Self {
            script,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// System prompt and history of every request so far.
    pub fn prompts(&self) -> Vec<(String, Vec<ChatTurn>)> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmBridge for ScriptedBridge {
    fn provider(&self) -> Provider {
        Provider::Ollama
    }

    fn model(&self) -> &str {
        "scripted"
    }

    async fn list_models(&self) -> Result<Vec<String>, BridgeError> {
        Ok(vec!["scripted".to_string()])
    }

    async fn check_connection(&self) -> Result<(), BridgeError> {
        Ok(())
    }

    async fn stream_reply(
        &self,
        system: &str,
        history: &[ChatTurn],
    ) -> Result<TextStream, BridgeError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push((system.to_string(), history.to_vec()));
        }
        match &self.script {
            Script::Reply(chunks) => {
                let items: Vec<Result<String, BridgeError>> =
                    chunks.iter().cloned().map(Ok).collect();
                Ok(Box::pin(futures::stream::iter(items)))
            }
            Script::Fail(message) => Err(BridgeError::Stream(message.clone())),
            Script::Stall => Ok(Box::pin(futures::stream::pending())),
        }
    }
}
