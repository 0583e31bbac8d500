//! The game store: the single owner of mutable session state.
//!
//! Holds the character roster, the loaded module and the player's progress
//! through it, the active encounter, the log and the last dice roll. All
//! mutation goes through methods on [`GameStore`]; invalid player commands
//! are answered with [`CommandOutcome::Rejected`] and a system log line,
//! never with an error.

mod encounter;
mod movement;
mod rolls;

pub use encounter::{
    ActiveEncounter, AttackOutcome, AttackReport, EnemyInstance, EnemyTurnOutcome,
    EnemyTurnTicket,
};
pub use movement::ModuleProgress;
pub use rolls::{extract_dc, SkillCheck};

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::adventure::{AdventureModule, Room};
use crate::character::{Character, CharacterId};
use crate::config::CombatRules;
use crate::dice::DieRoll;
use crate::log::GameLog;

/// Result of a player command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Applied,
    Rejected(String),
}

impl CommandOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, CommandOutcome::Applied)
    }
}

/// Something the player can do right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerAction {
    Move { direction: String },
    Attack { instance_id: Uuid, label: String },
    Flee,
}

impl fmt::Display for PlayerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerAction::Move { direction } => write!(f, "Go {direction}"),
            PlayerAction::Attack { label, .. } => f.write_str(label),
            PlayerAction::Flee => f.write_str("Flee"),
        }
    }
}

pub struct GameStore {
    rng: StdRng,
    rules: CombatRules,

    characters: Vec<Character>,
    current_character: Option<CharacterId>,

    module: Option<Arc<AdventureModule>>,
    progress: Option<ModuleProgress>,

    active_encounter: Option<ActiveEncounter>,
    pending_enemy_turns: VecDeque<EnemyTurnTicket>,
    /// Identifies the live encounter; bumped whenever one starts or ends.
    encounter_serial: u64,

    log: GameLog,
    last_roll: Option<DieRoll>,
    pending_roll_request: Option<String>,
}

impl GameStore {
    pub fn new(rules: CombatRules) -> Self {
        Self::with_rng(rules, StdRng::from_entropy())
    }

    pub fn seeded(rules: CombatRules, seed: u64) -> Self {
        Self::with_rng(rules, StdRng::seed_from_u64(seed))
    }

    fn with_rng(rules: CombatRules, rng: StdRng) -> Self {
        Self {
            rng,
            rules,
            characters: Vec::new(),
            current_character: None,
            module: None,
            progress: None,
            active_encounter: None,
            pending_enemy_turns: VecDeque::new(),
            encounter_serial: 0,
            log: GameLog::new(),
            last_roll: None,
            pending_roll_request: None,
        }
    }

    pub fn rules(&self) -> &CombatRules {
        &self.rules
    }

    pub fn log(&self) -> &GameLog {
        &self.log
    }

    pub fn log_mut(&mut self) -> &mut GameLog {
        &mut self.log
    }

    pub fn module(&self) -> Option<&Arc<AdventureModule>> {
        self.module.as_ref()
    }

    pub fn progress(&self) -> Option<&ModuleProgress> {
        self.progress.as_ref()
    }

    pub fn current_room(&self) -> Option<&Room> {
        let module = self.module.as_ref()?;
        let progress = self.progress.as_ref()?;
        module.room(&progress.current_room)
    }

    pub fn active_encounter(&self) -> Option<&ActiveEncounter> {
        self.active_encounter.as_ref()
    }

    pub fn in_combat(&self) -> bool {
        self.active_encounter.is_some()
    }

    pub fn last_roll(&self) -> Option<&DieRoll> {
        self.last_roll.as_ref()
    }

    pub fn pending_roll_request(&self) -> Option<&str> {
        self.pending_roll_request.as_deref()
    }

    // ========================================================================
    // Character roster
    // ========================================================================

    pub fn characters(&self) -> &[Character] {
        &self.characters
    }

    /// Add a character. The first character added becomes the selection.
    pub fn add_character(&mut self, mut character: Character) -> CharacterId {
        character.clamp_hp();
        let id = character.id;
        tracing::debug!(character = %character.name, %id, "Character added");
        self.characters.push(character);
        if self.current_character.is_none() {
            self.current_character = Some(id);
        }
        id
    }

    /// Replace the stored character with the same id. HP is clamped on the
    /// way in.
    pub fn update_character(&mut self, mut character: Character) -> CommandOutcome {
        character.clamp_hp();
        match self.characters.iter_mut().find(|c| c.id == character.id) {
            Some(slot) => {
                *slot = character;
                CommandOutcome::Applied
            }
            None => self.reject(format!("No character with id {}", character.id)),
        }
    }

    /// Remove a character; clears the selection if it was selected.
    pub fn delete_character(&mut self, id: CharacterId) -> CommandOutcome {
        let before = self.characters.len();
        self.characters.retain(|c| c.id != id);
        if self.characters.len() == before {
            return self.reject(format!("No character with id {id}"));
        }
        if self.current_character == Some(id) {
            self.current_character = None;
        }
        CommandOutcome::Applied
    }

    pub fn select_character(&mut self, id: CharacterId) -> CommandOutcome {
        if self.characters.iter().any(|c| c.id == id) {
            self.current_character = Some(id);
            CommandOutcome::Applied
        } else {
            self.reject(format!("No character with id {id}"))
        }
    }

    pub fn current_character(&self) -> Option<&Character> {
        let id = self.current_character?;
        self.characters.iter().find(|c| c.id == id)
    }

    fn current_character_mut(&mut self) -> Option<&mut Character> {
        let id = self.current_character?;
        self.characters.iter_mut().find(|c| c.id == id)
    }

    // ========================================================================
    // Shared helpers
    // ========================================================================

    /// Log a rejection and hand it back to the caller.
    fn reject(&mut self, reason: impl Into<String>) -> CommandOutcome {
        let reason = reason.into();
        tracing::warn!(%reason, "Command rejected");
        self.log.system(reason.clone());
        CommandOutcome::Rejected(reason)
    }

    /// What the player can do from the current state.
    pub fn available_actions(&self) -> Vec<PlayerAction> {
        if let Some(encounter) = &self.active_encounter {
            let mut actions: Vec<PlayerAction> = encounter
                .enemies()
                .iter()
                .map(|enemy| PlayerAction::Attack {
                    instance_id: enemy.instance_id,
                    label: format!("Attack {} ({}/{})", enemy.name, enemy.hp, enemy.max_hp),
                })
                .collect();
            actions.push(PlayerAction::Flee);
            return actions;
        }

        self.current_room()
            .map(|room| {
                room.exits
                    .keys()
                    .map(|direction| PlayerAction::Move {
                        direction: direction.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Default for GameStore {
    fn default() -> Self {
        Self::new(CombatRules::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::Role;

    #[test]
    fn test_first_character_is_selected() {
        let mut store = GameStore::default();
        let a = store.add_character(Character::new("Ash"));
        let b = store.add_character(Character::new("Bree"));
        assert_eq!(store.current_character().map(|c| c.id), Some(a));
        assert!(store.select_character(b).is_applied());
        assert_eq!(store.current_character().unwrap().name, "Bree");
    }

    #[test]
    fn test_delete_selected_character_clears_selection() {
        let mut store = GameStore::default();
        let a = store.add_character(Character::new("Ash"));
        assert!(store.delete_character(a).is_applied());
        assert!(store.current_character().is_none());
        assert!(!store.delete_character(a).is_applied());
    }

    #[test]
    fn test_update_character() {
        let mut store = GameStore::default();
        let id = store.add_character(Character::new("Ash"));
        let mut changed = store.current_character().unwrap().clone();
        changed.gold = 40;
        assert!(store.update_character(changed).is_applied());
        assert_eq!(store.current_character().unwrap().gold, 40);
        assert_eq!(store.characters().len(), 1);

        let stranger = Character::new("Nobody");
        let before = store.log().len();
        assert!(!store.update_character(stranger).is_applied());
        assert_eq!(store.current_character().unwrap().id, id);
        assert_eq!(store.log().len(), before + 1);
        assert_eq!(store.log().last().unwrap().role, Role::System);
    }

    #[test]
    fn test_update_character_clamps_hp() {
        let mut store = GameStore::default();
        store.add_character(Character::new("Ash").with_max_hp(10));

        let mut changed = store.current_character().unwrap().clone();
        changed.hp = changed.max_hp + 50;
        assert!(store.update_character(changed).is_applied());
        assert_eq!(store.current_character().unwrap().hp, 10);

        let mut changed = store.current_character().unwrap().clone();
        changed.hp = -7;
        store.update_character(changed);
        assert_eq!(store.current_character().unwrap().hp, 0);

        let mut changed = store.current_character().unwrap().clone();
        changed.max_hp = -3;
        store.update_character(changed);
        let stored = store.current_character().unwrap();
        assert_eq!((stored.hp, stored.max_hp), (0, 1));
    }

    #[test]
    fn test_added_character_is_clamped() {
        let mut store = GameStore::default();
        let mut hero = Character::new("Ash");
        hero.hp = 99;
        store.add_character(hero);
        assert_eq!(store.current_character().unwrap().hp, 10);
    }

    #[test]
    fn test_select_unknown_character() {
        let mut store = GameStore::default();
        assert!(!store.select_character(CharacterId::new()).is_applied());
    }

    #[test]
    fn test_no_actions_without_module() {
        assert!(GameStore::default().available_actions().is_empty());
    }
}
