//! Module loading, movement between rooms and progress bookkeeping.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{CommandOutcome, GameStore};
use crate::adventure::{AdventureModule, EncounterId, ModuleReport, ObjectiveId, RoomId};
use crate::character::InventoryItem;

/// Where the player is in the loaded module and what they have done there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleProgress {
    pub module_id: String,
    pub current_room: RoomId,
    /// Append-once: an id is never added twice nor removed.
    pub defeated_encounters: Vec<EncounterId>,
    pub visited_rooms: Vec<RoomId>,
    pub completed_objectives: Vec<ObjectiveId>,
    pub collected_items: Vec<String>,
}

impl ModuleProgress {
    fn start(module: &AdventureModule, start: RoomId) -> Self {
        Self {
            module_id: module.id.clone(),
            current_room: start.clone(),
            defeated_encounters: Vec::new(),
            visited_rooms: vec![start],
            completed_objectives: Vec::new(),
            collected_items: Vec::new(),
        }
    }

    pub fn is_defeated(&self, encounter: &EncounterId) -> bool {
        self.defeated_encounters.contains(encounter)
    }

    pub fn has_visited(&self, room: &RoomId) -> bool {
        self.visited_rooms.contains(room)
    }

    pub fn is_completed(&self, objective: &ObjectiveId) -> bool {
        self.completed_objectives.contains(objective)
    }

    pub(super) fn mark_defeated(&mut self, encounter: &EncounterId) {
        if !self.is_defeated(encounter) {
            self.defeated_encounters.push(encounter.clone());
        }
    }

    fn mark_visited(&mut self, room: &RoomId) {
        if !self.has_visited(room) {
            self.visited_rooms.push(room.clone());
        }
    }
}

impl GameStore {
    /// Start `module` from its first room, discarding all prior progress,
    /// combat and log entries.
    pub fn load_module(&mut self, module: Arc<AdventureModule>) -> CommandOutcome {
        let Some(start) = module.start_room() else {
            return self.reject(format!("Module {} has no rooms to start in.", module.title));
        };

        let report = ModuleReport::for_module(&module);
        for error in &report.errors {
            tracing::warn!(module = %module.id, %error, "Module validation");
        }
        if !report.unreachable.is_empty() {
            tracing::warn!(module = %module.id, rooms = ?report.unreachable, "Unreachable rooms");
        }

        self.end_encounter();
        self.progress = Some(ModuleProgress::start(&module, start.id.clone()));

        self.log.reset(format!("Loaded module: {}", module.title));
        self.log.dm(format!("{}. {}", module.title, module.summary));
        self.log.dm(format!("{}\n{}", start.name, start.description));

        tracing::info!(module = %module.id, start = %start.id, "Module loaded");
        self.module = Some(module);
        CommandOutcome::Applied
    }

    /// Take the exit labelled `direction` from the current room.
    pub fn move_to(&mut self, direction: &str) -> CommandOutcome {
        if self.in_combat() {
            return self.reject("You can't leave while enemies remain. Attack or flee!");
        }
        let Some(module) = self.module.clone() else {
            return self.reject("No adventure module is loaded.");
        };
        let Some(current) = self.progress.as_ref().map(|p| p.current_room.clone()) else {
            return self.reject("No adventure module is loaded.");
        };
        let Some(here) = module.room(&current) else {
            return self.reject(format!("Current room {current} is missing."));
        };
        let Some(dest_id) = here.exit(direction) else {
            return self.reject(format!("You cannot go {direction}."));
        };
        let Some(dest) = module.room(dest_id) else {
            tracing::error!(from = %here.id, %direction, to = %dest_id, "Exit leads to unknown room");
            return self.reject(format!("The way {direction} leads nowhere ({dest_id} is missing)."));
        };

        let defeated = match self.progress.as_mut() {
            Some(progress) => {
                progress.current_room = dest.id.clone();
                progress.mark_visited(&dest.id);
                dest.encounter
                    .as_ref()
                    .is_some_and(|e| progress.is_defeated(e))
            }
            None => false,
        };

        tracing::debug!(from = %here.id, to = %dest.id, %direction, "Moved");
        self.log.player(format!("I go {direction}."));
        self.log.dm(format!("{}\n{}", dest.name, dest.description));

        if let Some(encounter) = &dest.encounter {
            if !defeated {
                self.start_encounter(encounter);
            }
        }
        CommandOutcome::Applied
    }

    /// Mark an objective of the loaded module as done.
    pub fn complete_objective(&mut self, id: &ObjectiveId) -> CommandOutcome {
        let Some(module) = self.module.clone() else {
            return self.reject("No adventure module is loaded.");
        };
        let Some(objective) = module.objective(id) else {
            return self.reject(format!("Unknown objective: {id}"));
        };
        let Some(progress) = self.progress.as_mut() else {
            return self.reject("No adventure module is loaded.");
        };
        if progress.is_completed(id) {
            return CommandOutcome::Applied;
        }
        progress.completed_objectives.push(id.clone());
        tracing::info!(objective = %id, "Objective completed");
        self.log.system(format!("Objective complete: {}", objective.text));
        CommandOutcome::Applied
    }

    /// Pick up an item the module defines. It goes into the selected
    /// character's inventory when there is one.
    pub fn collect_item(&mut self, item_id: &str) -> CommandOutcome {
        let Some(module) = self.module.clone() else {
            return self.reject("No adventure module is loaded.");
        };
        let Some(item) = module.items.iter().find(|i| i.id == item_id) else {
            return self.reject(format!("Unknown item: {item_id}"));
        };
        let Some(progress) = self.progress.as_mut() else {
            return self.reject("No adventure module is loaded.");
        };
        if progress.collected_items.iter().any(|i| i == item_id) {
            return self.reject(format!("{} is already collected.", item.name));
        }
        progress.collected_items.push(item.id.clone());
        if let Some(character) = self.current_character_mut() {
            character.inventory.push(InventoryItem::new(item.name.clone()));
        }
        self.log.system(format!("Collected {}.", item.name));
        CommandOutcome::Applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adventure::{goblin_cave, Room};
    use crate::log::Role;

    fn corridor() -> Arc<AdventureModule> {
        Arc::new(AdventureModule {
            id: "corridor".to_string(),
            title: "Corridor".to_string(),
            summary: "A long hall.".to_string(),
            level_range: (1, 1),
            rooms: vec![
                Room::new("a", "West End", "Dust.").with_exit("east", "b"),
                Room::new("b", "East End", "More dust.")
                    .with_exit("west", "a")
                    .with_exit("hole", "void"),
            ],
            encounters: Vec::new(),
            npcs: Vec::new(),
            containers: Vec::new(),
            items: Vec::new(),
            objectives: Vec::new(),
            rules: None,
        })
    }

    #[test]
    fn test_load_resets_everything() {
        let mut store = GameStore::default();
        store.load_module(corridor());
        store.move_to("east");
        store.load_module(corridor());

        let progress = store.progress().unwrap();
        assert_eq!(progress.current_room, RoomId::new("a"));
        assert!(progress.defeated_encounters.is_empty());
        assert_eq!(progress.visited_rooms, vec![RoomId::new("a")]);

        let log = store.log().entries();
        assert_eq!(log[0].role, Role::System);
        assert_eq!(log.iter().filter(|e| e.role == Role::System).count(), 1);
        assert!(log.iter().any(|e| e.text.contains("West End")));
    }

    #[test]
    fn test_load_empty_module_rejected() {
        let mut store = GameStore::default();
        let mut module = (*corridor()).clone();
        module.rooms.clear();
        assert!(!store.load_module(Arc::new(module)).is_applied());
        assert!(store.module().is_none());
    }

    #[test]
    fn test_move_along_exit() {
        let mut store = GameStore::default();
        store.load_module(corridor());
        assert!(store.move_to("east").is_applied());
        assert_eq!(store.current_room().unwrap().name, "East End");
        assert!(store.progress().unwrap().has_visited(&RoomId::new("b")));
    }

    #[test]
    fn test_missing_exit_rejected() {
        let mut store = GameStore::default();
        store.load_module(corridor());
        let before = store.log().len();
        let outcome = store.move_to("up");
        assert_eq!(outcome, CommandOutcome::Rejected("You cannot go up.".to_string()));
        assert_eq!(store.current_room().unwrap().id, RoomId::new("a"));
        assert_eq!(store.log().len(), before + 1);
    }

    #[test]
    fn test_dangling_exit_rejected() {
        let mut store = GameStore::default();
        store.load_module(corridor());
        store.move_to("east");
        assert!(!store.move_to("hole").is_applied());
        assert_eq!(store.current_room().unwrap().id, RoomId::new("b"));
    }

    #[test]
    fn test_move_without_module() {
        let mut store = GameStore::default();
        assert!(!store.move_to("east").is_applied());
        assert_eq!(store.log().len(), 1);
    }

    #[test]
    fn test_objectives_complete_once() {
        let mut store = GameStore::default();
        store.load_module(Arc::new(goblin_cave()));
        let id = ObjectiveId::new("spare-snikk");
        assert!(store.complete_objective(&id).is_applied());
        assert!(store.complete_objective(&id).is_applied());
        assert_eq!(store.progress().unwrap().completed_objectives, vec![id]);
        assert!(!store
            .complete_objective(&ObjectiveId::new("burn-it-all"))
            .is_applied());
    }

    #[test]
    fn test_collect_item_goes_to_inventory() {
        let mut store = GameStore::default();
        store.add_character(crate::character::Character::new("Ash"));
        store.load_module(Arc::new(goblin_cave()));
        assert!(store.collect_item("torch-bundle").is_applied());
        assert!(!store.collect_item("torch-bundle").is_applied());
        assert!(!store.collect_item("crown").is_applied());
        let hero = store.current_character().unwrap();
        assert_eq!(hero.inventory[0].name, "Bundle of Torches");
    }
}
