//! Referential-integrity checks over an [`AdventureModule`].

use std::collections::HashSet;

use super::{AdventureModule, RoomId};

/// Check every cross-reference in `module`.
///
/// Never fails: each problem becomes one human-readable line and all checks
/// run regardless of earlier findings. An empty list means the module is sound.
pub fn validate(module: &AdventureModule) -> Vec<String> {
    let mut errors = Vec::new();

    let room_ids: HashSet<&str> = module.rooms.iter().map(|r| r.id.as_str()).collect();
    let encounter_ids: HashSet<&str> = module.encounters.iter().map(|e| e.id.as_str()).collect();
    let npc_ids: HashSet<&str> = module.npcs.iter().map(|n| n.id.as_str()).collect();
    let container_ids: HashSet<&str> = module.containers.iter().map(|c| c.id.as_str()).collect();
    let item_ids: HashSet<&str> = module.items.iter().map(|i| i.id.as_str()).collect();

    if module.rooms.is_empty() {
        errors.push(format!("Module {} has no rooms.", module.id));
    }
    if room_ids.len() != module.rooms.len() {
        let mut seen = HashSet::new();
        for room in &module.rooms {
            if !seen.insert(room.id.as_str()) {
                errors.push(format!("Room id {} is used more than once.", room.id));
            }
        }
    }

    for room in &module.rooms {
        for dest in room.exits.values() {
            if !room_ids.contains(dest.as_str()) {
                errors.push(format!("Room {} exits to missing room: {}", room.id, dest));
            }
        }
        if let Some(encounter) = &room.encounter {
            if !encounter_ids.contains(encounter.as_str()) {
                errors.push(format!(
                    "Room {} references missing encounter: {}",
                    room.id, encounter
                ));
            }
        }
        for npc in &room.npcs {
            if !npc_ids.contains(npc.as_str()) {
                errors.push(format!("Room {} references missing NPC: {}", room.id, npc));
            }
        }
        for item in &room.items {
            if !item_ids.contains(item.as_str()) && !container_ids.contains(item.as_str()) {
                errors.push(format!(
                    "Room {} references missing item or container: {}",
                    room.id, item
                ));
            }
        }
        for secret in &room.secrets {
            if secret.check.as_ref().is_some_and(|c| c.dc <= 0) {
                errors.push(format!("Room {} has invalid DC in a secret.", room.id));
            }
        }
    }

    for encounter in &module.encounters {
        if encounter.enemies.is_empty() {
            errors.push(format!("Encounter {} has no enemies.", encounter.id));
        }
        for enemy in &encounter.enemies {
            if enemy.stats.ac <= 0 || enemy.stats.hp <= 0 {
                errors.push(format!(
                    "Encounter {} enemy {} has incomplete stats.",
                    encounter.id, enemy.name
                ));
            }
        }
        for treasure in &encounter.treasure {
            if !is_loose_currency(treasure) && !item_ids.contains(treasure.as_str()) {
                errors.push(format!(
                    "Encounter {} treasure references missing item: {}",
                    encounter.id, treasure
                ));
            }
        }
    }

    for container in &module.containers {
        for content in &container.contents {
            if !is_loose_currency(content) && !item_ids.contains(content.as_str()) {
                errors.push(format!(
                    "Container {} contents reference missing item: {}",
                    container.id, content
                ));
            }
        }
    }

    for objective in &module.objectives {
        if objective.text.trim().is_empty() {
            errors.push(format!("Objective {} has no text.", objective.id));
        }
    }

    errors
}

/// Coin entries such as `"50 gp"` need no item definition.
fn is_loose_currency(entry: &str) -> bool {
    entry.ends_with("gp")
}

/// Validator findings plus reachability, as logged when a module loads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleReport {
    pub errors: Vec<String>,
    /// Rooms no path from the start room leads to. Not an error.
    pub unreachable: Vec<RoomId>,
}

impl ModuleReport {
    pub fn for_module(module: &AdventureModule) -> Self {
        Self {
            errors: validate(module),
            unreachable: module.unreachable_rooms(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adventure::{
        Check, Container, Encounter, EncounterEnemyRef, ItemDef, Objective, Room, Secret,
        StatBlock,
    };
    use crate::character::Skill;
    use std::sync::Arc;

    fn base() -> AdventureModule {
        AdventureModule {
            id: "test".to_string(),
            title: "Test".to_string(),
            summary: String::new(),
            level_range: (1, 2),
            rooms: vec![
                Room::new("a", "A", "").with_exit("east", "b"),
                Room::new("b", "B", "").with_exit("west", "a"),
            ],
            encounters: Vec::new(),
            npcs: Vec::new(),
            containers: Vec::new(),
            items: vec![ItemDef::new("key", "Key", "")],
            objectives: vec![Objective::new("win", "Win.")],
            rules: None,
        }
    }

    #[test]
    fn test_clean_module() {
        assert!(validate(&base()).is_empty());
        assert!(ModuleReport::for_module(&base()).is_valid());
    }

    #[test]
    fn test_every_exit_must_resolve() {
        let mut module = base();
        module.rooms[1] = Room::new("b", "B", "").with_exit("down", "cellar");
        assert_eq!(validate(&module), vec!["Room b exits to missing room: cellar"]);
    }

    #[test]
    fn test_errors_accumulate() {
        let mut module = base();
        module.rooms[0] = Room::new("a", "A", "")
            .with_exit("east", "b")
            .with_encounter("ghost")
            .with_npc("nobody")
            .with_items(["lamp"])
            .with_secret(Secret {
                description: "x".to_string(),
                check: Some(Check {
                    skill: Skill::Perception,
                    dc: 0,
                }),
            });
        module.objectives.push(Objective::new("blank", "   "));

        let errors = validate(&module);
        assert_eq!(errors.len(), 5, "{errors:?}");
        assert!(errors.contains(&"Room a references missing encounter: ghost".to_string()));
        assert!(errors.contains(&"Room a references missing NPC: nobody".to_string()));
        assert!(errors.contains(&"Room a references missing item or container: lamp".to_string()));
        assert!(errors.contains(&"Room a has invalid DC in a secret.".to_string()));
        assert!(errors.contains(&"Objective blank has no text.".to_string()));
    }

    #[test]
    fn test_encounter_checks() {
        let mut module = base();
        module.encounters.push(Encounter::new("empty", "Empty", ""));
        module.encounters.push(
            Encounter::new("broken", "Broken", "")
                .with_enemy(EncounterEnemyRef::new("Paper Goblin", Arc::new(StatBlock::new(12, 0))))
                .with_treasure(["12 gp", "key", "crown"]),
        );

        let errors = validate(&module);
        assert_eq!(
            errors,
            vec![
                "Encounter empty has no enemies.",
                "Encounter broken enemy Paper Goblin has incomplete stats.",
                "Encounter broken treasure references missing item: crown",
            ]
        );
    }

    #[test]
    fn test_container_loose_currency() {
        let mut module = base();
        module.containers.push(Container {
            id: "chest".to_string(),
            name: "Chest".to_string(),
            description: String::new(),
            lock: None,
            contents: vec!["50 gp".to_string(), "key".to_string(), "gem".to_string()],
        });
        module.rooms[1] = module.rooms[1].clone().with_items(["chest"]);

        assert_eq!(
            validate(&module),
            vec!["Container chest contents reference missing item: gem"]
        );
    }

    #[test]
    fn test_empty_and_duplicate_rooms() {
        let mut module = base();
        module.rooms.clear();
        assert_eq!(validate(&module), vec!["Module test has no rooms."]);

        let mut module = base();
        module.rooms.push(Room::new("a", "Again", ""));
        assert_eq!(validate(&module), vec!["Room id a is used more than once."]);
    }
}
