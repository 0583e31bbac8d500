//! Adventure module data model.
//!
//! A module is hand-authored, immutable data: rooms joined by named exits,
//! encounter templates, NPCs, containers, items and objectives. It is shared
//! read-only (behind an `Arc`) once loaded into a store.

mod goblin_cave;
mod validate;

pub use goblin_cave::goblin_cave;
pub use validate::{validate, ModuleReport};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::character::Skill;

// ============================================================================
// IDs
// ============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Key of a room within its module.
    RoomId
);
string_id!(
    /// Key of an encounter template within its module.
    EncounterId
);
string_id!(NpcId);
string_id!(ObjectiveId);

// ============================================================================
// Module
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdventureModule {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub level_range: (u32, u32),
    pub rooms: Vec<Room>,
    #[serde(default)]
    pub encounters: Vec<Encounter>,
    #[serde(default)]
    pub npcs: Vec<Npc>,
    #[serde(default)]
    pub containers: Vec<Container>,
    #[serde(default)]
    pub items: Vec<ItemDef>,
    #[serde(default)]
    pub objectives: Vec<Objective>,
    #[serde(default)]
    pub rules: Option<ModuleRules>,
}

impl AdventureModule {
    /// The room play starts in.
    pub fn start_room(&self) -> Option<&Room> {
        self.rooms.first()
    }

    pub fn room(&self, id: &RoomId) -> Option<&Room> {
        self.rooms.iter().find(|r| &r.id == id)
    }

    pub fn encounter(&self, id: &EncounterId) -> Option<&Encounter> {
        self.encounters.iter().find(|e| &e.id == id)
    }

    pub fn npc(&self, id: &NpcId) -> Option<&Npc> {
        self.npcs.iter().find(|n| &n.id == id)
    }

    pub fn objective(&self, id: &ObjectiveId) -> Option<&Objective> {
        self.objectives.iter().find(|o| &o.id == id)
    }

    /// Display name for an item or container id, if the module defines it.
    pub fn thing_name(&self, id: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|i| i.id == id)
            .map(|i| i.name.as_str())
            .or_else(|| {
                self.containers
                    .iter()
                    .find(|c| c.id == id)
                    .map(|c| c.name.as_str())
            })
    }

    /// Room ids reachable from `start` in depth-first order, exits taken in
    /// direction order. Each room appears once even when the graph has cycles.
    /// Exits to unknown rooms are skipped.
    pub fn traverse(&self, start: &RoomId) -> Vec<RoomId> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![start.clone()];

        while let Some(id) = stack.pop() {
            let Some(room) = self.room(&id) else {
                continue;
            };
            if !visited.insert(id.clone()) {
                continue;
            }
            order.push(id);
            // Reverse so the first exit is explored first.
            for dest in room.exits.values().rev() {
                if !visited.contains(dest) {
                    stack.push(dest.clone());
                }
            }
        }

        order
    }

    /// Rooms that cannot be reached from the start room.
    pub fn unreachable_rooms(&self) -> Vec<RoomId> {
        let Some(start) = self.start_room() else {
            return Vec::new();
        };
        let reached: HashSet<RoomId> = self.traverse(&start.id).into_iter().collect();
        self.rooms
            .iter()
            .filter(|r| !reached.contains(&r.id))
            .map(|r| r.id.clone())
            .collect()
    }
}

// ============================================================================
// Rooms
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Light {
    Bright,
    #[default]
    Dim,
    Dark,
}

impl fmt::Display for Light {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Light::Bright => "bright",
            Light::Dim => "dim",
            Light::Dark => "dark",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub light: Light,
    #[serde(default)]
    pub ambient: Option<String>,
    /// Free-form direction label to destination room.
    #[serde(default)]
    pub exits: BTreeMap<String, RoomId>,
    /// Item and container ids found here.
    #[serde(default)]
    pub items: Vec<String>,
    #[serde(default)]
    pub npcs: Vec<NpcId>,
    #[serde(default)]
    pub encounter: Option<EncounterId>,
    #[serde(default)]
    pub secrets: Vec<Secret>,
    /// DC to move through unnoticed.
    #[serde(default)]
    pub stealth_dc: Option<i32>,
}

impl Room {
    pub fn new(id: impl Into<String>, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: RoomId::new(id),
            name: name.into(),
            description: description.into(),
            light: Light::default(),
            ambient: None,
            exits: BTreeMap::new(),
            items: Vec::new(),
            npcs: Vec::new(),
            encounter: None,
            secrets: Vec::new(),
            stealth_dc: None,
        }
    }

    pub fn with_light(mut self, light: Light) -> Self {
        self.light = light;
        self
    }

    pub fn with_ambient(mut self, ambient: impl Into<String>) -> Self {
        self.ambient = Some(ambient.into());
        self
    }

    pub fn with_stealth_dc(mut self, dc: i32) -> Self {
        self.stealth_dc = Some(dc);
        self
    }

    pub fn with_exit(mut self, direction: impl Into<String>, to: impl Into<String>) -> Self {
        self.exits.insert(direction.into(), RoomId::new(to));
        self
    }

    pub fn with_items<S: Into<String>>(mut self, items: impl IntoIterator<Item = S>) -> Self {
        self.items.extend(items.into_iter().map(Into::into));
        self
    }

    pub fn with_npc(mut self, npc: impl Into<String>) -> Self {
        self.npcs.push(NpcId::new(npc));
        self
    }

    pub fn with_encounter(mut self, encounter: impl Into<String>) -> Self {
        self.encounter = Some(EncounterId::new(encounter));
        self
    }

    pub fn with_secret(mut self, secret: Secret) -> Self {
        self.secrets.push(secret);
        self
    }

    pub fn exit(&self, direction: &str) -> Option<&RoomId> {
        self.exits.get(direction)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Check {
    pub skill: Skill,
    pub dc: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    pub description: String,
    #[serde(default)]
    pub check: Option<Check>,
}

impl Secret {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            check: None,
        }
    }

    pub fn gated(mut self, skill: Skill, dc: i32) -> Self {
        self.check = Some(Check { skill, dc });
        self
    }
}

// ============================================================================
// Encounters and stat blocks
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DamageType {
    Bludgeoning,
    Piercing,
    Slashing,
    Fire,
    Cold,
    Poison,
}

impl fmt::Display for DamageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DamageType::Bludgeoning => "bludgeoning",
            DamageType::Piercing => "piercing",
            DamageType::Slashing => "slashing",
            DamageType::Fire => "fire",
            DamageType::Cold => "cold",
            DamageType::Poison => "poison",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackBlock {
    pub name: String,
    pub bonus: i32,
    /// Die notation such as `1d6+2`.
    pub damage_dice: String,
    pub damage_type: DamageType,
}

impl AttackBlock {
    pub fn new(name: &str, bonus: i32, damage_dice: &str, damage_type: DamageType) -> Self {
        Self {
            name: name.to_string(),
            bonus,
            damage_dice: damage_dice.to_string(),
            damage_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatBlock {
    pub ac: i32,
    /// Maximum and starting hit points.
    pub hp: i32,
    #[serde(default)]
    pub attacks: Vec<AttackBlock>,
    #[serde(default)]
    pub skills: BTreeMap<Skill, i32>,
    #[serde(default)]
    pub traits: Vec<String>,
}

impl StatBlock {
    pub fn new(ac: i32, hp: i32) -> Self {
        Self {
            ac,
            hp,
            attacks: Vec::new(),
            skills: BTreeMap::new(),
            traits: Vec::new(),
        }
    }

    pub fn with_attack(mut self, attack: AttackBlock) -> Self {
        self.attacks.push(attack);
        self
    }

    pub fn with_skill(mut self, skill: Skill, bonus: i32) -> Self {
        self.skills.insert(skill, bonus);
        self
    }

    pub fn with_trait(mut self, text: &str) -> Self {
        self.traits.push(text.to_string());
        self
    }
}

/// One line of an encounter roster: a named template, spawned `count` times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncounterEnemyRef {
    pub name: String,
    pub stats: Arc<StatBlock>,
    #[serde(default)]
    pub count: Option<u32>,
}

impl EncounterEnemyRef {
    pub fn new(name: impl Into<String>, stats: Arc<StatBlock>) -> Self {
        Self {
            name: name.into(),
            stats,
            count: None,
        }
    }

    pub fn times(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    /// Number of instances to spawn; unset means one.
    pub fn count(&self) -> u32 {
        self.count.unwrap_or(1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Encounter {
    pub id: EncounterId,
    pub name: String,
    pub description: String,
    pub enemies: Vec<EncounterEnemyRef>,
    #[serde(default)]
    pub tactics: Option<String>,
    #[serde(default)]
    pub stealth_avoid_dc: Option<i32>,
    /// Item ids or loose currency such as `"12 gp"`.
    #[serde(default)]
    pub treasure: Vec<String>,
}

impl Encounter {
    pub fn new(id: impl Into<String>, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: EncounterId::new(id),
            name: name.into(),
            description: description.into(),
            enemies: Vec::new(),
            tactics: None,
            stealth_avoid_dc: None,
            treasure: Vec::new(),
        }
    }

    pub fn with_enemy(mut self, enemy: EncounterEnemyRef) -> Self {
        self.enemies.push(enemy);
        self
    }

    pub fn with_tactics(mut self, tactics: impl Into<String>) -> Self {
        self.tactics = Some(tactics.into());
        self
    }

    pub fn with_stealth_avoid_dc(mut self, dc: i32) -> Self {
        self.stealth_avoid_dc = Some(dc);
        self
    }

    pub fn with_treasure<S: Into<String>>(mut self, treasure: impl IntoIterator<Item = S>) -> Self {
        self.treasure.extend(treasure.into_iter().map(Into::into));
        self
    }

    /// Total instances this template spawns.
    pub fn enemy_count(&self) -> u32 {
        self.enemies.iter().map(EncounterEnemyRef::count).sum()
    }
}

// ============================================================================
// NPCs, containers, items, objectives
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    Friendly,
    Neutral,
    Wary,
    Hostile,
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Disposition::Friendly => "friendly",
            Disposition::Neutral => "neutral",
            Disposition::Wary => "wary",
            Disposition::Hostile => "hostile",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Npc {
    pub id: NpcId,
    pub name: String,
    pub role: String,
    pub disposition: Disposition,
    #[serde(default)]
    pub motivations: Vec<String>,
    #[serde(default)]
    pub dialogue: Vec<DialogueLine>,
    #[serde(default)]
    pub stats: Option<Arc<StatBlock>>,
}

/// A canned line an NPC says when the conversation hits `cue`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueLine {
    pub cue: String,
    pub line: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    /// Item id of the key that opens it.
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub pick_dc: Option<i32>,
    #[serde(default)]
    pub force_dc: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub lock: Option<Lock>,
    /// Item ids or loose currency.
    #[serde(default)]
    pub contents: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDef {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub value_gp: Option<u32>,
}

impl ItemDef {
    pub fn new(id: &str, name: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            value_gp: None,
        }
    }

    pub fn worth(mut self, gp: u32) -> Self {
        self.value_gp = Some(gp);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Objective {
    pub id: ObjectiveId,
    pub text: String,
    /// Plain-language completion condition for the narrator.
    #[serde(default)]
    pub done_if: Option<String>,
}

impl Objective {
    pub fn new(id: &str, text: &str) -> Self {
        Self {
            id: ObjectiveId::new(id),
            text: text.to_string(),
            done_if: None,
        }
    }

    pub fn done_if(mut self, condition: &str) -> Self {
        self.done_if = Some(condition.to_string());
        self
    }
}

/// Table guidance specific to a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRules {
    #[serde(default)]
    pub stealth: Option<String>,
    #[serde(default)]
    pub negotiation: Option<String>,
}
