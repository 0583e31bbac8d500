//! Renders store state into the text the narrator model sees, and cleans up
//! what comes back.

use regex_lite::Regex;
use std::fmt::Write;
use std::sync::LazyLock;

use crate::adventure::AdventureModule;
use crate::character::{Ability, Character, Skill};
use crate::log::{LogEntry, Role};
use crate::store::{ActiveEncounter, GameStore, ModuleProgress};

/// Standing instructions for the narrator.
pub const DM_SYSTEM_PROMPT: &str = "\
You are the Dungeon Master for a single player. Describe the world and the \
results of the player's actions; never decide what the player does or says.

Rules of the table:
- The game engine resolves movement, attacks and damage. Narrate the results \
it reports; do not invent hits, misses or hit points.
- The player's rolls already include their bonuses. Compare the final total \
to the DC.
- When an action is uncertain, ask for a check and name the DC, for example \
\"Make a DC 12 Perception check.\" Then stop and wait for the roll.
- Only use locations, NPCs, items and enemies from the adventure below.
- Keep replies to two or three sentences.";

/// Shown in place of the character block when nobody is selected.
pub const NO_CHARACTER: &str = "No character selected. Ask the player to create one.";

/// Prefix applied to a single signed number.
fn signed(n: i32) -> String {
    if n >= 0 {
        format!("+{n}")
    } else {
        n.to_string()
    }
}

fn join_or_none<I: IntoIterator<Item = S>, S: AsRef<str>>(items: I) -> String {
    let joined = items
        .into_iter()
        .map(|s| s.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    if joined.is_empty() {
        "None".to_string()
    } else {
        joined
    }
}

/// Name, race, class, level, HP, AC, combat bonuses, ability scores,
/// proficient skills, equipped items and gold.
pub fn character_block(character: &Character) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== PLAYER CHARACTER ===");
    let _ = writeln!(out, "Name: {}", character.name);
    let _ = writeln!(out, "Race: {}", character.race);
    let _ = writeln!(out, "Class: {}", character.class);
    let _ = writeln!(out, "Level: {}", character.level);
    let _ = writeln!(out, "HP: {}/{}", character.hp, character.max_hp);
    let _ = writeln!(out, "AC: {}", character.armor_class);
    let _ = writeln!(out);
    let _ = writeln!(out, "=== COMBAT STATS ===");
    let _ = writeln!(out, "Attack bonus: {}", signed(character.attack_bonus()));
    let _ = writeln!(
        out,
        "Damage bonus: {}",
        signed(character.best_physical_modifier())
    );
    let _ = writeln!(out, "Proficiency bonus: {}", signed(character.proficiency_bonus()));
    let _ = writeln!(out);
    let _ = writeln!(out, "=== ABILITIES ===");
    let scores = Ability::all()
        .iter()
        .map(|&a| {
            format!(
                "{a}: {} ({})",
                character.abilities.get(a),
                signed(character.modifier(a))
            )
        })
        .collect::<Vec<_>>()
        .join(", ");
    let _ = writeln!(out, "{scores}");
    let _ = writeln!(out);
    let _ = writeln!(out, "=== PROFICIENT SKILLS ===");
    let _ = writeln!(
        out,
        "{}",
        join_or_none(character.skills.iter().map(Skill::name))
    );
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "EQUIPPED: {}",
        join_or_none(character.equipped_items().map(|i| i.name.as_str()))
    );
    let _ = write!(out, "GOLD: {} gp", character.gold);
    out
}

/// Room name, description, exits, items, NPCs present and the live enemy
/// roster when a fight is on.
pub fn location_block(
    module: Option<&AdventureModule>,
    progress: Option<&ModuleProgress>,
    encounter: Option<&ActiveEncounter>,
) -> String {
    let (Some(module), Some(progress)) = (module, progress) else {
        return "No adventure module loaded.".to_string();
    };
    let Some(room) = module.room(&progress.current_room) else {
        return "Module loaded but current location unknown.".to_string();
    };

    let mut out = String::new();
    let _ = writeln!(out, "=== ADVENTURE: {} ===", module.title);
    let _ = writeln!(out, "{}", module.summary);
    let _ = writeln!(out);
    let _ = writeln!(out, "=== CURRENT LOCATION ===");
    let _ = writeln!(out, "{} ({} light)", room.name, room.light);
    let _ = writeln!(out, "{}", room.description);
    if let Some(ambient) = &room.ambient {
        let _ = writeln!(out, "{ambient}");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Exits: {}", join_or_none(room.exits.keys()));
    let _ = writeln!(
        out,
        "Items: {}",
        join_or_none(
            room.items
                .iter()
                .map(|id| module.thing_name(id).unwrap_or(id.as_str()))
        )
    );

    let npcs: Vec<String> = room
        .npcs
        .iter()
        .filter_map(|id| module.npc(id))
        .map(|npc| format!("{} ({}, {})", npc.name, npc.role, npc.disposition))
        .collect();
    let _ = writeln!(out, "NPCs: {}", join_or_none(&npcs));

    if let Some(encounter) = encounter {
        let _ = writeln!(out);
        let _ = writeln!(out, "=== ACTIVE COMBAT: {} ===", encounter.name());
        for enemy in encounter.enemies() {
            let attack = enemy
                .primary_attack()
                .map(|a| format!(", {} {} ({})", a.name, signed(a.bonus), a.damage_dice))
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "{}: {}/{} HP, AC {}{attack}",
                enemy.name, enemy.hp, enemy.max_hp, enemy.ac
            );
        }
        if let Some(tactics) = module
            .encounter(encounter.id())
            .and_then(|e| e.tactics.as_deref())
        {
            let _ = writeln!(out, "Tactics: {tactics}");
        }
    }

    let _ = writeln!(out);
    let _ = write!(
        out,
        "Only use the content above. Do not invent new enemies, NPCs, or locations."
    );
    out
}

/// The full system prompt for the current store state.
pub fn build_dm_prompt(store: &GameStore) -> String {
    let character = store
        .current_character()
        .map(character_block)
        .unwrap_or_else(|| NO_CHARACTER.to_string());
    let location = location_block(
        store.module().map(|m| &**m),
        store.progress(),
        store.active_encounter(),
    );
    format!("{DM_SYSTEM_PROMPT}\n\n{character}\n\n{location}")
}

/// Who said a line of the conversation sent to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    Player,
    Narrator,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub speaker: Speaker,
    pub text: String,
}

impl ChatTurn {
    pub fn player(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Player,
            text: text.into(),
        }
    }

    pub fn narrator(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Narrator,
            text: text.into(),
        }
    }
}

/// The last `limit` player and DM lines as chat turns. System notices are
/// folded into the following player turn so the model still sees them.
pub fn conversation(entries: &[LogEntry], limit: usize) -> Vec<ChatTurn> {
    let mut turns: Vec<ChatTurn> = Vec::new();
    let mut notes: Vec<&str> = Vec::new();

    for entry in entries {
        match entry.role {
            Role::System => notes.push(&entry.text),
            Role::Player => {
                let text = if notes.is_empty() {
                    entry.text.clone()
                } else {
                    format!("[{}]\n{}", notes.join(" | "), entry.text)
                };
                notes.clear();
                turns.push(ChatTurn::player(text));
            }
            Role::Dm => turns.push(ChatTurn::narrator(entry.text.clone())),
        }
    }

    let skip = turns.len().saturating_sub(limit);
    turns.split_off(skip)
}

static THINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<think>.*?</think>").expect("valid regex"));
static LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^(?:plan of action|plan|analysis)\b\s*[:\-]*\s*").expect("valid regex")
});

/// Strip reasoning blocks and planning labels, and drop a trailing word that
/// was cut off mid-sentence.
pub fn sanitize_llm_output(text: &str) -> String {
    let text = THINK_RE.replace_all(text, "");
    let text = LABEL_RE.replace_all(&text, "");
    let mut text = text.into_owned();

    let ends_in_word = text.chars().last().is_some_and(|c| !c.is_whitespace());
    if ends_in_word {
        let start = text
            .char_indices()
            .rev()
            .find(|(_, c)| c.is_whitespace())
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        let last = text[start..].trim_end_matches(['"', '\'', '*', ')', '_']);
        if !last.ends_with(['.', '!', '?']) {
            text.truncate(start);
        }
    }

    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adventure::goblin_cave;
    use crate::character::{AbilityScores, InventoryItem};
    use crate::config::CombatRules;
    use std::sync::Arc;

    fn hero() -> Character {
        Character::new("Brenna")
            .with_identity("Dwarf", "Fighter", "Soldier")
            .with_level(3)
            .with_abilities(AbilityScores::new(16, 12, 14, 8, 10, 10))
            .with_max_hp(28)
            .with_armor_class(16)
            .with_skills([Skill::Athletics, Skill::Perception])
            .with_item(InventoryItem::new("Longsword").equipped())
            .with_item(InventoryItem::new("Rope"))
            .with_gold(15)
    }

    #[test]
    fn test_character_block_fields() {
        let block = character_block(&hero());
        assert!(block.contains("Name: Brenna"));
        assert!(block.contains("Race: Dwarf"));
        assert!(block.contains("Class: Fighter"));
        assert!(block.contains("Level: 3"));
        assert!(block.contains("HP: 28/28"));
        assert!(block.contains("AC: 16"));
        assert!(block.contains("Attack bonus: +5"));
        assert!(block.contains("Damage bonus: +3"));
        assert!(block.contains("STR: 16 (+3)"));
        assert!(block.contains("INT: 8 (-1)"));
        assert!(block.contains("Athletics, Perception"));
        assert!(block.contains("EQUIPPED: Longsword"));
        assert!(!block.contains("Rope"));
        assert!(block.ends_with("GOLD: 15 gp"));
    }

    #[test]
    fn test_location_block_without_module() {
        assert_eq!(location_block(None, None, None), "No adventure module loaded.");
    }

    #[test]
    fn test_location_block_lists_live_enemies() {
        let mut store = GameStore::seeded(CombatRules::default(), 3);
        store.load_module(Arc::new(goblin_cave()));
        store.move_to("east");

        let prompt = build_dm_prompt(&store);
        assert!(prompt.starts_with(DM_SYSTEM_PROMPT));
        assert!(prompt.contains(NO_CHARACTER));
        assert!(prompt.contains("Shadowed Antechamber (dark light)"));
        assert!(prompt.contains("Exits: southeast, west"));
        assert!(prompt.contains("=== ACTIVE COMBAT: Goblin Ambush ==="));
        assert!(prompt.contains("Goblin Guard: 7/7 HP, AC 15, Scimitar +4 (1d6+2)"));
        assert!(prompt.contains("Goblin Lookout: 5/5 HP, AC 14"));
        assert!(prompt.contains("Tactics: They snipe"));
    }

    #[test]
    fn test_location_block_items_use_names() {
        let mut store = GameStore::default();
        store.load_module(Arc::new(goblin_cave()));
        let module = store.module().unwrap().clone();
        let mut progress = store.progress().unwrap().clone();
        progress.current_room = crate::adventure::RoomId::new("treasure-hall");
        let block = location_block(Some(&*module), Some(&progress), None);
        assert!(block.contains("Items: Sturdy Wooden Chest"));
        assert!(!block.contains("ACTIVE COMBAT"));
    }

    #[test]
    fn test_conversation_folds_system_notes() {
        let entries = vec![
            LogEntry::new(Role::Dm, "You enter."),
            LogEntry::new(Role::System, "Combat! Goblins"),
            LogEntry::new(Role::Player, "I draw my sword."),
            LogEntry::new(Role::Dm, "They charge."),
        ];
        let turns = conversation(&entries, 10);
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[1].text, "[Combat! Goblins]\nI draw my sword.");
        assert_eq!(conversation(&entries, 1), vec![ChatTurn::narrator("They charge.")]);
    }

    #[test]
    fn test_sanitize_strips_think_blocks() {
        let raw = "<think>The player wants to sneak.\nDC 13.</think>The corridor is quiet.";
        assert_eq!(sanitize_llm_output(raw), "The corridor is quiet.");
    }

    #[test]
    fn test_sanitize_strips_labels() {
        let raw = "Plan: describe the cave.\nAnalysis - keep it short.\nWater drips.";
        assert_eq!(
            sanitize_llm_output(raw),
            "describe the cave.\nkeep it short.\nWater drips."
        );
    }

    #[test]
    fn test_sanitize_drops_cut_off_word() {
        assert_eq!(
            sanitize_llm_output("The goblin lunges. You feel the"),
            "The goblin lunges. You feel"
        );
        assert_eq!(sanitize_llm_output("Roll for it!"), "Roll for it!");
        assert_eq!(sanitize_llm_output("\"Who goes there?\""), "\"Who goes there?\"");
    }
}
