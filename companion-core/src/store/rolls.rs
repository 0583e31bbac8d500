//! Player dice rolls, roll requests and skill checks.

use regex_lite::Regex;
use std::sync::LazyLock;

use super::GameStore;
use crate::character::{Ability, Skill};
use crate::dice::{roll_die, DieRoll, DieType};
use crate::log::Role;

static DC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bDC\s*(\d{1,2})\b").expect("valid regex"));

/// First `DC <n>` mentioned in `text`.
pub fn extract_dc(text: &str) -> Option<i32> {
    DC_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// A resolved skill check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillCheck {
    pub skill: Skill,
    pub ability: Ability,
    pub d20: u32,
    pub ability_modifier: i32,
    pub proficiency: i32,
    pub total: i32,
    /// DC named by the most recent narration, if any.
    pub dc: Option<i32>,
}

impl SkillCheck {
    pub fn succeeded(&self) -> Option<bool> {
        self.dc.map(|dc| self.total >= dc)
    }
}

fn signed(n: i32) -> String {
    if n >= 0 {
        format!("+{n}")
    } else {
        n.to_string()
    }
}

impl GameStore {
    /// Roll one die. Becomes the last roll and answers any pending request.
    /// A zero-sided die is refused.
    pub fn roll_dice(&mut self, sides: u32, modifier: i32) -> Option<DieRoll> {
        let roll = match roll_die(&mut self.rng, sides, modifier) {
            Ok(roll) => roll,
            Err(e) => {
                self.reject(e.to_string());
                return None;
            }
        };
        self.log.player(format!("Rolled {roll}"));
        self.record_roll(roll.clone());
        Some(roll)
    }

    /// Ask the player for a roll, e.g. "Perception" or "initiative".
    pub fn request_roll(&mut self, kind: impl Into<String>) {
        let kind = kind.into();
        self.log.system(format!("Roll requested: {kind}"));
        self.pending_roll_request = Some(kind);
    }

    pub fn clear_roll_request(&mut self) {
        self.pending_roll_request = None;
    }

    /// d20 + governing ability modifier + proficiency when trained, against
    /// the DC the narrator last mentioned.
    pub fn roll_skill(&mut self, skill: Skill, note: Option<&str>) -> SkillCheck {
        let ability = skill.ability();
        let (ability_modifier, proficiency) = match self.current_character() {
            Some(c) => (
                c.modifier(ability),
                if c.is_proficient(skill) {
                    c.proficiency_bonus()
                } else {
                    0
                },
            ),
            None => (0, 0),
        };
        let dc = self
            .log
            .last_by(Role::Dm)
            .and_then(|entry| extract_dc(&entry.text));

        let roll = DieType::D20.roll(&mut self.rng, ability_modifier + proficiency);
        let check = SkillCheck {
            skill,
            ability,
            d20: roll.result,
            ability_modifier,
            proficiency,
            total: roll.total,
            dc,
        };

        let note = note.map(|n| format!(" ({n})")).unwrap_or_default();
        let versus = dc.map(|dc| format!(" vs DC {dc}")).unwrap_or_default();
        self.log.player(format!(
            "Rolling {skill}{note}: d20={} + {ability} {} + prof {} = {}{versus}.",
            check.d20,
            signed(ability_modifier),
            signed(proficiency),
            check.total,
        ));
        tracing::debug!(%skill, total = check.total, ?dc, "Skill check");

        self.record_roll(roll);
        check
    }

    fn record_roll(&mut self, roll: DieRoll) {
        self.last_roll = Some(roll);
        self.pending_roll_request = None;
    }
}
