//! Player characters: ability scores, skills, hit points and the derived
//! numbers the table asks for (modifiers, proficiency, skill bonuses).

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Derived stats
// ============================================================================

/// `floor((score - 10) / 2)`, rounding toward negative infinity.
pub fn ability_modifier(score: i32) -> i32 {
    (score - 10).div_euclid(2)
}

/// `ceil(level / 4) + 1`. Levels below 1 are treated as level 1.
pub fn proficiency_bonus(level: u32) -> i32 {
    level.max(1).div_ceil(4) as i32 + 1
}

// ============================================================================
// IDs
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CharacterId(pub Uuid);

impl CharacterId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CharacterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Abilities and skills
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Ability {
    Strength,
    Dexterity,
    Constitution,
    Intelligence,
    Wisdom,
    Charisma,
}

impl Ability {
    pub fn abbreviation(&self) -> &'static str {
        match self {
            Ability::Strength => "STR",
            Ability::Dexterity => "DEX",
            Ability::Constitution => "CON",
            Ability::Intelligence => "INT",
            Ability::Wisdom => "WIS",
            Ability::Charisma => "CHA",
        }
    }

    pub fn all() -> [Ability; 6] {
        [
            Ability::Strength,
            Ability::Dexterity,
            Ability::Constitution,
            Ability::Intelligence,
            Ability::Wisdom,
            Ability::Charisma,
        ]
    }
}

impl fmt::Display for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.abbreviation())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityScores {
    pub strength: i32,
    pub dexterity: i32,
    pub constitution: i32,
    pub intelligence: i32,
    pub wisdom: i32,
    pub charisma: i32,
}

impl AbilityScores {
    pub fn new(str: i32, dex: i32, con: i32, int: i32, wis: i32, cha: i32) -> Self {
        Self {
            strength: str,
            dexterity: dex,
            constitution: con,
            intelligence: int,
            wisdom: wis,
            charisma: cha,
        }
    }

    pub fn get(&self, ability: Ability) -> i32 {
        match ability {
            Ability::Strength => self.strength,
            Ability::Dexterity => self.dexterity,
            Ability::Constitution => self.constitution,
            Ability::Intelligence => self.intelligence,
            Ability::Wisdom => self.wisdom,
            Ability::Charisma => self.charisma,
        }
    }

    pub fn modifier(&self, ability: Ability) -> i32 {
        ability_modifier(self.get(ability))
    }
}

impl Default for AbilityScores {
    fn default() -> Self {
        Self::new(10, 10, 10, 10, 10, 10)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Skill {
    Athletics,
    Acrobatics,
    SleightOfHand,
    Stealth,
    Arcana,
    History,
    Investigation,
    Nature,
    Religion,
    AnimalHandling,
    Insight,
    Medicine,
    Perception,
    Survival,
    Deception,
    Intimidation,
    Performance,
    Persuasion,
}

impl Skill {
    pub const ALL: [Skill; 18] = [
        Skill::Athletics,
        Skill::Acrobatics,
        Skill::SleightOfHand,
        Skill::Stealth,
        Skill::Arcana,
        Skill::History,
        Skill::Investigation,
        Skill::Nature,
        Skill::Religion,
        Skill::AnimalHandling,
        Skill::Insight,
        Skill::Medicine,
        Skill::Perception,
        Skill::Survival,
        Skill::Deception,
        Skill::Intimidation,
        Skill::Performance,
        Skill::Persuasion,
    ];

    /// The ability that governs checks with this skill.
    pub fn ability(&self) -> Ability {
        match self {
            Skill::Athletics => Ability::Strength,
            Skill::Acrobatics | Skill::SleightOfHand | Skill::Stealth => Ability::Dexterity,
            Skill::Arcana
            | Skill::History
            | Skill::Investigation
            | Skill::Nature
            | Skill::Religion => Ability::Intelligence,
            Skill::AnimalHandling
            | Skill::Insight
            | Skill::Medicine
            | Skill::Perception
            | Skill::Survival => Ability::Wisdom,
            Skill::Deception | Skill::Intimidation | Skill::Performance | Skill::Persuasion => {
                Ability::Charisma
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Skill::Athletics => "Athletics",
            Skill::Acrobatics => "Acrobatics",
            Skill::SleightOfHand => "Sleight of Hand",
            Skill::Stealth => "Stealth",
            Skill::Arcana => "Arcana",
            Skill::History => "History",
            Skill::Investigation => "Investigation",
            Skill::Nature => "Nature",
            Skill::Religion => "Religion",
            Skill::AnimalHandling => "Animal Handling",
            Skill::Insight => "Insight",
            Skill::Medicine => "Medicine",
            Skill::Perception => "Perception",
            Skill::Survival => "Survival",
            Skill::Deception => "Deception",
            Skill::Intimidation => "Intimidation",
            Skill::Performance => "Performance",
            Skill::Persuasion => "Persuasion",
        }
    }
}

impl fmt::Display for Skill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown skill: {0}")]
pub struct UnknownSkill(pub String);

/// Accepts display names in any case, with or without spaces or underscores
/// ("Sleight of Hand", "sleight_of_hand", "sleightofhand").
impl FromStr for Skill {
    type Err = UnknownSkill;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted: String = s
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect();
        Skill::ALL
            .into_iter()
            .find(|skill| {
                let key: String = skill
                    .name()
                    .chars()
                    .filter(|c| c.is_alphanumeric())
                    .flat_map(char::to_lowercase)
                    .collect();
                key == wanted
            })
            .ok_or_else(|| UnknownSkill(s.to_string()))
    }
}

// ============================================================================
// Character
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub name: String,
    #[serde(default = "one")]
    pub quantity: u32,
    #[serde(default)]
    pub equipped: bool,
}

fn one() -> u32 {
    1
}

impl InventoryItem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            quantity: 1,
            equipped: false,
        }
    }

    pub fn equipped(mut self) -> Self {
        self.equipped = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub id: CharacterId,
    pub name: String,
    pub race: String,
    pub class: String,
    pub level: u32,
    pub background: String,
    pub abilities: AbilityScores,
    pub hp: i32,
    pub max_hp: i32,
    pub armor_class: i32,
    pub speed: u32,
    pub skills: BTreeSet<Skill>,
    pub inventory: Vec<InventoryItem>,
    pub gold: u32,
}

impl Character {
    /// A level 1 character with average scores, 10 HP and AC 10.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: CharacterId::new(),
            name: name.into(),
            race: "Human".to_string(),
            class: "Fighter".to_string(),
            level: 1,
            background: "Folk Hero".to_string(),
            abilities: AbilityScores::default(),
            hp: 10,
            max_hp: 10,
            armor_class: 10,
            speed: 30,
            skills: BTreeSet::new(),
            inventory: Vec::new(),
            gold: 0,
        }
    }

    pub fn with_identity(
        mut self,
        race: impl Into<String>,
        class: impl Into<String>,
        background: impl Into<String>,
    ) -> Self {
        self.race = race.into();
        self.class = class.into();
        self.background = background.into();
        self
    }

    pub fn with_level(mut self, level: u32) -> Self {
        self.level = level.max(1);
        self
    }

    pub fn with_abilities(mut self, abilities: AbilityScores) -> Self {
        self.abilities = abilities;
        self
    }

    /// Sets both current and maximum HP.
    pub fn with_max_hp(mut self, max_hp: i32) -> Self {
        self.max_hp = max_hp.max(1);
        self.hp = self.max_hp;
        self
    }

    pub fn with_armor_class(mut self, ac: i32) -> Self {
        self.armor_class = ac;
        self
    }

    pub fn with_skills(mut self, skills: impl IntoIterator<Item = Skill>) -> Self {
        self.skills.extend(skills);
        self
    }

    pub fn with_item(mut self, item: InventoryItem) -> Self {
        self.inventory.push(item);
        self
    }

    pub fn with_gold(mut self, gold: u32) -> Self {
        self.gold = gold;
        self
    }

    pub fn modifier(&self, ability: Ability) -> i32 {
        self.abilities.modifier(ability)
    }

    pub fn proficiency_bonus(&self) -> i32 {
        proficiency_bonus(self.level)
    }

    pub fn is_proficient(&self, skill: Skill) -> bool {
        self.skills.contains(&skill)
    }

    pub fn skill_modifier(&self, skill: Skill) -> i32 {
        let base = self.modifier(skill.ability());
        if self.is_proficient(skill) {
            base + self.proficiency_bonus()
        } else {
            base
        }
    }

    /// The better of the STR and DEX modifiers.
    pub fn best_physical_modifier(&self) -> i32 {
        self.modifier(Ability::Strength)
            .max(self.modifier(Ability::Dexterity))
    }

    pub fn attack_bonus(&self) -> i32 {
        self.proficiency_bonus() + self.best_physical_modifier()
    }

    pub fn equipped_items(&self) -> impl Iterator<Item = &InventoryItem> {
        self.inventory.iter().filter(|i| i.equipped)
    }

    /// Subtract damage, stopping at 0. Returns the HP actually lost.
    pub fn apply_damage(&mut self, amount: i32) -> i32 {
        let before = self.hp;
        self.hp = self.hp.saturating_sub(amount.max(0)).clamp(0, self.max_hp);
        before - self.hp
    }

    /// Restore HP up to the maximum. Returns the HP actually gained.
    pub fn heal(&mut self, amount: i32) -> i32 {
        let before = self.hp;
        self.hp = self.hp.saturating_add(amount.max(0)).clamp(0, self.max_hp);
        self.hp - before
    }

    /// Pull `max_hp` up to at least 1 and `hp` into `0..=max_hp`.
    pub fn clamp_hp(&mut self) {
        self.max_hp = self.max_hp.max(1);
        self.hp = self.hp.clamp(0, self.max_hp);
    }

    pub fn is_down(&self) -> bool {
        self.hp == 0
    }
}
