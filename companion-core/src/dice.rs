//! Dice rolling.
//!
//! Two entry points: [`roll_die`] for the single die-plus-modifier rolls the
//! table uses everywhere, and [`DiceExpression`] for `XdY+Z` notation stored
//! on enemy attacks.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiceError {
    #[error("Invalid dice notation: {0}")]
    InvalidNotation(String),
    #[error("Invalid die size: {0}")]
    InvalidDieSize(u32),
    #[error("No dice specified")]
    NoDice,
    #[error("Too many dice: {0}")]
    TooManyDice(u32),
    #[error("Modifier out of range in: {0}")]
    ModifierOutOfRange(String),
}

/// Most dice one expression may roll.
pub const MAX_DICE: u32 = 100;
/// Largest die an expression may name.
pub const MAX_SIDES: u32 = 1000;

/// One die rolled with a flat modifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DieRoll {
    pub sides: u32,
    pub result: u32,
    pub modifier: i32,
    pub total: i32,
    pub timestamp: DateTime<Utc>,
}

impl DieRoll {
    pub fn meets(&self, target: i32) -> bool {
        self.total >= target
    }
}

impl fmt::Display for DieRoll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.modifier {
            0 => write!(f, "d{} = {}", self.sides, self.total),
            m if m > 0 => write!(f, "d{} ({}) + {} = {}", self.sides, self.result, m, self.total),
            m => write!(
                f,
                "d{} ({}) - {} = {}",
                self.sides,
                self.result,
                m.unsigned_abs(),
                self.total
            ),
        }
    }
}

/// Standard polyhedral dice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DieType {
    D4,
    D6,
    D8,
    D10,
    D12,
    D20,
    D100,
}

impl DieType {
    pub fn sides(&self) -> u32 {
        match self {
            DieType::D4 => 4,
            DieType::D6 => 6,
            DieType::D8 => 8,
            DieType::D10 => 10,
            DieType::D12 => 12,
            DieType::D20 => 20,
            DieType::D100 => 100,
        }
    }

    pub fn roll<R: Rng + ?Sized>(&self, rng: &mut R, modifier: i32) -> DieRoll {
        roll_unchecked(rng, self.sides(), modifier)
    }
}

impl fmt::Display for DieType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.sides())
    }
}

/// Roll a single die with `sides` faces and add `modifier`.
pub fn roll_die<R: Rng + ?Sized>(
    rng: &mut R,
    sides: u32,
    modifier: i32,
) -> Result<DieRoll, DiceError> {
    if sides == 0 {
        return Err(DiceError::InvalidDieSize(sides));
    }
    Ok(roll_unchecked(rng, sides, modifier))
}

fn roll_unchecked<R: Rng + ?Sized>(rng: &mut R, sides: u32, modifier: i32) -> DieRoll {
    let result = rng.gen_range(1..=sides);
    DieRoll {
        sides,
        result,
        modifier,
        total: i32::try_from(result)
            .unwrap_or(i32::MAX)
            .saturating_add(modifier),
        timestamp: Utc::now(),
    }
}

/// `count` dice with `sides` faces each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceTerm {
    pub count: u32,
    pub sides: u32,
}

/// A parsed dice expression such as `1d6+2` or `2d4+1d6-1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceExpression {
    pub terms: Vec<DiceTerm>,
    pub modifier: i32,
    pub original: String,
}

impl DiceExpression {
    pub fn parse(notation: &str) -> Result<Self, DiceError> {
        let notation = notation.trim().to_lowercase();
        if notation.is_empty() {
            return Err(DiceError::NoDice);
        }

        let mut terms = Vec::new();
        let mut modifier = 0i32;
        let mut current = String::new();
        let mut sign = 1i32;

        for ch in notation.chars() {
            match ch {
                '+' | '-' => {
                    if !current.is_empty() {
                        Self::parse_term(&current, sign, &mut terms, &mut modifier)?;
                        current.clear();
                    }
                    sign = if ch == '+' { 1 } else { -1 };
                }
                c if c.is_whitespace() => continue,
                c => current.push(c),
            }
        }
        if !current.is_empty() {
            Self::parse_term(&current, sign, &mut terms, &mut modifier)?;
        }

        if terms.is_empty() {
            return Err(DiceError::NoDice);
        }

        Ok(Self {
            terms,
            modifier,
            original: notation,
        })
    }

    fn parse_term(
        s: &str,
        sign: i32,
        terms: &mut Vec<DiceTerm>,
        modifier: &mut i32,
    ) -> Result<(), DiceError> {
        let invalid = || DiceError::InvalidNotation(s.to_string());

        match s.split_once('d') {
            Some((count, sides)) => {
                if sign < 0 {
                    return Err(invalid());
                }
                let count: u32 = if count.is_empty() {
                    1
                } else {
                    count.parse().map_err(|_| invalid())?
                };
                let sides: u32 = sides.parse().map_err(|_| invalid())?;
                if sides == 0 || sides > MAX_SIDES {
                    return Err(DiceError::InvalidDieSize(sides));
                }
                let rolled: u32 = terms.iter().map(|t: &DiceTerm| t.count).sum();
                if rolled.saturating_add(count) > MAX_DICE {
                    return Err(DiceError::TooManyDice(rolled.saturating_add(count)));
                }
                if count > 0 {
                    terms.push(DiceTerm { count, sides });
                }
            }
            None => {
                let value: i32 = s.parse().map_err(|_| invalid())?;
                *modifier = modifier
                    .checked_add(sign * value)
                    .ok_or_else(|| DiceError::ModifierOutOfRange(s.to_string()))?;
            }
        }
        Ok(())
    }

    pub fn roll_with_rng<R: Rng + ?Sized>(&self, rng: &mut R) -> ExpressionRoll {
        let rolls: Vec<u32> = self
            .terms
            .iter()
            .flat_map(|term| (0..term.count).map(move |_| term.sides))
            .map(|sides| rng.gen_range(1..=sides))
            .collect();
        let total = rolls
            .iter()
            .map(|&r| r as i32)
            .sum::<i32>()
            .saturating_add(self.modifier);
        ExpressionRoll {
            rolls,
            modifier: self.modifier,
            total,
        }
    }

    /// Smallest and largest possible totals.
    pub fn bounds(&self) -> (i32, i32) {
        let dice: i32 = self.terms.iter().map(|t| t.count as i32).sum();
        let max: i32 = self
            .terms
            .iter()
            .map(|t| (t.count as i32).saturating_mul(t.sides as i32))
            .fold(0, i32::saturating_add);
        (
            dice.saturating_add(self.modifier),
            max.saturating_add(self.modifier),
        )
    }
}

impl FromStr for DiceExpression {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DiceExpression::parse(s)
    }
}

impl fmt::Display for DiceExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original)
    }
}

/// Outcome of rolling a [`DiceExpression`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpressionRoll {
    pub rolls: Vec<u32>,
    pub modifier: i32,
    pub total: i32,
}
