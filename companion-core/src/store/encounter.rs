//! The encounter state machine.
//!
//! `None -> Active -> None`. An encounter ends in victory when its last enemy
//! drops, or when the player flees. Every player attack that leaves enemies
//! standing queues one [`EnemyTurnTicket`]; the caller decides when to
//! resolve it (the session actor waits `enemy_turn_delay` first). A ticket
//! only resolves against the encounter it was issued for: ending or
//! replacing the encounter leaves every outstanding ticket stale.

use rand::Rng;
use std::sync::Arc;
use uuid::Uuid;

use super::{CommandOutcome, GameStore};
use crate::adventure::{AttackBlock, Encounter, EncounterId, StatBlock};
use crate::config::EnemyDamage;
use crate::dice::{DiceExpression, DieRoll, DieType};

/// One live enemy spawned from an encounter template.
#[derive(Debug, Clone, PartialEq)]
pub struct EnemyInstance {
    pub instance_id: Uuid,
    pub name: String,
    pub hp: i32,
    pub max_hp: i32,
    pub ac: i32,
    /// Shared with the module's template.
    pub stats: Arc<StatBlock>,
}

impl EnemyInstance {
    fn spawn(name: &str, stats: &Arc<StatBlock>) -> Self {
        Self {
            instance_id: Uuid::new_v4(),
            name: name.to_string(),
            hp: stats.hp,
            max_hp: stats.hp,
            ac: stats.ac,
            stats: Arc::clone(stats),
        }
    }

    pub fn primary_attack(&self) -> Option<&AttackBlock> {
        self.stats.attacks.first()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveEncounter {
    id: EncounterId,
    name: String,
    enemies: Vec<EnemyInstance>,
}

impl ActiveEncounter {
    fn instantiate(template: &Encounter) -> Self {
        let enemies = template
            .enemies
            .iter()
            .flat_map(|e| (0..e.count()).map(move |_| EnemyInstance::spawn(&e.name, &e.stats)))
            .collect();
        Self {
            id: template.id.clone(),
            name: template.name.clone(),
            enemies,
        }
    }

    pub fn id(&self) -> &EncounterId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn enemies(&self) -> &[EnemyInstance] {
        &self.enemies
    }

    pub fn enemy(&self, instance_id: Uuid) -> Option<&EnemyInstance> {
        self.enemies.iter().find(|e| e.instance_id == instance_id)
    }
}

/// A queued enemy response to a player attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnemyTurnTicket {
    pub encounter_serial: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttackOutcome {
    Miss,
    Hit { damage: i32 },
    /// The target dropped; others remain.
    Defeated { damage: i32 },
    /// The target was the last enemy standing.
    Victory { damage: i32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttackReport {
    pub target: String,
    pub attack_roll: DieRoll,
    pub target_ac: i32,
    pub outcome: AttackOutcome,
    /// Set when the enemies get to answer.
    pub enemy_turn: Option<EnemyTurnTicket>,
}

impl AttackReport {
    pub fn is_hit(&self) -> bool {
        !matches!(self.outcome, AttackOutcome::Miss)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnemyTurnOutcome {
    /// The encounter the ticket belonged to is over.
    Stale,
    /// The chosen enemy has no attacks to make.
    Idle { attacker: String },
    Miss {
        attacker: String,
        attack: String,
        roll: DieRoll,
        target_ac: i32,
    },
    Hit {
        attacker: String,
        attack: String,
        roll: DieRoll,
        target_ac: i32,
        damage: i32,
    },
}

impl GameStore {
    /// Spawn fresh enemies from the named template and enter combat.
    pub fn start_encounter(&mut self, id: &EncounterId) -> CommandOutcome {
        if let Some(active) = &self.active_encounter {
            let reason = format!("Already fighting {}.", active.name);
            return self.reject(reason);
        }
        let Some(module) = self.module.clone() else {
            return self.reject("No adventure module is loaded.");
        };
        let Some(template) = module.encounter(id) else {
            return self.reject(format!("Unknown encounter: {id}"));
        };

        let encounter = ActiveEncounter::instantiate(template);
        let roster = encounter
            .enemies
            .iter()
            .map(|e| e.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        self.encounter_serial += 1;
        self.pending_enemy_turns.clear();
        tracing::info!(
            encounter = %id,
            enemies = encounter.enemies.len(),
            serial = self.encounter_serial,
            "Encounter started"
        );

        self.log.dm(template.description.clone());
        self.log.system(format!("Combat! {}: {}", template.name, roster));
        self.active_encounter = Some(encounter);
        CommandOutcome::Applied
    }

    /// Attack one enemy. `None` means the attack was not allowed; the log
    /// says why.
    pub fn attack_enemy(&mut self, instance_id: Uuid) -> Option<AttackReport> {
        let Some(index) = self
            .active_encounter
            .as_ref()
            .map(|e| e.enemies.iter().position(|x| x.instance_id == instance_id))
        else {
            self.reject("There is nothing to attack.");
            return None;
        };
        let Some(index) = index else {
            self.reject("That enemy is not part of this fight.");
            return None;
        };

        let (bonus, damage_bonus) = match self.current_character() {
            Some(c) => (c.attack_bonus(), c.best_physical_modifier()),
            None => (self.rules.fallback_attack_bonus, 0),
        };
        let attack_roll = DieType::D20.roll(&mut self.rng, bonus);

        let encounter = self.active_encounter.as_mut()?;
        let enemy = &mut encounter.enemies[index];
        let target = enemy.name.clone();
        let target_ac = enemy.ac;
        let hit = attack_roll.meets(target_ac);

        if !hit {
            self.log.player(format!(
                "I attack {target}: {attack_roll} vs AC {target_ac}. Miss."
            ));
            let ticket = self.queue_enemy_turn();
            return Some(AttackReport {
                target,
                attack_roll,
                target_ac,
                outcome: AttackOutcome::Miss,
                enemy_turn: Some(ticket),
            });
        }

        let damage = DieType::D8.roll(&mut self.rng, damage_bonus).total.max(0);
        enemy.hp -= damage;
        let dropped = enemy.hp <= 0;
        let remaining_hp = enemy.hp;
        self.log.player(format!(
            "I attack {target}: {attack_roll} vs AC {target_ac}. Hit for {damage} damage."
        ));
        tracing::debug!(%target, damage, hp = remaining_hp, "Player hit");

        if !dropped {
            let ticket = self.queue_enemy_turn();
            return Some(AttackReport {
                target,
                attack_roll,
                target_ac,
                outcome: AttackOutcome::Hit { damage },
                enemy_turn: Some(ticket),
            });
        }

        encounter.enemies.remove(index);
        let cleared = encounter.enemies.is_empty();
        self.log.dm(format!("{target} falls!"));

        if cleared {
            self.win_encounter();
            return Some(AttackReport {
                target,
                attack_roll,
                target_ac,
                outcome: AttackOutcome::Victory { damage },
                enemy_turn: None,
            });
        }

        let ticket = self.queue_enemy_turn();
        Some(AttackReport {
            target,
            attack_roll,
            target_ac,
            outcome: AttackOutcome::Defeated { damage },
            enemy_turn: Some(ticket),
        })
    }

    /// Leave combat. The encounter stays undefeated and will trigger again.
    pub fn flee(&mut self) -> CommandOutcome {
        let Some(encounter) = &self.active_encounter else {
            return self.reject("There is nothing to flee from.");
        };
        let name = encounter.name.clone();
        tracing::info!(encounter = %encounter.id, "Player fled");
        self.log.player(format!("I flee from the {name}!"));
        self.end_encounter();
        CommandOutcome::Applied
    }

    fn win_encounter(&mut self) {
        let Some(encounter) = self.active_encounter.as_ref() else {
            return;
        };
        let id = encounter.id.clone();
        let name = encounter.name.clone();

        if let Some(progress) = self.progress.as_mut() {
            progress.mark_defeated(&id);
        }
        self.log.dm(format!("Victory! The {name} is over."));

        let treasure: Vec<String> = self
            .module
            .as_ref()
            .and_then(|m| m.encounter(&id).map(|e| (m, e)))
            .map(|(m, e)| {
                e.treasure
                    .iter()
                    .map(|t| m.thing_name(t).unwrap_or(t).to_string())
                    .collect()
            })
            .unwrap_or_default();
        if !treasure.is_empty() {
            self.log
                .system(format!("Treasure left behind: {}", treasure.join(", ")));
        }

        tracing::info!(encounter = %id, "Encounter won");
        self.end_encounter();
    }

    /// Drop the active encounter (if any) and void every outstanding ticket.
    pub(super) fn end_encounter(&mut self) {
        if self.active_encounter.take().is_some() {
            self.encounter_serial += 1;
        }
        self.pending_enemy_turns.clear();
    }

    fn queue_enemy_turn(&mut self) -> EnemyTurnTicket {
        let ticket = EnemyTurnTicket {
            encounter_serial: self.encounter_serial,
        };
        self.pending_enemy_turns.push_back(ticket);
        ticket
    }

    /// Whether `ticket` still belongs to the live encounter.
    pub fn is_ticket_live(&self, ticket: EnemyTurnTicket) -> bool {
        self.active_encounter.is_some() && ticket.encounter_serial == self.encounter_serial
    }

    /// Tickets queued since the last call, oldest first.
    pub fn take_pending_enemy_turns(&mut self) -> Vec<EnemyTurnTicket> {
        self.pending_enemy_turns.drain(..).collect()
    }

    pub fn pending_enemy_turns(&self) -> usize {
        self.pending_enemy_turns.len()
    }

    /// Resolve every queued enemy turn now, in order.
    pub fn resolve_pending_enemy_turns(&mut self) -> Vec<EnemyTurnOutcome> {
        self.take_pending_enemy_turns()
            .into_iter()
            .map(|ticket| self.resolve_enemy_turn(ticket))
            .collect()
    }

    /// One random surviving enemy attacks the selected character with its
    /// first listed attack. A stale ticket does nothing.
    pub fn resolve_enemy_turn(&mut self, ticket: EnemyTurnTicket) -> EnemyTurnOutcome {
        if let Some(pos) = self.pending_enemy_turns.iter().position(|t| *t == ticket) {
            self.pending_enemy_turns.remove(pos);
        }
        if !self.is_ticket_live(ticket) {
            tracing::debug!(serial = ticket.encounter_serial, "Stale enemy turn ignored");
            return EnemyTurnOutcome::Stale;
        }
        let Some(encounter) = self.active_encounter.as_ref() else {
            return EnemyTurnOutcome::Stale;
        };
        if encounter.enemies.is_empty() {
            return EnemyTurnOutcome::Stale;
        }

        let pick = self.rng.gen_range(0..encounter.enemies.len());
        let enemy = &encounter.enemies[pick];
        let attacker = enemy.name.clone();
        let Some(attack) = enemy.primary_attack().cloned() else {
            self.log.dm(format!("{attacker} hesitates."));
            return EnemyTurnOutcome::Idle { attacker };
        };

        let target_ac = self
            .current_character()
            .map(|c| c.armor_class)
            .unwrap_or(self.rules.fallback_armor_class);
        let roll = DieType::D20.roll(&mut self.rng, attack.bonus);

        if !roll.meets(target_ac) {
            tracing::debug!(%attacker, total = roll.total, target_ac, "Enemy missed");
            self.log.dm(format!(
                "{attacker} attacks with {}: {roll} vs AC {target_ac}. Miss.",
                attack.name
            ));
            return EnemyTurnOutcome::Miss {
                attacker,
                attack: attack.name,
                roll,
                target_ac,
            };
        }

        let damage = self.enemy_damage(&attack);
        tracing::debug!(%attacker, damage, "Enemy hit");
        self.log.dm(format!(
            "{attacker} attacks with {}: {roll} vs AC {target_ac}. Hit for {damage} {} damage.",
            attack.name, attack.damage_type
        ));

        if let Some(character) = self.current_character_mut() {
            character.apply_damage(damage);
            let (name, hp, max_hp) = (character.name.clone(), character.hp, character.max_hp);
            if hp == 0 {
                self.log.system(format!("{name} is down!"));
            } else {
                self.log.system(format!("{name}: {hp}/{max_hp} HP"));
            }
        }

        EnemyTurnOutcome::Hit {
            attacker,
            attack: attack.name,
            roll,
            target_ac,
            damage,
        }
    }

    fn enemy_damage(&mut self, attack: &AttackBlock) -> i32 {
        let rule = self.rules.enemy_damage;
        match rule {
            EnemyDamage::Fixed(amount) => amount,
            EnemyDamage::Notation { fallback } => match DiceExpression::parse(&attack.damage_dice) {
                Ok(expr) => expr.roll_with_rng(&mut self.rng).total.max(0),
                Err(e) => {
                    tracing::warn!(attack = %attack.name, error = %e, "Unreadable damage dice");
                    fallback
                }
            },
        }
    }
}
