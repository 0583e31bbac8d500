//! The encounter state machine driven through the store.

use companion_core::adventure::EncounterId;
use companion_core::character::{AbilityScores, Character};
use companion_core::config::{CombatRules, EnemyDamage};
use companion_core::log::Role;
use companion_core::store::{AttackOutcome, EnemyTurnOutcome};
use companion_core::testing::{sure_hit_character, two_room_module, TestHarness};

fn e1() -> EncounterId {
    EncounterId::new("e1")
}

/// STR and DEX 1: hits for at most 3, so the 5 HP bandit always survives.
fn weakling() -> Character {
    Character::new("Tank")
        .with_abilities(AbilityScores::new(1, 1, 10, 10, 10, 10))
        .with_max_hp(40)
        .with_armor_class(1)
}

// =============================================================================
// Victory
// =============================================================================

#[test]
fn test_victory_is_not_retriggered() {
    let mut harness = TestHarness::new()
        .with_module(two_room_module())
        .with_character(sure_hit_character());

    harness.store.move_to("east");
    assert!(harness.store.in_combat());

    let target = harness.enemy_ids()[0];
    let report = harness.store.attack_enemy(target).unwrap();
    assert!(matches!(report.outcome, AttackOutcome::Victory { damage } if damage >= 5));
    assert_eq!(report.enemy_turn, None);
    assert!(!harness.store.in_combat());
    assert_eq!(harness.store.progress().unwrap().defeated_encounters, vec![e1()]);

    harness.store.move_to("west");
    harness.store.move_to("east");
    assert!(!harness.store.in_combat());
    assert_eq!(harness.room_id(), Some("B"));
    assert_eq!(harness.store.progress().unwrap().defeated_encounters, vec![e1()]);
}

#[test]
fn test_victory_logs_fall_and_victory() {
    let mut harness = TestHarness::new()
        .with_module(two_room_module())
        .with_character(sure_hit_character());
    harness.store.move_to("east");
    let before = harness.store.log().len();

    let target = harness.enemy_ids()[0];
    harness.store.attack_enemy(target);

    let texts: Vec<&str> = harness
        .store
        .log()
        .since(before)
        .iter()
        .map(|e| e.text.as_str())
        .collect();
    assert!(texts[0].starts_with("I attack Bandit: d20"));
    assert!(texts[0].contains("vs AC 10. Hit for"));
    assert_eq!(texts[1], "Bandit falls!");
    assert_eq!(texts[2], "Victory! The Lone Bandit is over.");
}

// =============================================================================
// Enemy turns
// =============================================================================

#[test]
fn test_surviving_enemy_answers() {
    let mut harness = TestHarness::with_rules(CombatRules {
        enemy_damage: EnemyDamage::Fixed(4),
        ..CombatRules::default()
    })
    .with_module(two_room_module())
    .with_character(weakling());
    harness.store.move_to("east");

    let target = harness.enemy_ids()[0];
    let report = harness.store.attack_enemy(target).unwrap();
    assert!(harness.store.in_combat());
    let ticket = report.enemy_turn.unwrap();
    assert_eq!(harness.store.pending_enemy_turns(), 1);

    match harness.store.resolve_enemy_turn(ticket) {
        EnemyTurnOutcome::Hit { attacker, damage, .. } => {
            assert_eq!(attacker, "Bandit");
            assert_eq!(damage, 4);
            assert_eq!(harness.store.current_character().unwrap().hp, 36);
            assert_eq!(harness.store.log().last().unwrap().text, "Tank: 36/40 HP");
        }
        other => panic!("AC 1 should always be hit, got {other:?}"),
    }
    assert_eq!(harness.store.pending_enemy_turns(), 0);
}

#[test]
fn test_flee_voids_pending_turn() {
    let mut harness = TestHarness::new()
        .with_module(two_room_module())
        .with_character(weakling());
    harness.store.move_to("east");

    let target = harness.enemy_ids()[0];
    let ticket = harness.store.attack_enemy(target).unwrap().enemy_turn.unwrap();
    let defeated_before = harness.store.progress().unwrap().defeated_encounters.clone();

    assert!(harness.store.flee().is_applied());
    assert!(!harness.store.in_combat());
    assert_eq!(
        harness.store.progress().unwrap().defeated_encounters,
        defeated_before
    );

    let before = harness.store.log().len();
    assert_eq!(harness.store.resolve_enemy_turn(ticket), EnemyTurnOutcome::Stale);
    assert_eq!(harness.store.log().len(), before);
}

#[test]
fn test_ticket_from_previous_fight_is_stale() {
    let mut harness = TestHarness::new()
        .with_module(two_room_module())
        .with_character(weakling());
    harness.store.move_to("east");
    let target = harness.enemy_ids()[0];
    let ticket = harness.store.attack_enemy(target).unwrap().enemy_turn.unwrap();

    harness.store.flee();
    harness.store.move_to("west");
    harness.store.move_to("east");
    assert!(harness.store.in_combat());
    assert!(!harness.store.is_ticket_live(ticket));
    assert_eq!(harness.store.resolve_enemy_turn(ticket), EnemyTurnOutcome::Stale);
}

// =============================================================================
// Illegal attacks
// =============================================================================

#[test]
fn test_attack_outside_combat_rejected() {
    let mut harness = TestHarness::new().with_module(two_room_module());
    let before = harness.store.log().len();
    assert!(harness.store.attack_enemy(uuid::Uuid::new_v4()).is_none());
    assert_eq!(harness.store.log().len(), before + 1);
    assert_eq!(harness.store.log().last().unwrap().role, Role::System);
}
