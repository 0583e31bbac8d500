//! Movement and progress through a loaded module.

use std::collections::HashSet;
use std::sync::Arc;

use companion_core::adventure::{goblin_cave, RoomId};
use companion_core::log::Role;
use companion_core::store::CommandOutcome;
use companion_core::testing::{two_room_module, TestHarness};
use companion_core::PlayerAction;

// =============================================================================
// Loading
// =============================================================================

#[test]
fn test_load_starts_in_first_room() {
    let harness = TestHarness::new().with_module(goblin_cave());
    let progress = harness.store.progress().unwrap();
    assert_eq!(progress.current_room, RoomId::new("entrance"));
    assert!(progress.defeated_encounters.is_empty());
    assert!(!harness.store.in_combat());

    let log = harness.store.log().entries();
    assert_eq!(log[0].role, Role::System);
    assert!(log.iter().any(|e| e.role == Role::Dm && e.text.starts_with("Cave Mouth")));
}

#[test]
fn test_reload_mid_combat_is_full_reset() {
    let mut harness = TestHarness::new().with_module(two_room_module());
    harness.store.move_to("east");
    assert!(harness.store.in_combat());

    harness.store.load_module(Arc::new(two_room_module()));
    assert!(!harness.store.in_combat());
    assert_eq!(harness.room_id(), Some("A"));
    assert_eq!(harness.store.pending_enemy_turns(), 0);
    assert_eq!(
        harness
            .store
            .log()
            .entries()
            .iter()
            .filter(|e| e.role == Role::System)
            .count(),
        1
    );
}

// =============================================================================
// Moving
// =============================================================================

#[test]
fn test_move_appends_player_and_dm_lines() {
    let mut harness = TestHarness::new().with_module(goblin_cave());
    let before = harness.store.log().len();
    assert!(harness.store.move_to("east").is_applied());

    let added = harness.store.log().since(before);
    assert_eq!(added[0].role, Role::Player);
    assert_eq!(added[0].text, "I go east.");
    assert_eq!(added[1].role, Role::Dm);
    assert!(added[1].text.starts_with("Shadowed Antechamber"));
}

#[test]
fn test_move_into_encounter_room_starts_combat() {
    let mut harness = TestHarness::new().with_module(goblin_cave());
    harness.store.move_to("east");

    let encounter = harness.store.active_encounter().unwrap();
    assert_eq!(encounter.name(), "Goblin Ambush");
    assert_eq!(encounter.enemies().len(), 3);

    let ids: HashSet<_> = harness.enemy_ids().into_iter().collect();
    assert_eq!(ids.len(), 3);
}

#[test]
fn test_move_during_combat_rejected_with_one_line() {
    let mut harness = TestHarness::new().with_module(goblin_cave());
    harness.store.move_to("east");
    let before = harness.store.log().len();

    let outcome = harness.store.move_to("west");
    assert!(matches!(outcome, CommandOutcome::Rejected(_)));
    assert_eq!(harness.room_id(), Some("antechamber"));
    assert_eq!(harness.store.log().len(), before + 1);
    assert_eq!(harness.store.log().last().unwrap().role, Role::System);
}

#[test]
fn test_unknown_direction_rejected() {
    let mut harness = TestHarness::new().with_module(goblin_cave());
    let before = harness.store.log().len();
    assert_eq!(
        harness.store.move_to("north"),
        CommandOutcome::Rejected("You cannot go north.".to_string())
    );
    assert_eq!(harness.room_id(), Some("entrance"));
    assert_eq!(harness.store.log().len(), before + 1);
}

#[test]
fn test_fled_encounter_triggers_again() {
    let mut harness = TestHarness::new().with_module(two_room_module());
    harness.store.move_to("east");
    assert!(harness.store.flee().is_applied());
    assert!(harness.store.move_to("west").is_applied());
    assert!(harness.store.move_to("east").is_applied());
    assert!(harness.store.in_combat());
}

#[test]
fn test_visited_rooms_recorded_once() {
    let mut harness = TestHarness::new().with_module(two_room_module());
    harness.store.move_to("east");
    harness.store.flee();
    harness.store.move_to("west");
    let visited = &harness.store.progress().unwrap().visited_rooms;
    assert_eq!(visited, &vec![RoomId::new("A"), RoomId::new("B")]);
}

// =============================================================================
// Available actions
// =============================================================================

#[test]
fn test_available_actions_follow_state() {
    let mut harness = TestHarness::new().with_module(two_room_module());
    assert_eq!(
        harness.store.available_actions(),
        vec![PlayerAction::Move {
            direction: "east".to_string()
        }]
    );

    harness.store.move_to("east");
    let actions = harness.store.available_actions();
    assert_eq!(actions.len(), 2);
    assert_eq!(actions[0].to_string(), "Attack Bandit (5/5)");
    assert_eq!(actions[1], PlayerAction::Flee);
}
