//! The session actor: delayed enemy turns and narrator streaming.
//!
//! Time is paused, so the one second enemy delay elapses only when the test
//! sleeps past it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{sleep, timeout};

use companion_core::bridge::LlmBridge;
use companion_core::character::{AbilityScores, Character};
use companion_core::config::CombatRules;
use companion_core::log::Role;
use companion_core::session::{GameSession, SessionError, SessionEvent, SessionHandle, OFFLINE_REPLY};
use companion_core::store::{EnemyTurnOutcome, GameStore};
use companion_core::testing::{two_room_module, ScriptedBridge};

const DELAY: Duration = Duration::from_secs(1);

/// Every hit it lands deals 0 damage, and AC 1 can't dodge the bandit's club.
fn punching_bag() -> Character {
    Character::new("Bag")
        .with_abilities(AbilityScores::new(-6, -6, 10, 10, 10, 10))
        .with_max_hp(40)
        .with_armor_class(1)
}

fn start(bridge: Option<Arc<dyn LlmBridge>>) -> SessionHandle {
    let mut store = GameStore::seeded(CombatRules::default(), 7);
    store.add_character(punching_bag());
    GameSession::spawn_with_store(store, DELAY, Some(Arc::new(two_room_module())), bridge)
}

async fn hp(session: &SessionHandle) -> i32 {
    session
        .inspect(|store| store.current_character().map(|c| c.hp).unwrap_or_default())
        .await
        .unwrap()
}

async fn first_enemy(session: &SessionHandle) -> uuid::Uuid {
    session
        .inspect(|store| {
            store
                .active_encounter()
                .and_then(|e| e.enemies().first())
                .map(|e| e.instance_id)
        })
        .await
        .unwrap()
        .expect("in combat")
}

fn drain(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

async fn until_reply_done(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let collect = async {
        let mut seen = Vec::new();
        loop {
            let event = events.recv().await.unwrap();
            let done = matches!(event, SessionEvent::ReplyDone { .. });
            seen.push(event);
            if done {
                return seen;
            }
        }
    };
    timeout(Duration::from_secs(30), collect)
        .await
        .expect("reply should finish")
}

async fn last_dm_line(session: &SessionHandle) -> Option<String> {
    session
        .inspect(|store| store.log().last_by(Role::Dm).map(|e| e.text.clone()))
        .await
        .unwrap()
}

// =============================================================================
// Enemy turns
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_enemy_turn_fires_after_delay() {
    let session = start(None);
    let mut events = session.subscribe();

    session.move_to("east").await.unwrap();
    let target = first_enemy(&session).await;
    let report = session.attack(target).await.unwrap().unwrap();
    assert!(report.enemy_turn.is_some());

    sleep(DELAY / 2).await;
    assert_eq!(hp(&session).await, 40);

    sleep(DELAY).await;
    assert_eq!(hp(&session).await, 37);

    let turns: Vec<_> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            SessionEvent::EnemyTurn(outcome) => Some(outcome),
            _ => None,
        })
        .collect();
    assert_eq!(turns.len(), 1);
    assert!(matches!(turns[0], EnemyTurnOutcome::Hit { damage: 3, .. }));
}

#[tokio::test(start_paused = true)]
async fn test_each_attack_gets_its_own_turn() {
    let session = start(None);
    session.move_to("east").await.unwrap();
    let target = first_enemy(&session).await;

    session.attack(target).await.unwrap();
    session.attack(target).await.unwrap();

    sleep(DELAY * 2).await;
    assert_eq!(hp(&session).await, 34);
}

#[tokio::test(start_paused = true)]
async fn test_flee_cancels_pending_turn() {
    let session = start(None);
    let mut events = session.subscribe();

    session.move_to("east").await.unwrap();
    let target = first_enemy(&session).await;
    session.attack(target).await.unwrap();
    assert!(session.flee().await.unwrap().is_applied());

    sleep(DELAY * 3).await;
    assert_eq!(hp(&session).await, 40);
    assert!(!drain(&mut events)
        .iter()
        .any(|e| matches!(e, SessionEvent::EnemyTurn(_))));
}

#[tokio::test(start_paused = true)]
async fn test_log_lines_are_published() {
    let session = start(None);
    let mut events = session.subscribe();

    session.move_to("nowhere").await.unwrap();
    session.load_module(Arc::new(two_room_module())).await.unwrap();

    let seen = drain(&mut events);
    assert!(matches!(&seen[0], SessionEvent::Log(e) if e.text == "You cannot go nowhere."));
    assert!(matches!(seen[1], SessionEvent::LogReset));
    assert!(matches!(&seen[2], SessionEvent::Log(e) if e.text == "Loaded module: Two Rooms"));
}

// =============================================================================
// Narration
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_reply_streams_then_lands_in_log() {
    let bridge = Arc::new(ScriptedBridge::replying(["The bandit ", "growls."]));
    let dyn_bridge: Arc<dyn LlmBridge> = bridge.clone();
    let session = start(Some(dyn_bridge));
    let mut events = session.subscribe();

    let reply = session.say("I wave hello.").await.unwrap();
    let seen = until_reply_done(&mut events).await;

    let chunks: Vec<&str> = seen
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Chunk { reply: r, text } if *r == reply => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(chunks, vec!["The bandit ", "growls."]);
    assert_eq!(last_dm_line(&session).await.as_deref(), Some("The bandit growls."));

    let prompts = bridge.prompts();
    assert_eq!(prompts.len(), 1);
    let (system, history) = &prompts[0];
    assert!(system.contains("Name: Bag"));
    assert!(system.contains("=== CURRENT LOCATION ==="));
    assert!(history.last().unwrap().text.ends_with("I wave hello."));
}

#[tokio::test(start_paused = true)]
async fn test_reply_is_sanitized() {
    let bridge: Arc<dyn LlmBridge> = Arc::new(ScriptedBridge::replying([
        "<think>They want a door.</think>",
        "The door creaks open. The hinge",
    ]));
    let session = start(Some(bridge));
    let mut events = session.subscribe();

    session.say("I push the door.").await.unwrap();
    until_reply_done(&mut events).await;
    assert_eq!(
        last_dm_line(&session).await.as_deref(),
        Some("The door creaks open. The")
    );
}

#[tokio::test(start_paused = true)]
async fn test_bridge_failure_becomes_one_system_line() {
    let bridge: Arc<dyn LlmBridge> = Arc::new(ScriptedBridge::failing("model offline"));
    let session = start(Some(bridge));
    let mut events = session.subscribe();

    session.say("Hello?").await.unwrap();
    until_reply_done(&mut events).await;

    let errors = session
        .inspect(|store| {
            store
                .log()
                .entries()
                .iter()
                .filter(|e| e.role == Role::System && e.text.starts_with("Error:"))
                .map(|e| e.text.clone())
                .collect::<Vec<_>>()
        })
        .await
        .unwrap();
    assert_eq!(errors, vec!["Error: Stream error: model offline".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_no_bridge_uses_canned_line() {
    let session = start(None);
    let mut events = session.subscribe();

    session.say("Anyone there?").await.unwrap();
    until_reply_done(&mut events).await;
    assert_eq!(last_dm_line(&session).await.as_deref(), Some(OFFLINE_REPLY));
    assert!(matches!(
        session.list_models().await,
        Err(SessionError::NoBridge)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_new_message_supersedes_stalled_reply() {
    let bridge: Arc<dyn LlmBridge> = Arc::new(ScriptedBridge::stalled());
    let session = start(Some(bridge));

    let count = |role: Role| {
        session.inspect(move |store| {
            store
                .log()
                .entries()
                .iter()
                .filter(|e| e.role == role)
                .count()
        })
    };
    let dm_before = count(Role::Dm).await.unwrap();

    let first = session.say("One.").await.unwrap();
    let second = session.say("Two.").await.unwrap();
    assert!(second > first);

    sleep(Duration::from_secs(5)).await;
    assert_eq!(count(Role::Dm).await.unwrap(), dm_before);
    assert_eq!(count(Role::Player).await.unwrap(), 2);
    assert_eq!(session.list_models().await.unwrap(), vec!["scripted".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_closes_handle() {
    let session = start(None);
    session.shutdown().await.unwrap();
    assert!(matches!(
        session.move_to("east").await,
        Err(SessionError::Closed)
    ));
}
