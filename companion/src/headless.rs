//! Line-oriented play.
//!
//! Lines starting with `#` are commands; anything else is said to the
//! narrator. Session events are printed as they arrive:
//! - `[DM]`, `[Player]` and `[System]` lines mirror the game log
//! - `[ENEMY]` marks an enemy turn resolving

use std::io::Write as _;
use std::sync::Arc;

use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

use companion_core::character::{AbilityScores, Character, InventoryItem, Skill};
use companion_core::dice::DiceExpression;
use companion_core::prompt::sanitize_llm_output;
use companion_core::store::EnemyTurnOutcome;
use companion_core::{
    AdventureModule, CommandOutcome, PlayerAction, Provider, Role, SessionError, SessionEvent,
    SessionHandle,
};

/// Command line options.
#[derive(Debug)]
pub struct Options {
    pub name: String,
    pub provider: Option<Provider>,
    pub seed: Option<u64>,
    pub offline: bool,
}

pub fn parse_options(args: &[String]) -> Result<Options, String> {
    let mut options = Options {
        name: "Adventurer".to_string(),
        provider: None,
        seed: None,
        offline: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--name" => {
                if let Some(name) = args.get(i + 1) {
                    options.name = name.clone();
                    i += 1;
                }
            }
            "--provider" => {
                if let Some(provider) = args.get(i + 1) {
                    options.provider = Some(provider.parse().map_err(|e| format!("{e}"))?);
                    i += 1;
                }
            }
            "--seed" => {
                if let Some(seed) = args.get(i + 1) {
                    options.seed = Some(
                        seed.parse()
                            .map_err(|_| format!("Invalid seed: {seed}"))?,
                    );
                    i += 1;
                }
            }
            "--offline" => options.offline = true,
            other => return Err(format!("Unknown argument: {other}")),
        }
        i += 1;
    }
    Ok(options)
}

/// A level 1 fighter ready to play.
pub fn quick_start_character(name: &str) -> Character {
    Character::new(name)
        .with_identity("Human", "Fighter", "Soldier")
        .with_abilities(AbilityScores::new(16, 12, 14, 10, 12, 8))
        .with_max_hp(12)
        .with_armor_class(16)
        .with_skills([Skill::Athletics, Skill::Perception, Skill::Intimidation])
        .with_item(InventoryItem::new("Longsword").equipped())
        .with_item(InventoryItem::new("Chain Mail").equipped())
        .with_item(InventoryItem::new("Explorer's Pack"))
        .with_gold(10)
}

const HELP: &[&str] = &[
    "  #go <direction>      - Take an exit",
    "  #attack <n>          - Attack enemy n (see #actions)",
    "  #flee                - Leave the fight",
    "  #roll <dice>         - Roll one die, e.g. d20+3",
    "  #check <skill> [why] - Skill check against the last DC named",
    "  #actions             - What you can do right now",
    "  #status              - Character and location",
    "  #models              - Models the narrator offers",
    "  #load                - Restart the adventure",
    "  #quit                - Exit",
    "  (anything else is said to the DM)",
];

pub async fn run(session: SessionHandle, module: Arc<AdventureModule>) -> Result<(), SessionError> {
    let printer = tokio::spawn(print_events(session.subscribe()));

    println!("=== {} ===", module.title);
    println!("Commands:");
    for line in HELP {
        println!("{line}");
    }
    println!();

    report(session.load_module(Arc::clone(&module)).await?);

    let mut lines = BufReader::new(io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                eprintln!("Error reading input: {e}");
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let Some(command) = line.strip_prefix('#') else {
            session.say(line).await?;
            continue;
        };

        let mut parts = command.split_whitespace();
        match parts.next() {
            Some("quit") | Some("exit") => {
                println!("Goodbye!");
                break;
            }
            Some("go") => match parts.next() {
                Some(direction) => report(session.move_to(direction).await?),
                None => println!("[ERROR] Usage: #go <direction>"),
            },
            Some("attack") => attack(&session, parts.next()).await?,
            Some("flee") => report(session.flee().await?),
            Some("roll") => roll(&session, parts.next()).await?,
            Some("check") => {
                let skill = parts.next().map(str::parse::<Skill>);
                let note: Vec<&str> = parts.collect();
                match skill {
                    Some(Ok(skill)) => {
                        let note = (!note.is_empty()).then(|| note.join(" "));
                        let check = session.roll_skill(skill, note).await?;
                        if let Some(success) = check.succeeded() {
                            println!("[CHECK] {}", if success { "Success" } else { "Failure" });
                        }
                    }
                    Some(Err(e)) => println!("[ERROR] {e}"),
                    None => println!("[ERROR] Usage: #check <skill> [note]"),
                }
            }
            Some("actions") => {
                let actions = session.inspect(|store| store.available_actions()).await?;
                print_actions(&actions);
            }
            Some("status") => {
                let status = session.inspect(status_lines).await?;
                println!("[STATUS]");
                for line in status {
                    println!("  {line}");
                }
            }
            Some("models") => match session.list_models().await {
                Ok(models) => println!("[MODELS] {}", models.join(", ")),
                Err(e) => println!("[ERROR] {e}"),
            },
            Some("load") => report(session.load_module(Arc::clone(&module)).await?),
            Some("help") => {
                for line in HELP {
                    println!("{line}");
                }
            }
            _ => println!("[ERROR] Unknown command. Type #help for help."),
        }
        std::io::stdout().flush().ok();
    }

    session.shutdown().await.ok();
    printer.abort();
    Ok(())
}

fn report(outcome: CommandOutcome) {
    if let CommandOutcome::Rejected(reason) = outcome {
        tracing::debug!(%reason, "Command rejected");
    }
}

async fn attack(session: &SessionHandle, which: Option<&str>) -> Result<(), SessionError> {
    let targets: Vec<_> = session
        .inspect(|store| {
            store
                .available_actions()
                .into_iter()
                .filter_map(|action| match action {
                    PlayerAction::Attack { instance_id, .. } => Some(instance_id),
                    _ => None,
                })
                .collect::<Vec<_>>()
        })
        .await?;

    let index = which.and_then(|n| n.parse::<usize>().ok()).unwrap_or(1);
    match index.checked_sub(1).and_then(|i| targets.get(i)) {
        Some(&target) => {
            session.attack(target).await?;
        }
        None if targets.is_empty() => println!("[ERROR] There is nothing to attack."),
        None => println!("[ERROR] Pick an enemy between 1 and {}.", targets.len()),
    }
    Ok(())
}

async fn roll(session: &SessionHandle, notation: Option<&str>) -> Result<(), SessionError> {
    let expr = match DiceExpression::parse(notation.unwrap_or("d20")) {
        Ok(expr) => expr,
        Err(e) => {
            println!("[ERROR] {e}");
            return Ok(());
        }
    };
    match expr.terms.as_slice() {
        [term] if term.count == 1 => {
            session.roll(term.sides, expr.modifier).await?;
        }
        _ => println!("[ERROR] Roll one die at a time, e.g. d20+3."),
    }
    Ok(())
}

fn print_actions(actions: &[PlayerAction]) {
    println!("[ACTIONS]");
    let mut target = 0;
    for action in actions {
        match action {
            PlayerAction::Attack { label, .. } => {
                target += 1;
                println!("  #attack {target}  {label}");
            }
            PlayerAction::Move { direction } => println!("  #go {direction}"),
            PlayerAction::Flee => println!("  #flee"),
        }
    }
}

fn status_lines(store: &companion_core::GameStore) -> Vec<String> {
    let mut lines = Vec::new();
    match store.current_character() {
        Some(c) => {
            lines.push(format!("Character: {} ({} {} {})", c.name, c.race, c.class, c.level));
            lines.push(format!("HP: {}/{}  AC: {}", c.hp, c.max_hp, c.armor_class));
        }
        None => lines.push("Character: none".to_string()),
    }
    if let Some(room) = store.current_room() {
        lines.push(format!("Location: {}", room.name));
    }
    match store.active_encounter() {
        Some(encounter) => {
            let enemies: Vec<String> = encounter
                .enemies()
                .iter()
                .map(|e| format!("{} {}/{}", e.name, e.hp, e.max_hp))
                .collect();
            lines.push(format!("In combat: {} ({})", encounter.name(), enemies.join(", ")));
        }
        None => lines.push("In combat: no".to_string()),
    }
    if let Some(roll) = store.last_roll() {
        lines.push(format!("Last roll: {roll}"));
    }
    if let Some(request) = store.pending_roll_request() {
        lines.push(format!("Roll requested: {request}"));
    }
    lines
}

async fn print_events(mut events: broadcast::Receiver<SessionEvent>) {
    let mut streamed = String::new();
    let mut finished: Option<String> = None;
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "Event printer fell behind");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        match event {
            SessionEvent::Log(entry) => {
                // A finished reply was already shown chunk by chunk.
                let echo = finished.take().is_some_and(|text| {
                    entry.role == Role::Dm && entry.text == sanitize_llm_output(&text)
                });
                if !echo {
                    println!("[{}] {}", entry.role, entry.text);
                }
            }
            SessionEvent::LogReset => println!("----"),
            SessionEvent::EnemyTurn(outcome) => match outcome {
                EnemyTurnOutcome::Hit { attacker, damage, .. } => {
                    println!("[ENEMY] {attacker} hits for {damage}.")
                }
                EnemyTurnOutcome::Miss { attacker, .. } => println!("[ENEMY] {attacker} misses."),
                EnemyTurnOutcome::Idle { .. } | EnemyTurnOutcome::Stale => {}
            },
            SessionEvent::Chunk { text, .. } => {
                if streamed.is_empty() {
                    print!("[DM] ");
                }
                streamed.push_str(&text);
                print!("{text}");
                std::io::stdout().flush().ok();
            }
            SessionEvent::ReplyDone { .. } => {
                if !streamed.is_empty() {
                    println!();
                    finished = Some(std::mem::take(&mut streamed));
                }
            }
        }
    }
}
