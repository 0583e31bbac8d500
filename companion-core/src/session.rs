//! A game session running on its own task.
//!
//! [`GameSession::spawn`] moves a [`GameStore`] and an optional narrator
//! bridge onto a tokio task and returns a cloneable [`SessionHandle`].
//! Commands travel over an `mpsc` channel and are answered on a `oneshot`;
//! everything that changes (log lines, enemy turns, narrator text) is
//! published on a `broadcast` channel as [`SessionEvent`]s.
//!
//! Enemy turns are deadlines, not timers: each ticket the store queues is
//! held until `enemy_turn_delay` has passed and is dropped the moment its
//! encounter ends, so fleeing or winning cancels the pending answer.

use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use uuid::Uuid;

use crate::adventure::AdventureModule;
use crate::bridge::{BridgeError, LlmBridge};
use crate::character::Skill;
use crate::config::SessionConfig;
use crate::dice::DieRoll;
use crate::log::LogEntry;
use crate::prompt::{build_dm_prompt, conversation, sanitize_llm_output};
use crate::store::{
    AttackReport, CommandOutcome, EnemyTurnOutcome, EnemyTurnTicket, GameStore, SkillCheck,
};

/// DM line logged when no narrator is connected.
pub const OFFLINE_REPLY: &str = "The cavern air chills as you act. (No narrator is connected.)";

/// Player and DM lines sent along with each request.
const HISTORY_TURNS: usize = 20;

const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 256;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session has shut down")]
    Closed,

    #[error("No narrator is connected")]
    NoBridge,

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

/// Published by the session whenever something observable happens.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A new log entry.
    Log(LogEntry),
    /// The log was cleared; entries that follow belong to the new log.
    LogReset,
    /// An enemy answered a player attack.
    EnemyTurn(EnemyTurnOutcome),
    /// A fragment of narrator reply `reply`.
    Chunk { reply: u64, text: String },
    /// Narrator reply `reply` has finished, successfully or not.
    ReplyDone { reply: u64 },
}

type InspectFn = Box<dyn FnOnce(&GameStore) + Send>;
type UpdateFn = Box<dyn FnOnce(&mut GameStore) + Send>;

enum Command {
    LoadModule {
        module: Arc<AdventureModule>,
        reply: oneshot::Sender<CommandOutcome>,
    },
    Move {
        direction: String,
        reply: oneshot::Sender<CommandOutcome>,
    },
    Attack {
        instance_id: Uuid,
        reply: oneshot::Sender<Option<AttackReport>>,
    },
    Flee {
        reply: oneshot::Sender<CommandOutcome>,
    },
    Roll {
        sides: u32,
        modifier: i32,
        reply: oneshot::Sender<Option<DieRoll>>,
    },
    RollSkill {
        skill: Skill,
        note: Option<String>,
        reply: oneshot::Sender<SkillCheck>,
    },
    Say {
        text: String,
        reply: oneshot::Sender<u64>,
    },
    Inspect(InspectFn),
    Update(UpdateFn),
    Shutdown,
}

/// Messages from the task streaming a narrator reply.
enum ReplyMessage {
    Chunk { reply: u64, text: String },
    Done { reply: u64 },
    Failed { reply: u64, error: String },
}

struct ActiveReply {
    serial: u64,
    text: String,
    task: JoinHandle<()>,
}

pub struct GameSession;

impl GameSession {
    /// Start a session task. Must be called inside a tokio runtime.
    pub fn spawn(
        config: SessionConfig,
        module: Option<Arc<AdventureModule>>,
        bridge: Option<Arc<dyn LlmBridge>>,
    ) -> SessionHandle {
        let store = match config.rng_seed {
            Some(seed) => GameStore::seeded(config.rules, seed),
            None => GameStore::new(config.rules),
        };
        Self::spawn_with_store(store, config.enemy_turn_delay, module, bridge)
    }

    /// Start a session around an existing store.
    pub fn spawn_with_store(
        mut store: GameStore,
        enemy_turn_delay: Duration,
        module: Option<Arc<AdventureModule>>,
        bridge: Option<Arc<dyn LlmBridge>>,
    ) -> SessionHandle {
        if let Some(module) = module {
            store.load_module(module);
        }

        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (event_tx, _) = broadcast::channel(EVENT_BUFFER);
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();

        let actor = SessionActor {
            log_generation: store.log().generation(),
            log_seen: store.log().len(),
            store,
            bridge: bridge.clone(),
            enemy_turn_delay,
            commands: command_rx,
            events: event_tx.clone(),
            enemy_turns: VecDeque::new(),
            reply_tx,
            reply_rx,
            active_reply: None,
            reply_serial: 0,
        };
        tokio::spawn(actor.run());

        SessionHandle {
            commands: command_tx,
            events: event_tx,
            bridge,
        }
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Cloneable front door to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<SessionEvent>,
    bridge: Option<Arc<dyn LlmBridge>>,
}

impl SessionHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(make(reply_tx))
            .await
            .map_err(|_| SessionError::Closed)?;
        reply_rx.await.map_err(|_| SessionError::Closed)
    }

    pub async fn load_module(
        &self,
        module: Arc<AdventureModule>,
    ) -> Result<CommandOutcome, SessionError> {
        self.request(|reply| Command::LoadModule { module, reply })
            .await
    }

    pub async fn move_to(&self, direction: impl Into<String>) -> Result<CommandOutcome, SessionError> {
        let direction = direction.into();
        self.request(|reply| Command::Move { direction, reply }).await
    }

    pub async fn attack(&self, instance_id: Uuid) -> Result<Option<AttackReport>, SessionError> {
        self.request(|reply| Command::Attack { instance_id, reply })
            .await
    }

    pub async fn flee(&self) -> Result<CommandOutcome, SessionError> {
        self.request(|reply| Command::Flee { reply }).await
    }

    pub async fn roll(&self, sides: u32, modifier: i32) -> Result<Option<DieRoll>, SessionError> {
        self.request(|reply| Command::Roll {
            sides,
            modifier,
            reply,
        })
        .await
    }

    pub async fn roll_skill(
        &self,
        skill: Skill,
        note: Option<String>,
    ) -> Result<SkillCheck, SessionError> {
        self.request(|reply| Command::RollSkill { skill, note, reply })
            .await
    }

    /// Say something to the narrator. Returns the serial of the reply whose
    /// chunks will follow on the event channel.
    pub async fn say(&self, text: impl Into<String>) -> Result<u64, SessionError> {
        let text = text.into();
        self.request(|reply| Command::Say { text, reply }).await
    }

    /// Run `f` against the store and return what it computes.
    pub async fn inspect<R, F>(&self, f: F) -> Result<R, SessionError>
    where
        R: Send + 'static,
        F: FnOnce(&GameStore) -> R + Send + 'static,
    {
        self.request(|reply| {
            Command::Inspect(Box::new(move |store| {
                let _ = reply.send(f(store));
            }))
        })
        .await
    }

    /// Mutate the store directly, e.g. to manage the character roster.
    pub async fn update<R, F>(&self, f: F) -> Result<R, SessionError>
    where
        R: Send + 'static,
        F: FnOnce(&mut GameStore) -> R + Send + 'static,
    {
        self.request(|reply| {
            Command::Update(Box::new(move |store| {
                let _ = reply.send(f(store));
            }))
        })
        .await
    }

    pub async fn list_models(&self) -> Result<Vec<String>, SessionError> {
        let bridge = self.bridge.as_ref().ok_or(SessionError::NoBridge)?;
        Ok(bridge.list_models().await?)
    }

    pub fn bridge(&self) -> Option<&Arc<dyn LlmBridge>> {
        self.bridge.as_ref()
    }

    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.commands
            .send(Command::Shutdown)
            .await
            .map_err(|_| SessionError::Closed)
    }
}

// ============================================================================
// Actor
// ============================================================================

struct SessionActor {
    store: GameStore,
    bridge: Option<Arc<dyn LlmBridge>>,
    enemy_turn_delay: Duration,

    commands: mpsc::Receiver<Command>,
    events: broadcast::Sender<SessionEvent>,

    /// Tickets waiting for their deadline, earliest first.
    enemy_turns: VecDeque<(Instant, EnemyTurnTicket)>,

    reply_tx: mpsc::UnboundedSender<ReplyMessage>,
    reply_rx: mpsc::UnboundedReceiver<ReplyMessage>,
    active_reply: Option<ActiveReply>,
    reply_serial: u64,

    log_generation: u64,
    log_seen: usize,
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

impl SessionActor {
    async fn run(mut self) {
        tracing::debug!("Session started");
        loop {
            let deadline = self.enemy_turns.front().map(|(at, _)| *at);
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                _ = wait_until(deadline) => self.enemy_turn_due(),
                Some(message) = self.reply_rx.recv() => self.handle_reply(message),
            }
            self.schedule_enemy_turns();
            self.publish_log();
        }

        if let Some(active) = self.active_reply.take() {
            active.task.abort();
        }
        tracing::debug!("Session stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::LoadModule { module, reply } => {
                let _ = reply.send(self.store.load_module(module));
            }
            Command::Move { direction, reply } => {
                let _ = reply.send(self.store.move_to(&direction));
            }
            Command::Attack { instance_id, reply } => {
                let _ = reply.send(self.store.attack_enemy(instance_id));
            }
            Command::Flee { reply } => {
                let _ = reply.send(self.store.flee());
            }
            Command::Roll {
                sides,
                modifier,
                reply,
            } => {
                let _ = reply.send(self.store.roll_dice(sides, modifier));
            }
            Command::RollSkill { skill, note, reply } => {
                let _ = reply.send(self.store.roll_skill(skill, note.as_deref()));
            }
            Command::Say { text, reply } => {
                let _ = reply.send(self.say(text));
            }
            Command::Inspect(f) => f(&self.store),
            Command::Update(f) => f(&mut self.store),
            Command::Shutdown => {}
        }
    }

    // ------------------------------------------------------------------------
    // Enemy turns
    // ------------------------------------------------------------------------

    /// Give every newly queued ticket a deadline and forget tickets whose
    /// encounter is over.
    fn schedule_enemy_turns(&mut self) {
        for ticket in self.store.take_pending_enemy_turns() {
            let at = Instant::now() + self.enemy_turn_delay;
            tracing::debug!(serial = ticket.encounter_serial, "Enemy turn scheduled");
            self.enemy_turns.push_back((at, ticket));
        }
        let before = self.enemy_turns.len();
        self.enemy_turns
            .retain(|(_, ticket)| self.store.is_ticket_live(*ticket));
        if self.enemy_turns.len() < before {
            tracing::debug!(dropped = before - self.enemy_turns.len(), "Enemy turns cancelled");
        }
    }

    fn enemy_turn_due(&mut self) {
        let Some((_, ticket)) = self.enemy_turns.pop_front() else {
            return;
        };
        let outcome = self.store.resolve_enemy_turn(ticket);
        if outcome != EnemyTurnOutcome::Stale {
            let _ = self.events.send(SessionEvent::EnemyTurn(outcome));
        }
    }

    // ------------------------------------------------------------------------
    // Narration
    // ------------------------------------------------------------------------

    fn say(&mut self, text: String) -> u64 {
        self.reply_serial += 1;
        let serial = self.reply_serial;
        self.store.log_mut().player(text);

        if let Some(previous) = self.active_reply.take() {
            tracing::debug!(reply = previous.serial, "Narrator reply superseded");
            previous.task.abort();
        }

        let Some(bridge) = self.bridge.clone() else {
            self.store.log_mut().dm(OFFLINE_REPLY);
            let _ = self.events.send(SessionEvent::ReplyDone { reply: serial });
            return serial;
        };

        let system = build_dm_prompt(&self.store);
        let history = conversation(self.store.log().entries(), HISTORY_TURNS);
        let tx = self.reply_tx.clone();

        let task = tokio::spawn(async move {
            let mut stream = match bridge.stream_reply(&system, &history).await {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = tx.send(ReplyMessage::Failed {
                        reply: serial,
                        error: e.to_string(),
                    });
                    return;
                }
            };
            while let Some(item) = stream.next().await {
                match item {
                    Ok(text) => {
                        let _ = tx.send(ReplyMessage::Chunk {
                            reply: serial,
                            text,
                        });
                    }
                    Err(e) => {
                        let _ = tx.send(ReplyMessage::Failed {
                            reply: serial,
                            error: e.to_string(),
                        });
                        return;
                    }
                }
            }
            let _ = tx.send(ReplyMessage::Done { reply: serial });
        });

        self.active_reply = Some(ActiveReply {
            serial,
            text: String::new(),
            task,
        });
        serial
    }

    fn handle_reply(&mut self, message: ReplyMessage) {
        let serial = match &message {
            ReplyMessage::Chunk { reply, .. }
            | ReplyMessage::Done { reply }
            | ReplyMessage::Failed { reply, .. } => *reply,
        };
        let Some(active) = self.active_reply.as_mut().filter(|a| a.serial == serial) else {
            return;
        };

        match message {
            ReplyMessage::Chunk { reply, text } => {
                active.text.push_str(&text);
                let _ = self.events.send(SessionEvent::Chunk { reply, text });
            }
            ReplyMessage::Done { reply } => {
                let raw = std::mem::take(&mut active.text);
                self.active_reply = None;
                let cleaned = sanitize_llm_output(&raw);
                if cleaned.is_empty() {
                    tracing::warn!(reply, "Narrator reply was empty");
                } else {
                    self.store.log_mut().dm(cleaned);
                }
                let _ = self.events.send(SessionEvent::ReplyDone { reply });
            }
            ReplyMessage::Failed { reply, error } => {
                self.active_reply = None;
                tracing::warn!(reply, %error, "Narrator reply failed");
                self.store.log_mut().system(format!("Error: {error}"));
                let _ = self.events.send(SessionEvent::ReplyDone { reply });
            }
        }
    }

    // ------------------------------------------------------------------------
    // Log forwarding
    // ------------------------------------------------------------------------

    fn publish_log(&mut self) {
        let log = self.store.log();
        if log.generation() != self.log_generation {
            self.log_generation = log.generation();
            self.log_seen = 0;
            let _ = self.events.send(SessionEvent::LogReset);
        }
        for entry in log.since(self.log_seen) {
            let _ = self.events.send(SessionEvent::Log(entry.clone()));
        }
        self.log_seen = log.len();
    }
}
