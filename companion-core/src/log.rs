//! The session log: an append-only transcript of narration, player actions
//! and system notices.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Dm,
    Player,
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Dm => "DM",
            Role::Player => "Player",
            Role::System => "System",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: Uuid,
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.role, self.text)
    }
}

/// Ordered log entries. Entries are never edited; the whole log may be reset.
#[derive(Debug, Clone, Default)]
pub struct GameLog {
    entries: Vec<LogEntry>,
    /// Bumped by every [`GameLog::reset`] so observers can tell a fresh log
    /// from one that merely grew.
    generation: u64,
}

impl GameLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, role: Role, text: impl Into<String>) -> &LogEntry {
        let index = self.entries.len();
        self.entries.push(LogEntry::new(role, text));
        &self.entries[index]
    }

    pub fn dm(&mut self, text: impl Into<String>) {
        self.push(Role::Dm, text);
    }

    pub fn player(&mut self, text: impl Into<String>) {
        self.push(Role::Player, text);
    }

    pub fn system(&mut self, text: impl Into<String>) {
        self.push(Role::System, text);
    }

    /// Drop every entry and start over with a single system line.
    pub fn reset(&mut self, text: impl Into<String>) {
        self.entries.clear();
        self.generation += 1;
        self.system(text);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    /// Most recent entry with the given role.
    pub fn last_by(&self, role: Role) -> Option<&LogEntry> {
        self.entries.iter().rev().find(|e| e.role == role)
    }

    /// Entries appended after the first `from`.
    pub fn since(&self, from: usize) -> &[LogEntry] {
        self.entries.get(from..).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_order() {
        let mut log = GameLog::new();
        log.system("ready");
        log.player("I look around");
        log.dm("Shadows.");
        let roles: Vec<Role> = log.entries().iter().map(|e| e.role).collect();
        assert_eq!(roles, vec![Role::System, Role::Player, Role::Dm]);
        assert_eq!(log.last_by(Role::Player).unwrap().text, "I look around");
    }

    #[test]
    fn test_reset_keeps_one_entry() {
        let mut log = GameLog::new();
        log.dm("one");
        log.dm("two");
        log.reset("Module loaded");
        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].role, Role::System);
        assert_eq!(log.generation(), 1);
    }

    #[test]
    fn test_since() {
        let mut log = GameLog::new();
        log.dm("a");
        log.dm("b");
        assert_eq!(log.since(1).len(), 1);
        assert!(log.since(5).is_empty());
    }
}
