//! Conversation state and the store that owns it.

mod memory;

pub use memory::InMemorySessionStore;

use crate::call::OperationCall;
use crate::confirmation::PendingConfirmation;
use crate::response::UnderstoodCommand;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Executed commands kept per conversation.
pub const HISTORY_LIMIT: usize = 10;

/// Monotonic time source, injectable for expiry tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now
            .lock()
            .map(|now| *now)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }
}

/// What a conversation is doing. At most one of pending call / pending confirmation exists.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Collecting(OperationCall),
    Confirming(PendingConfirmation),
}

/// One executed command and what it printed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub command: UnderstoodCommand,
    pub output: Vec<String>,
    /// Wall-clock milliseconds since the Unix epoch.
    pub executed_at_ms: u64,
}

impl HistoryEntry {
    pub fn new(command: UnderstoodCommand, output: Vec<String>) -> Self {
        let executed_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self {
            command,
            output,
            executed_at_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationState {
    pub conversation_id: String,
    pub phase: Phase,
    pub created_at: Instant,
    pub last_touched_at: Instant,
    /// Oldest first, at most [`HISTORY_LIMIT`] entries.
    pub history: VecDeque<HistoryEntry>,
}

impl ConversationState {
    pub fn new(conversation_id: impl Into<String>, now: Instant) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            phase: Phase::Idle,
            created_at: now,
            last_touched_at: now,
            history: VecDeque::with_capacity(HISTORY_LIMIT),
        }
    }

    /// Call being collected or awaiting confirmation, if any.
    pub fn pending_call(&self) -> Option<&OperationCall> {
        match &self.phase {
            Phase::Idle => None,
            Phase::Collecting(call) => Some(call),
            Phase::Confirming(pending) => Some(pending.call()),
        }
    }

    pub fn pending_operation(&self) -> Option<&str> {
        self.pending_call().map(OperationCall::name)
    }

    pub fn record(&mut self, entry: HistoryEntry) {
        if self.history.len() == HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(entry);
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.phase, Phase::Idle)
    }

    pub fn is_expired(&self, now: Instant, idle_timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_touched_at) > idle_timeout
    }

    /// Whether the sweeper may drop this state. A pending request is kept for one more
    /// timeout so its next turn can still report the expiry.
    pub fn is_purgeable(&self, now: Instant, idle_timeout: Duration) -> bool {
        let window = if self.is_idle() {
            idle_timeout
        } else {
            idle_timeout.saturating_mul(2)
        };
        self.is_expired(now, window)
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_touched_at = now;
    }

    pub fn reset(&mut self) {
        self.phase = Phase::Idle;
    }
}

/// Held for the duration of one turn; dropping it releases the conversation.
pub struct SessionGuard {
    _held: Box<dyn Send + Sync>,
}

impl SessionGuard {
    pub fn new<G: Send + Sync + 'static>(inner: G) -> Self {
        Self {
            _held: Box::new(inner),
        }
    }
}

/// Per-conversation storage with per-key serialization. `lock` must be held across
/// `get` .. `put` so concurrent turns on the same conversation apply in order.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn lock(&self, conversation_id: &str) -> SessionGuard;
    async fn get(&self, conversation_id: &str) -> Option<ConversationState>;
    async fn put(&self, state: ConversationState);
    async fn delete(&self, conversation_id: &str) -> bool;
    /// Drops conversations untouched for longer than `idle_timeout`. Returns how many.
    async fn purge_expired(&self, now: Instant, idle_timeout: Duration) -> usize;
    async fn active_count(&self) -> usize;
}
