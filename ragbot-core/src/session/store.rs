use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{SessionHistory, Turn};

struct SessionEntry {
    history: SessionHistory,
    last_used: u64,
}

#[derive(Default)]
struct Sessions {
    entries: HashMap<String, SessionEntry>,
    clock: u64,
}

impl Sessions {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Drop the least recently used session
    fn evict_oldest(&mut self) -> Option<String> {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(id, _)| id.clone())?;
        self.entries.remove(&oldest);
        Some(oldest)
    }
}

/// In-memory conversation history keyed by session id.
///
/// A session exists once it has recorded a turn. When `max_sessions` is
/// reached, recording a turn for a new id evicts the least recently used
/// session.
pub struct SessionStore {
    sessions: Mutex<Sessions>,
    max_sessions: Option<usize>,
    retained_turns: usize,
}

impl SessionStore {
    /// - `max_sessions`: cap on distinct sessions (None = unlimited)
    /// - `retained_turns`: turns kept per session
    pub fn new(max_sessions: Option<usize>, retained_turns: usize) -> Self {
        Self {
            sessions: Mutex::new(Sessions::default()),
            max_sessions,
            retained_turns,
        }
    }

    /// Up to `n` most recent turns of `session_id`, oldest first.
    /// Reading marks the session as used; an unknown id yields nothing.
    pub async fn recent(&self, session_id: &str, n: usize) -> Vec<Turn> {
        let mut sessions = self.sessions.lock().await;
        let now = sessions.tick();
        match sessions.entries.get_mut(session_id) {
            Some(entry) => {
                entry.last_used = now;
                entry.history.recent(n)
            }
            None => Vec::new(),
        }
    }

    /// Append a completed turn, creating the session if needed.
    /// Turns with an empty reply are not kept; returns whether it was stored.
    pub async fn record(&self, session_id: &str, turn: Turn) -> bool {
        if turn.reply.is_empty() {
            debug!("[{}] Skipping turn with empty reply", session_id);
            return false;
        }

        let mut sessions = self.sessions.lock().await;
        let now = sessions.tick();

        if !sessions.entries.contains_key(session_id) {
            if let Some(max) = self.max_sessions {
                while sessions.entries.len() >= max {
                    match sessions.evict_oldest() {
                        Some(evicted) => info!("[{}] Evicting least recently used session", evicted),
                        None => break,
                    }
                }
            }
            info!("[{}] Creating new session", session_id);
        }

        let retained_turns = self.retained_turns;
        let entry = sessions
            .entries
            .entry(session_id.to_string())
            .or_insert_with(|| SessionEntry {
                history: SessionHistory::new(retained_turns),
                last_used: now,
            });
        entry.last_used = now;
        entry.history.push(turn);
        true
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        self.sessions.lock().await.entries.contains_key(session_id)
    }

    /// Forget a session; returns whether it existed
    pub async fn delete(&self, session_id: &str) -> bool {
        info!("[{}] Deleting session", session_id);
        self.sessions.lock().await.entries.remove(session_id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.entries.is_empty()
    }
}
