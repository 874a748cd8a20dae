//! In-memory conversation state, keyed by session.
//!
//! The store owns every session's history and its most recent artifact.
//! Nothing survives a process restart.  Sessions come into existence on
//! first write and vanish on [`reset`](ConversationStore::reset); callers
//! hold the store behind an `Arc` and share it across turns.
//!
//! Operations are short and synchronous; the lock is never held across an
//! await.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::types::{Artifact, Message};

/// The number of most-recent messages a session retains.
pub const MAX_HISTORY_MESSAGES: usize = 20;

#[derive(Debug, Default)]
struct Session {
    messages: Vec<Message>,
    last_artifact: Option<Artifact>,
}

/// Per-session conversation history and last-artifact cache.
///
/// Histories are bounded: writes keep only the [`MAX_HISTORY_MESSAGES`]
/// most recent entries, dropping the oldest first.  Reads hand back copies,
/// so a caller can append to its copy and write it back without holding
/// any lock in between; when two turns race on one session, the last write
/// wins.
#[derive(Debug, Default)]
pub struct ConversationStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl ConversationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of the session's history, oldest first.  Empty for a session
    /// that has never been written.
    pub fn history(&self, session_id: &str) -> Vec<Message> {
        let sessions = self.sessions.lock().unwrap();
        sessions
            .get(session_id)
            .map(|session| session.messages.clone())
            .unwrap_or_default()
    }

    /// Replace the session's history, retaining only the most recent
    /// [`MAX_HISTORY_MESSAGES`] entries.
    pub fn set_history(&self, session_id: &str, mut messages: Vec<Message>) {
        let excess = messages.len().saturating_sub(MAX_HISTORY_MESSAGES);
        if excess > 0 {
            messages.drain(..excess);
        }
        let mut sessions = self.sessions.lock().unwrap();
        sessions.entry(session_id.to_string()).or_default().messages = messages;
    }

    /// Drop the session's history and artifact.  A no-op for an unknown
    /// session.
    pub fn reset(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().unwrap();
        sessions.remove(session_id);
    }

    /// Record the session's most recent artifact, replacing any previous
    /// one.
    pub fn set_last_artifact(&self, session_id: &str, artifact: Artifact) {
        let mut sessions = self.sessions.lock().unwrap();
        sessions
            .entry(session_id.to_string())
            .or_default()
            .last_artifact = Some(artifact);
    }

    /// The session's most recent artifact, if any block has ever closed.
    pub fn last_artifact(&self, session_id: &str) -> Option<Artifact> {
        let sessions = self.sessions.lock().unwrap();
        sessions
            .get(session_id)
            .and_then(|session| session.last_artifact.clone())
    }
}
