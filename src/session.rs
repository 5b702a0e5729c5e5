//! Per-user conversation history.
//!
//! [`SessionStore`] maps a user identifier to its ordered list of
//! [`ConversationTurn`]s for the lifetime of the process. Sessions grow
//! without eviction and disappear only through [`SessionStore::clear`].
//!
//! # Concurrency
//!
//! The map itself sits behind a `RwLock`; each session additionally owns an
//! async mutex. Callers that read history, generate a reply and append the
//! new turn should hold [`SessionStore::lock`] for the whole sequence so
//! that concurrent requests for the same user are serialized. Requests for
//! different users never contend on a session lock.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::models::ConversationTurn;

/// User identifier applied when a request does not name one.
pub const DEFAULT_USER_ID: &str = "default";

type SessionHandle = Arc<Mutex<Vec<ConversationTurn>>>;

/// In-memory conversation sessions keyed by user identifier.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

/// Exclusive access to one user's history, obtained via [`SessionStore::lock`].
pub struct SessionGuard {
    turns: OwnedMutexGuard<Vec<ConversationTurn>>,
}

impl SessionGuard {
    pub fn history(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn append(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, user_id: &str) -> SessionHandle {
        if let Some(handle) = self
            .sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(user_id)
        {
            return handle.clone();
        }
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Vec::new())))
            .clone()
    }

    /// Locks the session for `user_id`, creating an empty one if needed.
    pub async fn lock(&self, user_id: &str) -> SessionGuard {
        let handle = self.handle(user_id);
        SessionGuard {
            turns: handle.lock_owned().await,
        }
    }

    /// Snapshot of the history for `user_id`; empty for unknown users.
    pub async fn history(&self, user_id: &str) -> Vec<ConversationTurn> {
        let handle = self
            .sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(user_id)
            .cloned();
        match handle {
            Some(handle) => handle.lock().await.clone(),
            None => Vec::new(),
        }
    }

    pub async fn append(&self, user_id: &str, turn: ConversationTurn) {
        self.lock(user_id).await.append(turn);
    }

    /// Removes the session. Returns `false` when no session existed.
    pub fn clear(&self, user_id: &str) -> bool {
        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(user_id)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
