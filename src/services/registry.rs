//! Conversation session registry.
//!
//! Maps a caller-supplied conversation id to a [`ConversationSession`]
//! holding the accumulated chat history, so follow-up prompts share
//! context with earlier turns. Sessions are created lazily on first use.
//!
//! The map is a sharded concurrent map and creation goes through its
//! atomic entry API, so two concurrent first requests for the same id
//! resolve to exactly one session. Growth is bounded two ways: a
//! background sweep removes sessions idle past the configured timeout,
//! and the least-recently-used entry is evicted when a new session would
//! exceed the capacity limit.

use crate::core::config::SessionConfig;
use crate::services::provider::ChatMessage;
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Registry key used when the caller supplies no conversation id.
///
/// An absent id is a valid conversation of its own: every request without
/// an id lands in this one shared session.
pub const DEFAULT_CONVERSATION_KEY: &str = "(default)";

/// One logical conversation and its accumulated message history.
pub struct ConversationSession {
    id: String,
    history: Mutex<Vec<ChatMessage>>,
    last_used: Mutex<Instant>,
}

impl ConversationSession {
    fn new(id: String) -> Self {
        Self {
            id,
            history: Mutex::new(Vec::new()),
            last_used: Mutex::new(Instant::now()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Append a user turn to the history.
    pub fn push_user(&self, content: String) {
        self.history.lock().unwrap().push(ChatMessage::user(content));
    }

    /// Append an assistant turn to the history.
    ///
    /// Called when a relay finishes (or is cut off with a partial reply,
    /// so follow-ups still see what the caller saw).
    pub fn push_assistant(&self, content: String) {
        self.history
            .lock()
            .unwrap()
            .push(ChatMessage::assistant(content));
    }

    /// Snapshot of the full history, oldest first.
    pub fn history_snapshot(&self) -> Vec<ChatMessage> {
        self.history.lock().unwrap().clone()
    }

    /// Number of messages recorded so far.
    pub fn turn_count(&self) -> usize {
        self.history.lock().unwrap().len()
    }

    fn touch(&self) {
        *self.last_used.lock().unwrap() = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_used.lock().unwrap().elapsed()
    }
}

/// Registry of live conversation sessions, keyed by conversation id.
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<ConversationSession>>,
    idle_timeout: Duration,
    max_entries: usize,
}

impl SessionRegistry {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            idle_timeout: config.idle_timeout,
            max_entries: config.max_entries,
        }
    }

    /// Resolve the session for `conversation_id`, creating it on first use.
    ///
    /// An absent id maps to [`DEFAULT_CONVERSATION_KEY`]. Creation is
    /// atomic: concurrent callers racing on a new id all observe the same
    /// winning session.
    pub fn get_or_create(&self, conversation_id: Option<&str>) -> Arc<ConversationSession> {
        let key = conversation_id.unwrap_or(DEFAULT_CONVERSATION_KEY);

        if let Some(existing) = self.sessions.get(key) {
            existing.touch();
            return existing.clone();
        }

        // Capacity check is done before the entry call so the map shard
        // lock is not held while iterating for the LRU victim.
        if self.sessions.len() >= self.max_entries {
            self.evict_lru();
        }

        let session = self
            .sessions
            .entry(key.to_string())
            .or_insert_with(|| {
                tracing::info!(conversation_id = %key, "Creating new conversation session");
                Arc::new(ConversationSession::new(key.to_string()))
            })
            .clone();
        session.touch();
        session
    }

    /// Look up an existing session without creating one.
    pub fn get(&self, conversation_id: &str) -> Option<Arc<ConversationSession>> {
        self.sessions.get(conversation_id).map(|entry| {
            entry.touch();
            entry.clone()
        })
    }

    /// Remove a session. Returns whether it existed.
    pub fn evict(&self, conversation_id: &str) -> bool {
        self.sessions.remove(conversation_id).is_some()
    }

    /// Remove sessions idle longer than the configured timeout.
    ///
    /// Invoked periodically by the background sweep task. Returns how many
    /// sessions were removed.
    pub fn sweep_idle(&self) -> usize {
        let before = self.sessions.len();
        let idle_timeout = self.idle_timeout;
        self.sessions.retain(|_, session| session.idle_for() < idle_timeout);
        before.saturating_sub(self.sessions.len())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn evict_lru(&self) {
        let victim = self
            .sessions
            .iter()
            .max_by_key(|entry| entry.idle_for())
            .map(|entry| entry.key().clone());

        if let Some(key) = victim {
            tracing::info!(conversation_id = %key, "Evicting least-recently-used session");
            self.sessions.remove(&key);
        }
    }
}
