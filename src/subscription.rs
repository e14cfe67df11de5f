//! Bookkeeping for live chat subscriptions.
//!
//! At most one live stream task may exist per chat id: subscribing twice
//! must not leak a second stream, and unsubscribing must tear the task down.
//! The registry is a plain owned object — engines construct their own, so
//! tests and multi-account setups can run independent instances side by
//! side.

use std::collections::HashMap;

use tokio::task::JoinHandle;

/// Registry of live subscription tasks, keyed by chat id.
#[derive(Default)]
pub struct SubscriptionRegistry {
    active: HashMap<String, JoinHandle<()>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a live (not yet finished) task exists for this chat.
    ///
    /// A task whose stream ended on its own counts as inactive, so a caller
    /// may subscribe again after a stream error.
    pub fn is_active(&self, chat_id: &str) -> bool {
        self.active
            .get(chat_id)
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Track a new subscription task. Any finished leftover entry for the
    /// same chat is replaced.
    pub fn insert(&mut self, chat_id: &str, handle: JoinHandle<()>) {
        if let Some(old) = self.active.insert(chat_id.to_string(), handle) {
            // Stale handle from a stream that already terminated
            old.abort();
        }
    }

    /// Remove and return the task handle for a chat, if any.
    pub fn remove(&mut self, chat_id: &str) -> Option<JoinHandle<()>> {
        self.active.remove(chat_id)
    }

    /// Number of tracked live subscriptions.
    pub fn len(&self) -> usize {
        self.active
            .values()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Abort every tracked task.
    pub fn shutdown_all(&mut self) {
        for (_, handle) in self.active.drain() {
            handle.abort();
        }
    }
}
