use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::keypath::escape_field_key;
use crate::message::Message;
use crate::util::unix_millis;

/// A conversation: participants, per-user read cursors, and the cached
/// ordered message list.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    /// Participant identifiers (emails); exactly the set used for partner
    /// resolution
    pub participants: Vec<String>,
    pub created_at: u64,
    /// Escaped user identifier -> last-read cursor (unix ms). Only the
    /// escaped form is ever stored or compared.
    pub last_read_by: HashMap<String, u64>,
    /// Messages ordered ascending by timestamp, mirroring the latest
    /// reconciled snapshot
    pub messages: Vec<Message>,
}

impl Chat {
    pub fn new(id: String, participants: Vec<String>) -> Self {
        Self {
            id,
            participants,
            created_at: unix_millis(),
            last_read_by: HashMap::new(),
            messages: Vec::new(),
        }
    }

    /// Get a message by ID
    pub fn get_message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|msg| msg.id == id)
    }

    /// Get a mutable message by ID
    pub fn get_message_mut(&mut self, id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|msg| msg.id == id)
    }

    /// The newest cached message, if any.
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Get the last message timestamp
    pub fn last_message_time(&self) -> Option<u64> {
        self.messages.last().map(|msg| msg.timestamp)
    }

    /// Remove a message and every reply that points at it. Returns how many
    /// messages were removed.
    pub fn remove_message_cascade(&mut self, message_id: &str) -> usize {
        let before = self.messages.len();
        self.messages
            .retain(|msg| msg.id != message_id && msg.reply_to.as_deref() != Some(message_id));
        before - self.messages.len()
    }

    /// Last-read cursor for a user, 0 when the user has never read anything.
    pub fn cursor_for(&self, user: &str) -> u64 {
        self.last_read_by
            .get(&escape_field_key(user))
            .copied()
            .unwrap_or(0)
    }

    /// Advance a user's last-read cursor, never moving it backwards.
    /// Returns the resulting cursor value.
    pub fn advance_cursor(&mut self, user: &str, timestamp: u64) -> u64 {
        let entry = self
            .last_read_by
            .entry(escape_field_key(user))
            .or_insert(0);
        *entry = (*entry).max(timestamp);
        *entry
    }

    /// Count messages that are unread for `user`.
    ///
    /// A message counts when the user has not read it, OR when it was
    /// mutated (reaction, edit) after the user's last-read cursor — so new
    /// activity on an already-read message resurfaces it.
    pub fn unread_count_for(&self, user: &str) -> usize {
        let cursor = self.cursor_for(user);
        self.messages
            .iter()
            .filter(|msg| {
                msg.sender != user
                    && (!msg.read_by.iter().any(|u| u == user) || msg.updated_at > cursor)
            })
            .count()
    }

    /// Get the other participant of a two-party chat
    pub fn get_other_participant(&self, my_email: &str) -> Option<String> {
        self.participants.iter().find(|&p| p != my_email).cloned()
    }

    /// Check if a user is a participant in this chat
    pub fn has_participant(&self, email: &str) -> bool {
        self.participants.iter().any(|p| p == email)
    }
}
