//! Delivery and read receipts, plus the unread counter they feed.
//!
//! Receipts live in two places: the per-message `readBy`/`deliveredTo` sets,
//! and the per-chat `lastReadBy` cursor map keyed by escaped user
//! identifier. Marking a message read advances both; the unread counter
//! compares each message's update cursor against the read cursor so new
//! activity on an already-read message resurfaces it.

use serde_json::json;
use tracing::warn;

use crate::keypath::escape_field_key;
use crate::messenger::Messenger;
use crate::store::{chat_path, message_path, Fields};

impl Messenger {
    /// Record that `user` received a message. Skips the sender and users
    /// already in the set.
    pub async fn mark_message_as_delivered(&self, chat_id: &str, user: &str, message_id: &str) {
        {
            let mut state = self.state.lock().await;
            let Some(chat) = state.get_chat_mut(chat_id) else {
                return;
            };
            let Some(message) = chat.get_message_mut(message_id) else {
                return;
            };
            if message.sender == user {
                return;
            }
            if message.delivered_to.iter().any(|u| u == user) {
                return;
            }
            // Optimistic set add; the union write below confirms it
            message.delivered_to.push(user.to_string());
        }

        if let Err(e) = self
            .store
            .union_add(&message_path(chat_id, message_id), "deliveredTo", user)
            .await
        {
            warn!(chat_id = %chat_id, message_id = %message_id, error = %e, "failed to persist delivery mark");
        }
    }

    /// Record that `user` viewed a message and advance their last-read
    /// cursor to the message's update time.
    pub async fn mark_message_as_read(&self, chat_id: &str, user: &str, message_id: &str) {
        let cursor = {
            let mut state = self.state.lock().await;
            let Some(chat) = state.get_chat_mut(chat_id) else {
                return;
            };
            let Some(message) = chat.get_message_mut(message_id) else {
                return;
            };
            if message.sender == user {
                return;
            }
            if message.read_by.iter().any(|u| u == user) {
                return;
            }
            message.read_by.push(user.to_string());

            // The cursor tracks the newest message *state* the user has
            // seen, so it advances to updated_at, not timestamp
            let seen = message.updated_at;
            chat.advance_cursor(user, seen)
        };

        if let Err(e) = self
            .store
            .union_add(&message_path(chat_id, message_id), "readBy", user)
            .await
        {
            warn!(chat_id = %chat_id, message_id = %message_id, error = %e, "failed to persist read mark");
        }

        let mut patch = Fields::new();
        patch.insert(
            format!("lastReadBy.{}", escape_field_key(user)),
            json!(cursor),
        );
        if let Err(e) = self.store.set_merge(&chat_path(chat_id), patch).await {
            warn!(chat_id = %chat_id, error = %e, "failed to persist read cursor");
        }
    }

    /// Unread message count for `user` in a chat: cached messages from other
    /// senders that the user has not read, or that changed after their
    /// last-read cursor.
    pub async fn get_unread_count(&self, chat_id: &str, user: &str) -> usize {
        let state = self.state.lock().await;
        state
            .get_chat(chat_id)
            .map(|chat| chat.unread_count_for(user))
            .unwrap_or(0)
    }
}
