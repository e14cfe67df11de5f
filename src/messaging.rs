//! Optimistic message mutations: send, reply, delete, react.
//!
//! Every operation settles its local effect before the remote acknowledgment
//! returns, so callers can render immediately. Remote failures are logged
//! and the optimistic state is left in place — the next authoritative
//! snapshot (or a reload) converges the cache.

use std::collections::HashMap;

use serde_json::json;
use tracing::{debug, warn};

use crate::message::{flipped_reactions, Message};
use crate::messenger::Messenger;
use crate::store::{message_path, messages_path, Fields, SERVER_TIMESTAMP};
use crate::util::{unix_millis, unix_nanos};

impl Messenger {
    /// Send a message.
    ///
    /// Returns a locally-synthesized entity with a client-clock timestamp for
    /// immediate display; the store-assigned record (with the server
    /// timestamp) arrives through the subscription and supersedes it.
    pub async fn send_message(&self, chat_id: &str, sender: &str, text: &str) -> Message {
        self.write_message(chat_id, sender, text, None).await
    }

    /// Reply to an existing message in the same chat.
    pub async fn reply_to_message(
        &self,
        chat_id: &str,
        message_id: &str,
        reply_text: &str,
        sender: &str,
    ) -> Message {
        self.write_message(chat_id, sender, reply_text, Some(message_id))
            .await
    }

    async fn write_message(
        &self,
        chat_id: &str,
        sender: &str,
        text: &str,
        reply_to: Option<&str>,
    ) -> Message {
        // Synthesize the optimistic entity up front; the id is provisional
        // until the store acknowledges the write
        let now = unix_millis();
        let mut message = Message {
            id: format!("pending-{}", unix_nanos()),
            sender: sender.to_string(),
            text: text.to_string(),
            timestamp: now,
            updated_at: now,
            reply_to: reply_to.map(str::to_string),
            reactions: HashMap::new(),
            read_by: Vec::new(),
            delivered_to: Vec::new(),
        };

        let mut fields = Fields::new();
        fields.insert("sender".to_string(), json!(sender));
        fields.insert("text".to_string(), json!(self.codec.encrypt(text)));
        fields.insert("timestamp".to_string(), json!(SERVER_TIMESTAMP));
        if let Some(parent) = reply_to {
            fields.insert("replyTo".to_string(), json!(parent));
        }

        match self.store.write_record(&messages_path(chat_id), fields).await {
            Ok(record_id) => {
                debug!(chat_id = %chat_id, message_id = %record_id, "message written");
                message.id = record_id;
            }
            Err(e) => {
                // No rollback: the caller keeps the synthesized entity
                warn!(chat_id = %chat_id, error = %e, "failed to write message");
            }
        }

        message
    }

    /// Delete a message and every reply pointing at it.
    ///
    /// The cache drops the whole thread before any remote call, so the UI
    /// never shows a half-deleted state. The remote cascade is not
    /// transactional: a failure midway is logged and left to converge.
    pub async fn delete_message(&self, chat_id: &str, message_id: &str) {
        {
            let mut state = self.state.lock().await;
            if let Some(chat) = state.get_chat_mut(chat_id) {
                let removed = chat.remove_message_cascade(message_id);
                debug!(
                    chat_id = %chat_id,
                    message_id = %message_id,
                    removed,
                    "optimistically removed message thread"
                );
            }
        }

        let collection = messages_path(chat_id);
        let replies = match self.store.query_equal(&collection, "replyTo", message_id).await {
            Ok(replies) => replies,
            Err(e) => {
                warn!(chat_id = %chat_id, message_id = %message_id, error = %e, "reply lookup failed, delete aborted");
                return;
            }
        };

        for reply in &replies {
            if let Err(e) = self.store.delete_record(&message_path(chat_id, &reply.id)).await {
                warn!(chat_id = %chat_id, message_id = %reply.id, error = %e, "failed to delete reply");
            }
        }

        if let Err(e) = self.store.delete_record(&message_path(chat_id, message_id)).await {
            warn!(chat_id = %chat_id, message_id = %message_id, error = %e, "failed to delete message");
        }
    }

    /// Toggle `user`'s reaction `emoji` on a message.
    ///
    /// The flip is computed against the authoritative record (not the
    /// cache), mirrored locally with a bumped update cursor, then written
    /// back as the full reactions map plus a refreshed `updatedAt`.
    pub async fn toggle_reaction(&self, chat_id: &str, message_id: &str, emoji: &str, user: &str) {
        let path = message_path(chat_id, message_id);

        let fields = match self.store.get_record(&path).await {
            Ok(Some(fields)) => fields,
            Ok(None) => {
                debug!(chat_id = %chat_id, message_id = %message_id, "message gone, reaction ignored");
                return;
            }
            Err(e) => {
                warn!(chat_id = %chat_id, message_id = %message_id, error = %e, "could not read reactions");
                return;
            }
        };

        let current: HashMap<String, Vec<String>> = fields
            .get("reactions")
            .cloned()
            .map(|value| serde_json::from_value(value).unwrap_or_default())
            .unwrap_or_default();
        let (updated, had_reacted) = flipped_reactions(&current, emoji, user);

        // Mirror the flip in the cache so the UI updates without waiting for
        // the snapshot round-trip
        let now = unix_millis();
        {
            let mut state = self.state.lock().await;
            if let Some(message) = state
                .get_chat_mut(chat_id)
                .and_then(|chat| chat.get_message_mut(message_id))
            {
                message.reactions = updated.clone();
                message.updated_at = message.updated_at.max(now);
            }
        }

        let mut patch = Fields::new();
        patch.insert("reactions".to_string(), json!(updated));
        patch.insert("updatedAt".to_string(), json!(SERVER_TIMESTAMP));
        if let Err(e) = self.store.set_merge(&path, patch).await {
            warn!(chat_id = %chat_id, message_id = %message_id, error = %e, "failed to persist reaction toggle");
        } else {
            debug!(
                chat_id = %chat_id,
                message_id = %message_id,
                added = !had_reacted,
                "reaction toggled"
            );
        }
    }
}
