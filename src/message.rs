//! Message entity and wire (de)normalization.
//!
//! This module contains:
//! - The `Message` struct shared by the cache and UI consumers
//! - Record normalization: ciphertext decryption, field defaulting
//! - Reaction flip/prune helpers used by the optimistic mutation path

use std::collections::HashMap;

use serde_json::Value;
use tracing::warn;

use crate::crypto::MessageCodec;
use crate::error::ChatError;
use crate::store::{Document, Fields};
use crate::util::unix_millis;

/// A single chat message.
///
/// `text` holds plaintext — decryption happens once at the snapshot boundary,
/// the rest of the engine never sees ciphertext.
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender: String,
    pub text: String,
    /// Store-assigned creation time (unix ms), monotonic within a chat
    pub timestamp: u64,
    /// Bumped on any mutation of the message; never below `timestamp`
    pub updated_at: u64,
    /// Id of the parent message when this is a reply
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    /// Emoji -> identifiers of users who reacted with it
    #[serde(default)]
    pub reactions: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub read_by: Vec<String>,
    #[serde(default)]
    pub delivered_to: Vec<String>,
}

impl Message {
    /// Whether this message replies to another one.
    pub fn is_reply(&self) -> bool {
        self.reply_to.is_some()
    }

    /// Build a `Message` from a raw store record.
    ///
    /// Missing optional fields get their defaults (`reactions {}`, `readBy
    /// []`, `deliveredTo []`, `updatedAt` falls back to `timestamp`). A body
    /// that fails to decrypt degrades to empty text rather than dropping the
    /// record; only a record without a sender is rejected.
    pub fn from_record(id: &str, fields: &Fields, codec: &MessageCodec) -> Result<Self, ChatError> {
        let sender = fields
            .get("sender")
            .and_then(Value::as_str)
            .ok_or_else(|| ChatError::MalformedRecord(id.to_string()))?
            .to_string();

        let timestamp = fields
            .get("timestamp")
            .and_then(Value::as_u64)
            .unwrap_or_else(unix_millis);
        let updated_at = fields
            .get("updatedAt")
            .and_then(Value::as_u64)
            .unwrap_or(timestamp);

        let text = match fields.get("text").and_then(Value::as_str) {
            Some(ciphertext) => codec.decrypt(ciphertext).unwrap_or_else(|_| {
                warn!(message_id = %id, "message body failed to decrypt");
                String::new()
            }),
            None => String::new(),
        };

        let reply_to = fields
            .get("replyTo")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let reactions = fields
            .get("reactions")
            .and_then(Value::as_object)
            .map(parse_reactions)
            .unwrap_or_default();

        Ok(Self {
            id: id.to_string(),
            sender,
            text,
            timestamp,
            updated_at: updated_at.max(timestamp),
            reply_to,
            reactions,
            read_by: parse_string_set(fields.get("readBy")),
            delivered_to: parse_string_set(fields.get("deliveredTo")),
        })
    }
}

/// Normalize a full snapshot into cache-ready messages, skipping records
/// that cannot be represented.
pub fn normalize_snapshot(chat_id: &str, snapshot: &[Document], codec: &MessageCodec) -> Vec<Message> {
    snapshot
        .iter()
        .filter_map(|doc| match Message::from_record(&doc.id, &doc.fields, codec) {
            Ok(message) => Some(message),
            Err(e) => {
                warn!(chat_id = %chat_id, error = %e, "skipping malformed message record");
                None
            }
        })
        .collect()
}

/// Parse a `reactions` map field, dropping malformed entries.
fn parse_reactions(raw: &Fields) -> HashMap<String, Vec<String>> {
    raw.iter()
        .filter_map(|(emoji, users)| {
            let users = users.as_array()?;
            let users: Vec<String> = users
                .iter()
                .filter_map(|u| u.as_str().map(str::to_string))
                .collect();
            // An emoji key with no users must not survive
            if users.is_empty() {
                None
            } else {
                Some((emoji.clone(), users))
            }
        })
        .collect()
}

fn parse_string_set(raw: Option<&Value>) -> Vec<String> {
    raw.and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Flip `user`'s membership in `reactions[emoji]` and prune empty entries.
///
/// Returns the updated map and whether the user had already reacted (i.e.
/// the flip was a removal). Pure so the same computation serves both the
/// remote write-back and the optimistic cache mirror.
pub fn flipped_reactions(
    reactions: &HashMap<String, Vec<String>>,
    emoji: &str,
    user: &str,
) -> (HashMap<String, Vec<String>>, bool) {
    let mut updated = reactions.clone();
    let current = updated.entry(emoji.to_string()).or_default();
    let had_reacted = current.iter().any(|u| u == user);

    if had_reacted {
        current.retain(|u| u != user);
    } else {
        current.push(user.to_string());
    }

    // Remove emoji entries whose user set became empty
    updated.retain(|_, users| !users.is_empty());

    (updated, had_reacted)
}
