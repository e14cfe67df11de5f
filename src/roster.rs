//! Chat directory operations: creating chats and loading their records.

use std::collections::HashMap;

use serde_json::{json, Value};
use tracing::debug;

use crate::chat::Chat;
use crate::error::ChatError;
use crate::messenger::Messenger;
use crate::store::{chat_path, Fields, CHATS_COLLECTION, SERVER_TIMESTAMP};
use crate::util::validate_email;

impl Messenger {
    /// Create a two-party chat between `creator` and `partner`.
    ///
    /// Returns the store-assigned chat id; the local cache entry is seeded
    /// with the participant set immediately.
    pub async fn create_chat(&self, creator: &str, partner: &str) -> Result<String, ChatError> {
        for address in [creator, partner] {
            if !validate_email(address) {
                return Err(ChatError::InvalidParticipant(address.to_string()));
            }
        }

        let mut fields = Fields::new();
        fields.insert("users".to_string(), json!([creator, partner]));
        fields.insert("createdAt".to_string(), json!(SERVER_TIMESTAMP));
        let chat_id = self.store.write_record(CHATS_COLLECTION, fields).await?;

        let mut state = self.state.lock().await;
        let chat = state.ensure_chat(&chat_id);
        chat.participants = vec![creator.to_string(), partner.to_string()];
        debug!(chat_id = %chat_id, "created chat");

        Ok(chat_id)
    }

    /// Load a chat record from the store into the cache: participants,
    /// creation time, and the persisted per-user read cursors.
    ///
    /// Cached messages and locally-advanced cursors are kept — loading never
    /// regresses a cursor.
    pub async fn load_chat(&self, chat_id: &str) -> Result<Option<Chat>, ChatError> {
        let Some(fields) = self.store.get_record(&chat_path(chat_id)).await? else {
            return Ok(None);
        };

        let participants: Vec<String> = fields
            .get("users")
            .and_then(Value::as_array)
            .map(|users| {
                users
                    .iter()
                    .filter_map(|u| u.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        let created_at = fields.get("createdAt").and_then(Value::as_u64);
        let cursors: HashMap<String, u64> = fields
            .get("lastReadBy")
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .filter_map(|(key, ts)| ts.as_u64().map(|ts| (key.clone(), ts)))
                    .collect()
            })
            .unwrap_or_default();

        let mut state = self.state.lock().await;
        let chat = state.ensure_chat(chat_id);
        chat.participants = participants;
        if let Some(created_at) = created_at {
            chat.created_at = created_at;
        }
        for (key, ts) in cursors {
            let entry = chat.last_read_by.entry(key).or_insert(0);
            *entry = (*entry).max(ts);
        }

        Ok(Some(chat.clone()))
    }

    /// Whether a chat with `partner` already exists in the cached list.
    pub async fn chat_exists(&self, my_email: &str, partner: &str) -> bool {
        let state = self.state.lock().await;
        state
            .chats()
            .iter()
            .any(|chat| chat.get_other_participant(my_email).as_deref() == Some(partner))
    }

    /// Resolve the other participant of a cached two-party chat.
    pub async fn chat_partner(&self, chat_id: &str, my_email: &str) -> Option<String> {
        let state = self.state.lock().await;
        state
            .get_chat(chat_id)
            .and_then(|chat| chat.get_other_participant(my_email))
    }
}
