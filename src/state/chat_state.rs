use crate::chat::Chat;

/// Cache of all chats known to one engine instance.
///
/// This is the single source of truth UI consumers read from: the latest
/// reconciled snapshot per chat, plus any optimistic local mutations that
/// have not been confirmed yet.
#[derive(serde::Serialize, Clone, Debug, Default)]
pub struct ChatState {
    pub(crate) chats: Vec<Chat>,
}

impl ChatState {
    /// Create a new empty ChatState
    pub fn new() -> Self {
        Self { chats: Vec::new() }
    }

    /// Get a chat by ID
    pub fn get_chat(&self, id: &str) -> Option<&Chat> {
        self.chats.iter().find(|c| c.id == id)
    }

    /// Get a mutable chat by ID
    pub fn get_chat_mut(&mut self, id: &str) -> Option<&mut Chat> {
        self.chats.iter_mut().find(|c| c.id == id)
    }

    /// Get a chat by ID, creating an empty entry if it is unknown
    pub fn ensure_chat(&mut self, id: &str) -> &mut Chat {
        if let Some(position) = self.chats.iter().position(|c| c.id == id) {
            return &mut self.chats[position];
        }
        self.chats.push(Chat::new(id.to_string(), Vec::new()));
        self.chats.last_mut().expect("chat was just pushed")
    }

    /// Evict a chat and its cached messages
    pub fn remove_chat(&mut self, id: &str) {
        self.chats.retain(|c| c.id != id);
    }

    /// All cached chats, newest activity first
    pub fn chats(&self) -> &[Chat] {
        &self.chats
    }

    /// Sort chat positions by last message time, newest first
    pub fn sort_by_recency(&mut self) {
        self.chats.sort_by(|a, b| {
            let a_time = a.last_message_time();
            let b_time = b.last_message_time();
            b_time.cmp(&a_time)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use std::collections::HashMap;

    fn msg(id: &str, timestamp: u64) -> Message {
        Message {
            id: id.to_string(),
            sender: "alice@example.com".to_string(),
            text: String::new(),
            timestamp,
            updated_at: timestamp,
            reply_to: None,
            reactions: HashMap::new(),
            read_by: Vec::new(),
            delivered_to: Vec::new(),
        }
    }

    #[test]
    fn test_ensure_chat_is_idempotent() {
        let mut state = ChatState::new();
        state.ensure_chat("c1").messages.push(msg("a", 1));
        state.ensure_chat("c1");

        assert_eq!(state.chats.len(), 1);
        assert_eq!(state.get_chat("c1").unwrap().messages.len(), 1);
    }

    #[test]
    fn test_remove_chat_evicts_messages() {
        let mut state = ChatState::new();
        state.ensure_chat("c1").messages.push(msg("a", 1));
        state.remove_chat("c1");

        assert!(state.get_chat("c1").is_none());
    }

    #[test]
    fn test_sort_by_recency_puts_newest_first() {
        let mut state = ChatState::new();
        state.ensure_chat("old").messages.push(msg("a", 10));
        state.ensure_chat("new").messages.push(msg("b", 20));
        state.ensure_chat("empty");

        state.sort_by_recency();
        let order: Vec<&str> = state.chats.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(order, vec!["new", "old", "empty"]);
    }
}
