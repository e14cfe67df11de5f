//! The engine facade UI consumers talk to.
//!
//! A `Messenger` owns its store handle, codec, cache, and subscription
//! registry — construct one per account/view tree and share clones of it.
//! Nothing in here is process-global, so independent instances (tests,
//! multi-account) do not interfere with each other.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::Config;
use crate::crypto::MessageCodec;
use crate::error::ChatError;
use crate::message::{normalize_snapshot, Message};
use crate::reconcile::reconcile;
use crate::state::ChatState;
use crate::store::{messages_path, DocumentStore, SnapshotStream};
use crate::subscription::SubscriptionRegistry;

/// Message synchronization and receipt-tracking engine.
///
/// Cheap to clone; all clones share the same cache and subscriptions.
#[derive(Clone)]
pub struct Messenger {
    pub(crate) store: Arc<dyn DocumentStore>,
    pub(crate) codec: Arc<MessageCodec>,
    pub(crate) state: Arc<Mutex<ChatState>>,
    pub(crate) subscriptions: Arc<Mutex<SubscriptionRegistry>>,
}

impl Messenger {
    /// Build an engine over a store backend.
    pub fn new(store: Arc<dyn DocumentStore>, config: &Config) -> Result<Self, ChatError> {
        Ok(Self {
            store,
            codec: Arc::new(MessageCodec::new(&config.crypto_key)?),
            state: Arc::new(Mutex::new(ChatState::new())),
            subscriptions: Arc::new(Mutex::new(SubscriptionRegistry::new())),
        })
    }

    /// Open the realtime message stream for a chat.
    ///
    /// Idempotent: a second call while the stream is live is a no-op, so
    /// exactly one stream handle exists per chat id. The chat record is
    /// loaded once to seed participants and read cursors.
    pub async fn subscribe_to_chat_messages(&self, chat_id: &str) -> Result<(), ChatError> {
        let mut subscriptions = self.subscriptions.lock().await;
        if subscriptions.is_active(chat_id) {
            return Ok(());
        }

        let stream = self
            .store
            .subscribe_ordered(&messages_path(chat_id), "timestamp")
            .await?;

        // Seed participants and persisted cursors; a missing record just
        // means the chat document hasn't been created yet
        if let Err(e) = self.load_chat(chat_id).await {
            warn!(chat_id = %chat_id, error = %e, "could not load chat record");
        }

        let handle = tokio::spawn(run_subscription(
            chat_id.to_string(),
            stream,
            self.codec.clone(),
            self.state.clone(),
        ));
        subscriptions.insert(chat_id, handle);
        debug!(chat_id = %chat_id, "subscribed to chat messages");

        Ok(())
    }

    /// Close the message stream for a chat and evict its cache entry.
    pub async fn unsubscribe_from_chat_messages(&self, chat_id: &str) {
        let handle = self.subscriptions.lock().await.remove(chat_id);
        let Some(handle) = handle else {
            return;
        };
        handle.abort();

        self.state.lock().await.remove_chat(chat_id);
        debug!(chat_id = %chat_id, "unsubscribed from chat messages");
    }

    /// Cached messages of a chat, ordered ascending by timestamp.
    /// `None` when the chat is not in the cache (never subscribed).
    pub async fn get_messages(&self, chat_id: &str) -> Option<Vec<Message>> {
        let state = self.state.lock().await;
        state.get_chat(chat_id).map(|chat| chat.messages.clone())
    }

    /// The newest cached message of a chat.
    pub async fn get_last_message(&self, chat_id: &str) -> Option<Message> {
        let state = self.state.lock().await;
        state
            .get_chat(chat_id)
            .and_then(|chat| chat.last_message().cloned())
    }

    /// Number of live message streams.
    pub async fn active_subscription_count(&self) -> usize {
        self.subscriptions.lock().await.len()
    }

    /// Tear down every live stream and clear the cache. Call when the
    /// consuming view tree goes away.
    pub async fn shutdown(&self) {
        self.subscriptions.lock().await.shutdown_all();
        *self.state.lock().await = ChatState::new();
    }
}

/// Long-lived per-chat task: normalize each incoming snapshot and merge it
/// into the cache.
async fn run_subscription(
    chat_id: String,
    mut stream: SnapshotStream,
    codec: Arc<MessageCodec>,
    state: Arc<Mutex<ChatState>>,
) {
    while let Some(snapshot) = stream.next().await {
        let incoming = normalize_snapshot(&chat_id, &snapshot, &codec);

        let mut state = state.lock().await;
        let chat = state.ensure_chat(&chat_id);
        if reconcile(&mut chat.messages, incoming) {
            debug!(chat_id = %chat_id, "applied authoritative snapshot");
            state.sort_by_recency();
        } else {
            debug!(chat_id = %chat_id, "snapshot matches cache, discarded");
        }
    }

    // Stream terminated on the store side. No automatic resubscription:
    // callers decide whether to subscribe again.
    warn!(chat_id = %chat_id, "message stream closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{messages_path, MemoryStore};
    use std::time::Duration;

    const ALICE: &str = "alice@example.com";
    const BOB: &str = "bob@example.com";
    const CAROL: &str = "carol@example.com";

    async fn engine() -> (Arc<MemoryStore>, Messenger) {
        let store = Arc::new(MemoryStore::new());
        let messenger =
            Messenger::new(store.clone(), &Config::new("test-secret")).expect("engine builds");
        (store, messenger)
    }

    async fn wait_for_message_count(messenger: &Messenger, chat_id: &str, count: usize) {
        for _ in 0..400 {
            let current = messenger
                .get_messages(chat_id)
                .await
                .map(|m| m.len())
                .unwrap_or(usize::MAX);
            if current == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {count} cached messages in {chat_id}");
    }

    async fn wait_for_cached_reaction(
        messenger: &Messenger,
        chat_id: &str,
        message_id: &str,
        emoji: &str,
        users: &[&str],
    ) {
        let expected: Vec<String> = users.iter().map(|u| u.to_string()).collect();
        for _ in 0..400 {
            let reacted = messenger.get_messages(chat_id).await.and_then(|messages| {
                messages
                    .iter()
                    .find(|m| m.id == message_id)
                    .map(|m| m.reactions.get(emoji).cloned().unwrap_or_default())
            });
            if reacted.as_ref() == Some(&expected) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for reaction {emoji} on {message_id}");
    }

    #[tokio::test]
    async fn test_subscribe_is_idempotent() {
        let (store, messenger) = engine().await;
        let chat_id = messenger.create_chat(ALICE, BOB).await.unwrap();

        messenger.subscribe_to_chat_messages(&chat_id).await.unwrap();
        messenger.subscribe_to_chat_messages(&chat_id).await.unwrap();

        assert_eq!(store.watcher_count(&messages_path(&chat_id)), 1);
        assert_eq!(messenger.active_subscription_count().await, 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_releases_stream_and_cache() {
        let (store, messenger) = engine().await;
        let chat_id = messenger.create_chat(ALICE, BOB).await.unwrap();

        messenger.subscribe_to_chat_messages(&chat_id).await.unwrap();
        wait_for_message_count(&messenger, &chat_id, 0).await;

        messenger.unsubscribe_from_chat_messages(&chat_id).await;
        assert!(messenger.get_messages(&chat_id).await.is_none());

        // The aborted task drops its stream; the store must see the watcher go
        for _ in 0..400 {
            if store.watcher_count(&messages_path(&chat_id)) == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(store.watcher_count(&messages_path(&chat_id)), 0);

        // Unsubscribing again is a no-op
        messenger.unsubscribe_from_chat_messages(&chat_id).await;
    }

    #[tokio::test]
    async fn test_sent_messages_arrive_through_subscription() {
        let (_store, messenger) = engine().await;
        let chat_id = messenger.create_chat(ALICE, BOB).await.unwrap();
        messenger.subscribe_to_chat_messages(&chat_id).await.unwrap();

        let sent = messenger.send_message(&chat_id, ALICE, "hi").await;
        assert_eq!(sent.text, "hi");
        assert_eq!(sent.sender, ALICE);

        wait_for_message_count(&messenger, &chat_id, 1).await;
        let last = messenger.get_last_message(&chat_id).await.unwrap();
        assert_eq!(last.text, "hi");
        assert_eq!(last.id, sent.id);
        // The authoritative copy carries the server timestamp
        assert!(last.timestamp > 0);
    }

    #[tokio::test]
    async fn test_bodies_are_ciphertext_at_rest() {
        let (store, messenger) = engine().await;
        let chat_id = messenger.create_chat(ALICE, BOB).await.unwrap();

        let sent = messenger.send_message(&chat_id, ALICE, "very secret").await;
        let record = store
            .get_record(&crate::store::message_path(&chat_id, &sent.id))
            .await
            .unwrap()
            .unwrap();
        let stored_text = record["text"].as_str().unwrap();
        assert_ne!(stored_text, "very secret");
        assert!(crate::crypto::looks_encrypted(stored_text));
    }

    #[tokio::test]
    async fn test_cascade_delete_removes_parent_and_replies() {
        let (_store, messenger) = engine().await;
        let chat_id = messenger.create_chat(ALICE, BOB).await.unwrap();
        messenger.subscribe_to_chat_messages(&chat_id).await.unwrap();

        let parent = messenger.send_message(&chat_id, ALICE, "root").await;
        let _b = messenger.reply_to_message(&chat_id, &parent.id, "re 1", BOB).await;
        let _c = messenger.reply_to_message(&chat_id, &parent.id, "re 2", BOB).await;
        let keeper = messenger.send_message(&chat_id, BOB, "unrelated").await;
        wait_for_message_count(&messenger, &chat_id, 4).await;

        messenger.delete_message(&chat_id, &parent.id).await;

        // The optimistic removal already emptied the cache of the thread
        wait_for_message_count(&messenger, &chat_id, 1).await;
        let remaining = messenger.get_messages(&chat_id).await.unwrap();
        assert_eq!(remaining[0].id, keeper.id);

        // And the store converges to the same set
        tokio::time::sleep(Duration::from_millis(50)).await;
        let remaining = messenger.get_messages(&chat_id).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, keeper.id);
    }

    #[tokio::test]
    async fn test_reaction_toggle_symmetry() {
        let (_store, messenger) = engine().await;
        let chat_id = messenger.create_chat(ALICE, BOB).await.unwrap();
        messenger.subscribe_to_chat_messages(&chat_id).await.unwrap();

        let msg = messenger.send_message(&chat_id, ALICE, "react to me").await;
        wait_for_message_count(&messenger, &chat_id, 1).await;

        messenger.toggle_reaction(&chat_id, &msg.id, "👍", BOB).await;
        wait_for_cached_reaction(&messenger, &chat_id, &msg.id, "👍", &[BOB]).await;

        messenger.toggle_reaction(&chat_id, &msg.id, "👍", BOB).await;
        for _ in 0..400 {
            let gone = messenger
                .get_messages(&chat_id)
                .await
                .and_then(|m| m.iter().find(|m| m.id == msg.id).map(|m| m.reactions.is_empty()))
                .unwrap_or(false);
            if gone {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        // Toggling twice restores the original state; no empty emoji key persists
        let cached = messenger.get_messages(&chat_id).await.unwrap();
        assert!(cached.iter().find(|m| m.id == msg.id).unwrap().reactions.is_empty());
    }

    #[tokio::test]
    async fn test_unread_count_decreases_after_mark_read() {
        let (_store, messenger) = engine().await;
        let chat_id = messenger.create_chat(ALICE, BOB).await.unwrap();
        messenger.subscribe_to_chat_messages(&chat_id).await.unwrap();

        messenger.send_message(&chat_id, ALICE, "one").await;
        messenger.send_message(&chat_id, ALICE, "two").await;
        wait_for_message_count(&messenger, &chat_id, 2).await;

        assert_eq!(messenger.get_unread_count(&chat_id, BOB).await, 2);
        // Alice never counts her own messages
        assert_eq!(messenger.get_unread_count(&chat_id, ALICE).await, 0);

        let newest = messenger.get_last_message(&chat_id).await.unwrap();
        messenger.mark_message_as_read(&chat_id, BOB, &newest.id).await;

        let after = messenger.get_unread_count(&chat_id, BOB).await;
        assert_eq!(after, 1);
    }

    #[tokio::test]
    async fn test_delivery_marks_skip_sender_and_duplicates() {
        let (store, messenger) = engine().await;
        let chat_id = messenger.create_chat(ALICE, BOB).await.unwrap();
        messenger.subscribe_to_chat_messages(&chat_id).await.unwrap();

        let msg = messenger.send_message(&chat_id, ALICE, "deliver me").await;
        wait_for_message_count(&messenger, &chat_id, 1).await;

        messenger.mark_message_as_delivered(&chat_id, ALICE, &msg.id).await;
        messenger.mark_message_as_delivered(&chat_id, BOB, &msg.id).await;
        messenger.mark_message_as_delivered(&chat_id, BOB, &msg.id).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        let record = store
            .get_record(&crate::store::message_path(&chat_id, &msg.id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record["deliveredTo"], serde_json::json!([BOB]));
    }

    #[tokio::test]
    async fn test_reaction_resurfaces_read_message() {
        let (_store, messenger) = engine().await;
        let chat_id = messenger.create_chat(ALICE, BOB).await.unwrap();
        messenger.subscribe_to_chat_messages(&chat_id).await.unwrap();

        let msg = messenger.send_message(&chat_id, ALICE, "old news").await;
        wait_for_message_count(&messenger, &chat_id, 1).await;

        messenger.mark_message_as_read(&chat_id, BOB, &msg.id).await;
        assert_eq!(messenger.get_unread_count(&chat_id, BOB).await, 0);

        // Carol reacting bumps updatedAt past bob's cursor: the message is
        // unread for bob again even though he stays in readBy
        messenger.toggle_reaction(&chat_id, &msg.id, "🎉", CAROL).await;
        wait_for_cached_reaction(&messenger, &chat_id, &msg.id, "🎉", &[CAROL]).await;

        for _ in 0..400 {
            if messenger.get_unread_count(&chat_id, BOB).await == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(messenger.get_unread_count(&chat_id, BOB).await, 1);
        let cached = messenger.get_messages(&chat_id).await.unwrap();
        assert!(cached[0].read_by.contains(&BOB.to_string()));
    }

    #[tokio::test]
    async fn test_end_to_end_conversation() {
        let (_store, messenger) = engine().await;
        let chat_id = messenger.create_chat(ALICE, BOB).await.unwrap();
        messenger.subscribe_to_chat_messages(&chat_id).await.unwrap();

        // alice opens the conversation
        let msg1 = messenger.send_message(&chat_id, ALICE, "hi").await;
        wait_for_message_count(&messenger, &chat_id, 1).await;
        assert_eq!(messenger.get_last_message(&chat_id).await.unwrap().text, "hi");

        // bob replies in-thread
        let msg2 = messenger.reply_to_message(&chat_id, &msg1.id, "hello", BOB).await;
        wait_for_message_count(&messenger, &chat_id, 2).await;

        let cached = messenger.get_messages(&chat_id).await.unwrap();
        let threads = crate::grouping::resolve_thread(&cached);
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].root.id, msg1.id);
        assert_eq!(threads[0].replies.len(), 1);
        assert_eq!(threads[0].replies[0].id, msg2.id);

        let groups = crate::grouping::group_by_date(&cached, chrono::Locale::en_US);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].label, "Today");
        assert_eq!(groups[0].messages.len(), 2);

        // bob reacts to the first message
        messenger.toggle_reaction(&chat_id, &msg1.id, "👍", BOB).await;
        wait_for_cached_reaction(&messenger, &chat_id, &msg1.id, "👍", &[BOB]).await;
        let cached = messenger.get_messages(&chat_id).await.unwrap();
        assert_eq!(cached[0].reactions["👍"], vec![BOB.to_string()]);

        // bob reads it, then carol's reaction resurfaces it
        messenger.mark_message_as_read(&chat_id, BOB, &msg1.id).await;
        assert_eq!(messenger.get_unread_count(&chat_id, BOB).await, 0);

        messenger.toggle_reaction(&chat_id, &msg1.id, "👍", CAROL).await;
        for _ in 0..400 {
            if messenger.get_unread_count(&chat_id, BOB).await == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(messenger.get_unread_count(&chat_id, BOB).await, 1);
    }
}
