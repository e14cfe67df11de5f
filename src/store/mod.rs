//! Remote document store interface.
//!
//! The engine talks to a hosted realtime document store through this trait:
//! ordered snapshot subscriptions, merge-writes, atomic set-union field
//! updates, and record deletion. Paths are slash-delimited
//! (`chats/{chatId}/messages/{messageId}`); nested field paths inside a
//! record are dot-delimited, which is why identifiers used as map keys go
//! through [`crate::keypath`] first.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde_json::Value;

use crate::error::ChatError;

/// Field map of a single record, as stored.
pub type Fields = serde_json::Map<String, Value>;

/// A record delivered in a snapshot: store-assigned id plus its fields.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

/// One full ordered view of a queried record set.
///
/// The store emits the entire set on every change, not a diff.
pub type Snapshot = Vec<Document>;

/// Live stream of snapshots for a subscription.
pub type SnapshotStream = BoxStream<'static, Snapshot>;

/// Sentinel value resolved to a server-assigned timestamp at write time.
pub const SERVER_TIMESTAMP: &str = "__SERVER_TIMESTAMP__";

/// Operations the engine consumes from the hosted store.
///
/// Implementations are injected as an `Arc<dyn DocumentStore>`; the engine
/// never assumes a concrete backend.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Open a realtime stream over `collection_path`, ordered ascending by
    /// `order_field` (ties broken by arrival order). The current state is
    /// delivered as the first snapshot.
    async fn subscribe_ordered(
        &self,
        collection_path: &str,
        order_field: &str,
    ) -> Result<SnapshotStream, ChatError>;

    /// Create a record with a store-assigned id. Any field set to
    /// [`SERVER_TIMESTAMP`] is resolved to the server clock.
    async fn write_record(
        &self,
        collection_path: &str,
        fields: Fields,
    ) -> Result<String, ChatError>;

    /// Merge-write a subset of fields without clobbering the rest.
    /// Dot-delimited keys address into nested maps.
    async fn set_merge(&self, record_path: &str, fields: Fields) -> Result<(), ChatError>;

    /// Atomically add `value` to the string-set field `field`.
    async fn union_add(
        &self,
        record_path: &str,
        field: &str,
        value: &str,
    ) -> Result<(), ChatError>;

    /// Atomically remove `value` from the string-set field `field`.
    async fn union_remove(
        &self,
        record_path: &str,
        field: &str,
        value: &str,
    ) -> Result<(), ChatError>;

    /// Delete a record. Deleting a missing record is not an error.
    async fn delete_record(&self, record_path: &str) -> Result<(), ChatError>;

    /// Fetch a single record, or `None` if it does not exist.
    async fn get_record(&self, record_path: &str) -> Result<Option<Fields>, ChatError>;

    /// Fetch all records in a collection whose `field` equals `value`.
    async fn query_equal(
        &self,
        collection_path: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Document>, ChatError>;
}

/// Collection path of a chat's messages.
pub fn messages_path(chat_id: &str) -> String {
    format!("chats/{chat_id}/messages")
}

/// Record path of a single message.
pub fn message_path(chat_id: &str, message_id: &str) -> String {
    format!("chats/{chat_id}/messages/{message_id}")
}

/// Record path of a chat document.
pub fn chat_path(chat_id: &str) -> String {
    format!("chats/{chat_id}")
}

/// Top-level chats collection.
pub const CHATS_COLLECTION: &str = "chats";
