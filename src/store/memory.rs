//! In-memory [`DocumentStore`] backend.
//!
//! Mirrors the hosted store's observable behavior: every mutation re-emits
//! the full ordered snapshot to all watchers of the affected collection, and
//! server timestamps are monotonic per collection so equal-millisecond writes
//! keep their arrival order. Backs the test suite and local development.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::StreamExt;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::Value;
use tokio::sync::mpsc;

use super::{Document, DocumentStore, Fields, Snapshot, SnapshotStream, SERVER_TIMESTAMP};
use crate::error::ChatError;
use crate::util::unix_millis;

/// Store-assigned record id length.
const RECORD_ID_LEN: usize = 20;

struct StoredRecord {
    id: String,
    fields: Fields,
    // Arrival order, used as the tiebreak for equal order-field values
    seq: u64,
}

struct Watcher {
    sender: mpsc::UnboundedSender<Snapshot>,
    order_field: String,
}

#[derive(Default)]
struct Collection {
    records: Vec<StoredRecord>,
    next_seq: u64,
    last_server_ts: u64,
    watchers: Vec<Watcher>,
}

impl Collection {
    fn snapshot(&self, order_field: &str) -> Snapshot {
        let mut ordered: Vec<&StoredRecord> = self.records.iter().collect();
        ordered.sort_by_key(|r| {
            let key = r.fields.get(order_field).and_then(Value::as_u64).unwrap_or(0);
            (key, r.seq)
        });
        ordered
            .into_iter()
            .map(|r| Document {
                id: r.id.clone(),
                fields: r.fields.clone(),
            })
            .collect()
    }

    /// Resolve [`SERVER_TIMESTAMP`] sentinels to one server time for the
    /// whole write, strictly increasing within the collection.
    fn resolve_server_timestamps(&mut self, fields: &mut Fields) {
        let has_sentinel = fields
            .values()
            .any(|v| v.as_str() == Some(SERVER_TIMESTAMP));
        if !has_sentinel {
            return;
        }

        let ts = unix_millis().max(self.last_server_ts + 1);
        self.last_server_ts = ts;

        for value in fields.values_mut() {
            if value.as_str() == Some(SERVER_TIMESTAMP) {
                *value = Value::from(ts);
            }
        }
    }

    fn notify(&mut self) {
        // Drop watchers whose stream side has been released
        self.watchers.retain(|w| !w.sender.is_closed());

        for watcher in &self.watchers {
            let snapshot = self.snapshot(&watcher.order_field);
            let _ = watcher.sender.send(snapshot);
        }
    }
}

/// In-memory document store.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Collection>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live snapshot watchers on a collection.
    pub fn watcher_count(&self, collection_path: &str) -> usize {
        let collections = self.collections.lock().unwrap();
        collections
            .get(collection_path)
            .map(|c| c.watchers.iter().filter(|w| !w.sender.is_closed()).count())
            .unwrap_or(0)
    }

    fn generate_id() -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(RECORD_ID_LEN)
            .map(char::from)
            .collect()
    }
}

/// Split `chats/{id}/messages/{msgId}` into collection and record id.
fn split_record_path(record_path: &str) -> Result<(&str, &str), ChatError> {
    record_path
        .rsplit_once('/')
        .filter(|(collection, id)| !collection.is_empty() && !id.is_empty())
        .ok_or_else(|| ChatError::Store(format!("invalid record path '{record_path}'")))
}

/// Merge one field into a record, navigating dot-delimited nested paths.
fn merge_field(target: &mut Fields, key: &str, value: Value) {
    let mut segments = key.split('.').peekable();
    let mut current = target;

    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            current.insert(segment.to_string(), value);
            return;
        }

        // Descend, replacing any non-object intermediate with a fresh map
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Fields::new()));
        if !entry.is_object() {
            *entry = Value::Object(Fields::new());
        }
        current = entry.as_object_mut().expect("entry was just made an object");
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn subscribe_ordered(
        &self,
        collection_path: &str,
        order_field: &str,
    ) -> Result<SnapshotStream, ChatError> {
        let (sender, receiver) = mpsc::unbounded_channel();

        {
            let mut collections = self.collections.lock().unwrap();
            let collection = collections.entry(collection_path.to_string()).or_default();

            // The current state is always the first delivery
            let _ = sender.send(collection.snapshot(order_field));
            collection.watchers.push(Watcher {
                sender,
                order_field: order_field.to_string(),
            });
        }

        let stream = futures_util::stream::unfold(receiver, |mut rx| async move {
            rx.recv().await.map(|snapshot| (snapshot, rx))
        })
        .boxed();

        Ok(stream)
    }

    async fn write_record(
        &self,
        collection_path: &str,
        mut fields: Fields,
    ) -> Result<String, ChatError> {
        let id = Self::generate_id();

        let mut collections = self.collections.lock().unwrap();
        let collection = collections.entry(collection_path.to_string()).or_default();

        collection.resolve_server_timestamps(&mut fields);
        let seq = collection.next_seq;
        collection.next_seq += 1;
        collection.records.push(StoredRecord {
            id: id.clone(),
            fields,
            seq,
        });
        collection.notify();

        Ok(id)
    }

    async fn set_merge(&self, record_path: &str, mut fields: Fields) -> Result<(), ChatError> {
        let (collection_path, record_id) = split_record_path(record_path)?;

        let mut collections = self.collections.lock().unwrap();
        let collection = collections
            .get_mut(collection_path)
            .ok_or_else(|| ChatError::Store(format!("no such record '{record_path}'")))?;

        collection.resolve_server_timestamps(&mut fields);
        let record = collection
            .records
            .iter_mut()
            .find(|r| r.id == record_id)
            .ok_or_else(|| ChatError::Store(format!("no such record '{record_path}'")))?;

        for (key, value) in fields {
            merge_field(&mut record.fields, &key, value);
        }
        collection.notify();

        Ok(())
    }

    async fn union_add(
        &self,
        record_path: &str,
        field: &str,
        value: &str,
    ) -> Result<(), ChatError> {
        let (collection_path, record_id) = split_record_path(record_path)?;

        let mut collections = self.collections.lock().unwrap();
        let collection = collections
            .get_mut(collection_path)
            .ok_or_else(|| ChatError::Store(format!("no such record '{record_path}'")))?;
        let record = collection
            .records
            .iter_mut()
            .find(|r| r.id == record_id)
            .ok_or_else(|| ChatError::Store(format!("no such record '{record_path}'")))?;

        let entry = record
            .fields
            .entry(field.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if !entry.is_array() {
            *entry = Value::Array(Vec::new());
        }
        let set = entry.as_array_mut().expect("entry was just made an array");
        if !set.iter().any(|v| v.as_str() == Some(value)) {
            set.push(Value::from(value));
            collection.notify();
        }

        Ok(())
    }

    async fn union_remove(
        &self,
        record_path: &str,
        field: &str,
        value: &str,
    ) -> Result<(), ChatError> {
        let (collection_path, record_id) = split_record_path(record_path)?;

        let mut collections = self.collections.lock().unwrap();
        let collection = collections
            .get_mut(collection_path)
            .ok_or_else(|| ChatError::Store(format!("no such record '{record_path}'")))?;
        let record = collection
            .records
            .iter_mut()
            .find(|r| r.id == record_id)
            .ok_or_else(|| ChatError::Store(format!("no such record '{record_path}'")))?;

        if let Some(set) = record.fields.get_mut(field).and_then(Value::as_array_mut) {
            let before = set.len();
            set.retain(|v| v.as_str() != Some(value));
            if set.len() != before {
                collection.notify();
            }
        }

        Ok(())
    }

    async fn delete_record(&self, record_path: &str) -> Result<(), ChatError> {
        let (collection_path, record_id) = split_record_path(record_path)?;

        let mut collections = self.collections.lock().unwrap();
        if let Some(collection) = collections.get_mut(collection_path) {
            let before = collection.records.len();
            collection.records.retain(|r| r.id != record_id);
            if collection.records.len() != before {
                collection.notify();
            }
        }

        Ok(())
    }

    async fn get_record(&self, record_path: &str) -> Result<Option<Fields>, ChatError> {
        let (collection_path, record_id) = split_record_path(record_path)?;

        let collections = self.collections.lock().unwrap();
        Ok(collections
            .get(collection_path)
            .and_then(|c| c.records.iter().find(|r| r.id == record_id))
            .map(|r| r.fields.clone()))
    }

    async fn query_equal(
        &self,
        collection_path: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Document>, ChatError> {
        let collections = self.collections.lock().unwrap();
        Ok(collections
            .get(collection_path)
            .map(|c| {
                c.records
                    .iter()
                    .filter(|r| r.fields.get(field).and_then(Value::as_str) == Some(value))
                    .map(|r| Document {
                        id: r.id.clone(),
                        fields: r.fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}
