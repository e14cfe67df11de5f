//! Snapshot-vs-cache reconciliation.
//!
//! The store re-emits the full ordered message set on every change, so most
//! snapshots arrive while the cache already reflects them — or while the
//! cache holds optimistic local mutations the stream has not caught up with
//! yet. Replacing the cache on every delivery would visibly thrash that
//! optimistic state; replacing only on material difference keeps the UI
//! stable while still guaranteeing convergence to the authoritative order.

use crate::message::Message;

/// Structural equality between the cached list and an incoming snapshot.
///
/// Two lists match when they have the same length and every position agrees
/// on id, text, reactions, read/delivered sets, and update cursor.
pub fn snapshot_matches_cache(cache: &[Message], snapshot: &[Message]) -> bool {
    cache.len() == snapshot.len()
        && cache.iter().zip(snapshot).all(|(cached, incoming)| {
            cached.id == incoming.id
                && cached.text == incoming.text
                && cached.reactions == incoming.reactions
                && cached.read_by == incoming.read_by
                && cached.delivered_to == incoming.delivered_to
                && cached.updated_at == incoming.updated_at
        })
}

/// Apply an incoming snapshot: discard it when it matches the cache, replace
/// the cache wholesale otherwise. Returns whether the cache changed.
pub fn reconcile(cache: &mut Vec<Message>, snapshot: Vec<Message>) -> bool {
    if snapshot_matches_cache(cache, &snapshot) {
        return false;
    }
    *cache = snapshot;
    true
}
