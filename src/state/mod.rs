//! Process-local cache of chats and their messages.
//!
//! `ChatState` is owned by the engine that created it (behind a
//! `tokio::sync::Mutex`), never a process-wide global, so independent engine
//! instances can coexist in one process.

mod chat_state;

pub use chat_state::ChatState;
