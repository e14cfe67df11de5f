use thiserror::Error;

/// Errors surfaced by the messaging engine.
///
/// None of these are fatal to the process: mutation paths log and degrade to
/// best-effort local state, and only direct lookups propagate errors to the
/// caller.
#[derive(Debug, Error)]
pub enum ChatError {
    /// A remote store operation failed (network, permission, missing record).
    #[error("store operation failed: {0}")]
    Store(String),

    /// A record was missing fields required to build an entity.
    #[error("malformed record '{0}'")]
    MalformedRecord(String),

    /// Ciphertext could not be decrypted (wrong key or corrupted data).
    #[error("failed to decrypt message content")]
    Crypto,

    /// Invalid or missing runtime configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A participant address failed validation.
    #[error("invalid participant address '{0}'")]
    InvalidParticipant(String),
}
