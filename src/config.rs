//! Runtime configuration for the messaging engine.

use crate::error::ChatError;

/// Environment variable holding the shared message encryption secret.
pub const CRYPTO_KEY_ENV: &str = "COURIER_CRYPTO_KEY";

/// Engine configuration.
///
/// The crypto key is a single static shared secret: there is no per-message
/// or per-chat key derivation, every client of a deployment holds the same
/// value.
#[derive(Clone, Debug)]
pub struct Config {
    /// Passphrase the message codec derives its symmetric key from.
    pub crypto_key: String,
}

impl Config {
    /// Build a config from an explicit secret.
    pub fn new(crypto_key: impl Into<String>) -> Self {
        Self {
            crypto_key: crypto_key.into(),
        }
    }

    /// Load the config from the process environment.
    pub fn from_env() -> Result<Self, ChatError> {
        let crypto_key = std::env::var(CRYPTO_KEY_ENV)
            .map_err(|_| ChatError::Config(format!("{CRYPTO_KEY_ENV} is not set")))?;
        if crypto_key.is_empty() {
            return Err(ChatError::Config(format!("{CRYPTO_KEY_ENV} is empty")));
        }
        Ok(Self { crypto_key })
    }
}
