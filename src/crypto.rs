//! Symmetric encryption of message bodies.
//!
//! Messages are encrypted at the store boundary with ChaCha20-Poly1305 and a
//! random 12-byte nonce prepended to the ciphertext, hex-encoded for
//! transport. The key is derived once from the deployment's shared secret
//! with Argon2id.

use argon2::{Argon2, Params, Version};
use chacha20poly1305::{aead::Aead, ChaCha20Poly1305, KeyInit, Nonce};
use rand::Rng;
use zeroize::Zeroize;

use crate::error::ChatError;
use crate::util::{bytes_to_hex_string, hex_string_to_bytes};

// Argon2id cost parameters for the one-time key derivation at startup.
const ARGON_MEMORY_KIB: u32 = 19_456;
const ARGON_ITERATIONS: u32 = 2;

// The secret is a deployment-wide shared value, not a per-user credential,
// so a static salt is sufficient for domain separation.
const KEY_SALT: &[u8] = b"courier-message-codec";

/// Derive a 256-bit cipher key from the shared secret using Argon2id.
pub fn derive_key(passphrase: &str) -> Result<[u8; 32], ChatError> {
    let params = Params::new(ARGON_MEMORY_KIB, ARGON_ITERATIONS, 1, Some(32))
        .map_err(|e| ChatError::Config(format!("invalid key derivation params: {e}")))?;
    let argon = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params);

    let mut key: [u8; 32] = [0; 32];
    argon
        .hash_password_into(passphrase.as_bytes(), KEY_SALT, &mut key)
        .map_err(|e| ChatError::Config(format!("key derivation failed: {e}")))?;

    Ok(key)
}

/// Encrypts and decrypts message bodies with a fixed derived key.
pub struct MessageCodec {
    key: [u8; 32],
}

impl MessageCodec {
    /// Derive the codec key from the shared secret.
    pub fn new(passphrase: &str) -> Result<Self, ChatError> {
        Ok(Self {
            key: derive_key(passphrase)?,
        })
    }

    /// Encrypt a plaintext message body to a hex-encoded ciphertext.
    pub fn encrypt(&self, plaintext: &str) -> String {
        // Generate a random 12-byte nonce
        let mut rng = rand::thread_rng();
        let nonce_bytes: [u8; 12] = rng.gen();

        let cipher = ChaCha20Poly1305::new_from_slice(&self.key).expect("Key should be valid");
        let nonce: Nonce = nonce_bytes.into();

        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .expect("Encryption should not fail");

        // Prepend the nonce to the ciphertext
        let mut buffer = Vec::with_capacity(nonce_bytes.len() + ciphertext.len());
        buffer.extend_from_slice(&nonce_bytes);
        buffer.extend_from_slice(&ciphertext);

        bytes_to_hex_string(&buffer)
    }

    /// Decrypt a hex-encoded ciphertext back to the plaintext body.
    ///
    /// Malformed input or a wrong key yields `ChatError::Crypto`; callers at
    /// the snapshot boundary degrade to empty text rather than failing the
    /// whole snapshot.
    pub fn decrypt(&self, ciphertext: &str) -> Result<String, ChatError> {
        let encrypted_data = hex_string_to_bytes(ciphertext);
        if encrypted_data.len() < 12 {
            return Err(ChatError::Crypto);
        }

        // Split off the nonce prefix
        let (nonce_bytes, actual_ciphertext) = encrypted_data.split_at(12);

        let cipher =
            ChaCha20Poly1305::new_from_slice(&self.key).map_err(|_| ChatError::Crypto)?;

        let nonce_arr: [u8; 12] = nonce_bytes.try_into().map_err(|_| ChatError::Crypto)?;
        let nonce: Nonce = nonce_arr.into();

        let plaintext = cipher
            .decrypt(&nonce, actual_ciphertext)
            .map_err(|_| ChatError::Crypto)?;

        String::from_utf8(plaintext).map_err(|_| ChatError::Crypto)
    }
}

impl Drop for MessageCodec {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// Check if a string has the shape of codec output (hex-encoded nonce +
/// ciphertext + auth tag).
///
/// Minimum (empty message): 12 + 0 + 16 = 28 bytes = 56 hex chars. Strictly
/// lowercase: the codec always emits lowercase hex, and rejecting uppercase
/// reduces false positives on user-typed hex content.
pub fn looks_encrypted(s: &str) -> bool {
    if s.len() < 56 {
        return false;
    }
    s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
