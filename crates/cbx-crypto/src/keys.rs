//! Key material types: the per-item symmetric key and RSA key pairs.

use zeroize::Zeroize;

use crate::sym;

/// A per-item symmetric key, one generated per item and never stored in
/// plaintext outside the client. Text form is base64 of 32 random bytes.
/// Zeroized on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct ItemKey {
    text: String,
}

impl ItemKey {
    /// Generate a fresh item key.
    pub fn generate() -> Self {
        Self {
            text: sym::generate_key(),
        }
    }

    /// Rebuild from the text form recovered by unwrapping `key_cipher`.
    pub fn from_text(text: String) -> Self {
        Self { text }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl Drop for ItemKey {
    fn drop(&mut self) {
        self.text.zeroize();
    }
}

impl std::fmt::Debug for ItemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemKey")
            .field("text", &"[REDACTED]")
            .finish()
    }
}

/// An RSA key pair in PEM text form (SPKI public, PKCS#8 private).
///
/// The private key never leaves the generating party in plaintext; it is
/// persisted only after wrapping (see `custody`).
#[derive(Clone)]
pub struct KeyPair {
    pub public_key: String,
    pub private_key: String,
}

impl Drop for KeyPair {
    fn drop(&mut self) {
        self.private_key.zeroize();
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}
