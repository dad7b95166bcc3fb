//! cbx-crypto: envelope cryptography for cipherbox
//!
//! Key hierarchy:
//! ```text
//! password + salt ──SHA-256──▶ kek ──SHA-256──▶ auth_hash (sent to server)
//!   │                           │
//!   │                           └── wraps the account RSA private key (AES-CBC)
//!   │
//! RSA-4096 key pair (per account / per worker)
//!   └── wraps each per-item symmetric key (chunked RSA-OAEP)
//!         └── encrypts item meta, tags, filenames, file content (AES-CBC)
//! ```
//!
//! The symmetric envelope is deterministic on purpose: both the cipher key
//! and the IV are derived from SHA-256 of the key string, so re-encrypting
//! the same value yields the same stored ciphertext. See `sym` for the
//! compatibility constraint this carries.

pub mod asym;
pub mod b64;
pub mod custody;
pub mod keys;
pub mod sym;

pub use asym::generate_key_pair;
pub use custody::{derive_kek, login_hash, register_credentials, unlock_private_key};
pub use keys::{ItemKey, KeyPair};

/// Size of a symmetric key's raw material in bytes (256-bit).
pub const SYM_KEY_SIZE: usize = 32;

/// AES block size; also the length of the derived IV.
pub const BLOCK_SIZE: usize = 16;

/// Per-account salt length in bytes.
pub const SALT_SIZE: usize = 16;
