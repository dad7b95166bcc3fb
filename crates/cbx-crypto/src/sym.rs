//! Deterministic symmetric envelope: AES-256-CBC keyed by a short key string.
//!
//! Both the cipher key and the IV are derived from SHA-256 of the key string
//! (IV = first 16 bytes of the hash), so encrypting the same plaintext under
//! the same key always yields the same ciphertext. Stored ciphertext depends
//! on this determinism — re-wrapping a value is idempotent, and the encrypted
//! filename map only works because names re-encrypt to the same blob name.
//! Do not swap in a random IV without a ciphertext migration.
//!
//! Decrypting with the wrong key yields garbage or a padding error, never a
//! distinguishable "wrong key" signal; callers detect the mismatch when the
//! plaintext fails UTF-8 or JSON parsing downstream.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use sha2::{Digest, Sha256};

use cbx_core::{CbxError, CbxResult};

use crate::{b64, BLOCK_SIZE, SYM_KEY_SIZE};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Generate a fresh symmetric key: 32 random bytes in base64 text form.
pub fn generate_key() -> String {
    let mut raw = [0u8; SYM_KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut raw);
    b64::encode(&raw)
}

/// Derive the AES key and IV from the key string.
///
/// cipher key = SHA-256(key), IV = first 16 bytes of that same hash.
pub fn derive_key(key: &str) -> ([u8; SYM_KEY_SIZE], [u8; BLOCK_SIZE]) {
    let digest = Sha256::digest(key.as_bytes());
    let mut cipher_key = [0u8; SYM_KEY_SIZE];
    cipher_key.copy_from_slice(&digest);
    let mut iv = [0u8; BLOCK_SIZE];
    iv.copy_from_slice(&digest[..BLOCK_SIZE]);
    (cipher_key, iv)
}

/// Encrypt raw bytes. Deterministic per key (see module docs).
pub fn encrypt(plaintext: &[u8], key: &str) -> Vec<u8> {
    let (cipher_key, iv) = derive_key(key);
    Aes256CbcEnc::new(&cipher_key.into(), &iv.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

/// Decrypt raw bytes.
pub fn decrypt(ciphertext: &[u8], key: &str) -> CbxResult<Vec<u8>> {
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(CbxError::crypto(format!(
            "ciphertext length {} is not a positive multiple of {BLOCK_SIZE}",
            ciphertext.len()
        )));
    }
    let (cipher_key, iv) = derive_key(key);
    Aes256CbcDec::new(&cipher_key.into(), &iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CbxError::crypto("bad padding: wrong key or corrupted ciphertext"))
}

/// Encrypt a string, returning standard base64 text.
pub fn encrypt_wrapped(text: &str, key: &str) -> String {
    b64::encode(&encrypt(text.as_bytes(), key))
}

/// Decrypt standard-base64 text back to a string.
pub fn decrypt_wrapped(ciphertext: &str, key: &str) -> CbxResult<String> {
    let plain = decrypt(&b64::decode(ciphertext)?, key)?;
    String::from_utf8(plain)
        .map_err(|_| CbxError::corrupt("decrypted text is not UTF-8"))
}

/// URL-safe variant of [`encrypt_wrapped`], for values embedded in URL paths.
pub fn encrypt_url_wrapped(text: &str, key: &str) -> String {
    b64::encode_url(&encrypt(text.as_bytes(), key))
}

/// URL-safe variant of [`decrypt_wrapped`].
pub fn decrypt_url_wrapped(ciphertext: &str, key: &str) -> CbxResult<String> {
    let plain = decrypt(&b64::decode_url(ciphertext)?, key)?;
    String::from_utf8(plain)
        .map_err(|_| CbxError::corrupt("decrypted text is not UTF-8"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_roundtrip_bytes() {
        let key = generate_key();
        let plain = b"hello symmetric envelope";
        let ct = encrypt(plain, &key);
        assert_ne!(&ct[..], &plain[..]);
        assert_eq!(decrypt(&ct, &key).unwrap(), plain);
    }

    #[test]
    fn test_deterministic() {
        // Documents the deterministic-IV design: same plaintext + key must
        // produce byte-identical ciphertext.
        let key = generate_key();
        let a = encrypt(b"repeat me", &key);
        let b = encrypt(b"repeat me", &key);
        assert_eq!(a, b);
    }

    #[test]
    fn test_iv_is_key_hash_prefix() {
        let (cipher_key, iv) = derive_key("some-key");
        assert_eq!(&iv[..], &cipher_key[..BLOCK_SIZE]);
    }

    #[test]
    fn test_wrapped_roundtrip() {
        let key = generate_key();
        let ct = encrypt_wrapped("ünïcode täg", &key);
        assert_eq!(decrypt_wrapped(&ct, &key).unwrap(), "ünïcode täg");
    }

    #[test]
    fn test_url_wrapped_is_path_safe() {
        let key = generate_key();
        let ct = encrypt_url_wrapped("some file name (1).png", &key);
        assert!(!ct.contains('/'));
        assert!(!ct.contains('+'));
        assert_eq!(
            decrypt_url_wrapped(&ct, &key).unwrap(),
            "some file name (1).png"
        );
    }

    #[test]
    fn test_wrong_key_fails_or_garbles() {
        let ct = encrypt(b"the plaintext, long enough for several blocks....", "key-a");
        match decrypt(&ct, "key-b") {
            Err(_) => {}
            Ok(garbage) => assert_ne!(
                garbage, b"the plaintext, long enough for several blocks....",
                "wrong key must not round-trip"
            ),
        }
    }

    #[test]
    fn test_truncated_ciphertext() {
        let key = generate_key();
        let ct = encrypt(b"0123456789abcdef0123456789abcdef", &key);
        assert!(decrypt(&ct[..ct.len() - 5], &key).is_err());
        assert!(decrypt(&[], &key).is_err());
    }

    proptest! {
        #[test]
        fn prop_roundtrip(plain in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let key = generate_key();
            let ct = encrypt(&plain, &key);
            prop_assert_eq!(decrypt(&ct, &key).unwrap(), plain);
        }

        #[test]
        fn prop_deterministic(plain in proptest::collection::vec(any::<u8>(), 0..512)) {
            let key = generate_key();
            prop_assert_eq!(encrypt(&plain, &key), encrypt(&plain, &key));
        }
    }
}
