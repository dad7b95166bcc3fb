//! Asymmetric envelope: 4096-bit RSA-OAEP/SHA-256 with fixed-size chunking.
//!
//! OAEP bounds the per-block plaintext well below the modulus size, so
//! encryption splits the plaintext into 256-byte chunks and encrypts each
//! independently, concatenating the 512-byte ciphertext blocks with no
//! delimiter. Decryption therefore MUST split the ciphertext by the OUTPUT
//! block size (`key.size()`, 512 bytes for a 4096-bit modulus), not by the
//! 256-byte input chunk size — splitting by the input size silently corrupts
//! every payload longer than one block.

use rand::rngs::ThreadRng;
use rsa::pkcs8::{
    DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding,
};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use cbx_core::{CbxError, CbxResult};

use crate::b64;
use crate::keys::KeyPair;

/// RSA modulus size in bits.
pub const KEY_BITS: usize = 4096;

/// Plaintext bytes fed to each RSA block. Fixed by the stored-ciphertext
/// format; must stay below the OAEP capacity of the modulus (446 bytes for
/// 4096-bit RSA with SHA-256).
pub const CHUNK_SIZE: usize = 256;

fn oaep() -> Oaep {
    Oaep::new::<Sha256>()
}

/// Generate a fresh 4096-bit key pair, PEM-encoded.
pub fn generate_key_pair() -> CbxResult<KeyPair> {
    let mut rng = rand::thread_rng();
    let private = RsaPrivateKey::new(&mut rng, KEY_BITS)
        .map_err(|e| CbxError::crypto(format!("RSA keygen: {e}")))?;
    let public = RsaPublicKey::from(&private);

    let private_pem = private
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| CbxError::crypto(format!("private key encoding: {e}")))?;
    let public_pem = public
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| CbxError::crypto(format!("public key encoding: {e}")))?;

    Ok(KeyPair {
        public_key: public_pem,
        private_key: private_pem.to_string(),
    })
}

fn parse_public(pem: &str) -> CbxResult<RsaPublicKey> {
    RsaPublicKey::from_public_key_pem(pem)
        .map_err(|e| CbxError::crypto(format!("bad public key: {e}")))
}

fn parse_private(pem: &str) -> CbxResult<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .map_err(|e| CbxError::crypto(format!("bad private key: {e}")))
}

fn encrypt_chunks(
    data: &[u8],
    key: &RsaPublicKey,
    rng: &mut ThreadRng,
) -> CbxResult<Vec<u8>> {
    let block = key.size();
    let mut out = Vec::with_capacity(data.len().div_ceil(CHUNK_SIZE).max(1) * block);
    for chunk in data.chunks(CHUNK_SIZE) {
        let ct = key
            .encrypt(rng, oaep(), chunk)
            .map_err(|e| CbxError::crypto(format!("RSA encrypt: {e}")))?;
        out.extend_from_slice(&ct);
    }
    Ok(out)
}

/// Encrypt raw bytes under a PEM public key.
pub fn encrypt(data: &[u8], public_key_pem: &str) -> CbxResult<Vec<u8>> {
    let key = parse_public(public_key_pem)?;
    encrypt_chunks(data, &key, &mut rand::thread_rng())
}

/// Decrypt raw bytes with a PEM private key.
///
/// A length that is not a multiple of the modulus size means truncated or
/// corrupt ciphertext; a wrong key surfaces as an OAEP decryption error.
pub fn decrypt(data: &[u8], private_key_pem: &str) -> CbxResult<Vec<u8>> {
    let key = parse_private(private_key_pem)?;
    let block = key.size();
    if data.len() % block != 0 {
        return Err(CbxError::crypto(format!(
            "ciphertext length {} is not a multiple of the {block}-byte block size",
            data.len()
        )));
    }
    let mut out = Vec::with_capacity((data.len() / block) * CHUNK_SIZE);
    for chunk in data.chunks(block) {
        let plain = key
            .decrypt(oaep(), chunk)
            .map_err(|e| CbxError::crypto(format!("RSA decrypt: {e}")))?;
        out.extend_from_slice(&plain);
    }
    Ok(out)
}

/// Encrypt a string, returning standard base64 text.
pub fn encrypt_wrapped(text: &str, public_key_pem: &str) -> CbxResult<String> {
    Ok(b64::encode(&encrypt(text.as_bytes(), public_key_pem)?))
}

/// Decrypt standard-base64 text back to a string.
pub fn decrypt_wrapped(ciphertext: &str, private_key_pem: &str) -> CbxResult<String> {
    let plain = decrypt(&b64::decode(ciphertext)?, private_key_pem)?;
    String::from_utf8(plain)
        .map_err(|_| CbxError::corrupt("decrypted text is not UTF-8"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    // Keygen is expensive; share one pair across this module's tests.
    fn test_pair() -> &'static KeyPair {
        static PAIR: OnceLock<KeyPair> = OnceLock::new();
        PAIR.get_or_init(|| generate_key_pair().unwrap())
    }

    #[test]
    fn test_roundtrip_single_block() {
        let pair = test_pair();
        let plain = b"short secret";
        let ct = encrypt(plain, &pair.public_key).unwrap();
        assert_eq!(ct.len(), KEY_BITS / 8);
        assert_eq!(decrypt(&ct, &pair.private_key).unwrap(), plain);
    }

    #[test]
    fn test_roundtrip_multi_block() {
        // 10 000 bytes forces 40 chunks; exercises the chunk/merge path.
        let pair = test_pair();
        let plain: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let ct = encrypt(&plain, &pair.public_key).unwrap();
        assert_eq!(ct.len(), plain.len().div_ceil(CHUNK_SIZE) * (KEY_BITS / 8));
        assert_eq!(decrypt(&ct, &pair.private_key).unwrap(), plain);
    }

    #[test]
    fn test_roundtrip_exact_chunk_boundary() {
        let pair = test_pair();
        let plain = vec![0xa5u8; CHUNK_SIZE * 2];
        let ct = encrypt(&plain, &pair.public_key).unwrap();
        assert_eq!(decrypt(&ct, &pair.private_key).unwrap(), plain);
    }

    #[test]
    fn test_wrapped_roundtrip() {
        let pair = test_pair();
        let ct = encrypt_wrapped("http://example.com/very/secret", &pair.public_key).unwrap();
        assert_eq!(
            decrypt_wrapped(&ct, &pair.private_key).unwrap(),
            "http://example.com/very/secret"
        );
    }

    #[test]
    fn test_truncated_ciphertext() {
        let pair = test_pair();
        let ct = encrypt(b"payload", &pair.public_key).unwrap();
        let err = decrypt(&ct[..ct.len() - 1], &pair.private_key).unwrap_err();
        assert!(matches!(err, cbx_core::CbxError::Crypto(_)));
    }

    #[test]
    fn test_wrong_key() {
        let pair = test_pair();
        let other = generate_key_pair().unwrap();
        let ct = encrypt(b"payload", &pair.public_key).unwrap();
        assert!(decrypt(&ct, &other.private_key).is_err());
    }

    #[test]
    fn test_bad_pem() {
        assert!(encrypt(b"x", "not a pem").is_err());
        assert!(decrypt(&[0u8; 512], "not a pem").is_err());
    }
}
