//! File sub-contract of the item envelope.
//!
//! Pipeline: content → deflate compress → AES-CBC encrypt under the item key.
//! The filename is encrypted with the URL-safe wrapped variant because the
//! encrypted name becomes a URL path segment, and the blob is stored keyed
//! by that encrypted name. The server cannot decrypt names, so the
//! plaintext→encrypted map is recovered client-side by decrypting every
//! stored name (an O(n) scan, not an index lookup).

use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;

use flate2::read::{DeflateDecoder, DeflateEncoder};
use flate2::Compression;
use tracing::debug;

use cbx_core::{CbxError, CbxResult};
use cbx_crypto::{sym, ItemKey};

use crate::account::Session;
use crate::store::RemoteStore;

pub(crate) fn compress(data: &[u8]) -> CbxResult<Vec<u8>> {
    let mut out = Vec::new();
    DeflateEncoder::new(data, Compression::default()).read_to_end(&mut out)?;
    Ok(out)
}

pub(crate) fn decompress(data: &[u8]) -> CbxResult<Vec<u8>> {
    let mut out = Vec::new();
    DeflateDecoder::new(data)
        .read_to_end(&mut out)
        // Decryption already succeeded, so a broken stream means the wrong
        // item key rather than transport corruption.
        .map_err(|e| CbxError::corrupt(format!("deflate stream: {e}")))?;
    Ok(out)
}

/// Encrypt content and name for storage; shared with the bundle builder.
pub(crate) fn seal_content(data: &[u8], key: &ItemKey) -> CbxResult<Vec<u8>> {
    Ok(sym::encrypt(&compress(data)?, key.as_str()))
}

pub(crate) fn seal_name(name: &str, key: &ItemKey) -> String {
    sym::encrypt_url_wrapped(name, key.as_str())
}

#[derive(Clone)]
pub struct FileClient {
    store: Arc<dyn RemoteStore>,
}

impl FileClient {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    /// Upload a file under an item. Returns the mapped (encrypted) name the
    /// content is stored under.
    pub async fn upload_file(
        &self,
        session: &Session,
        item_id: u64,
        name: &str,
        key: &ItemKey,
        data: &[u8],
    ) -> CbxResult<String> {
        let mapped = seal_name(name, key);
        let sealed = seal_content(data, key)?;
        debug!(item_id, bytes = data.len(), sealed = sealed.len(), "uploading file");
        self.store
            .put_file(session.user_id, item_id, &mapped, sealed)
            .await?;
        Ok(mapped)
    }

    /// Decrypt-scan of all stored names: plaintext name → encrypted name.
    pub async fn get_file_map(
        &self,
        session: &Session,
        item_id: u64,
        key: &ItemKey,
    ) -> CbxResult<HashMap<String, String>> {
        let names = self.store.list_files(session.user_id, item_id).await?;
        names
            .into_iter()
            .map(|mapped| {
                let plain = sym::decrypt_url_wrapped(&mapped, key.as_str())?;
                Ok((plain, mapped))
            })
            .collect()
    }

    /// Fetch and unseal content by its already-known encrypted name.
    pub async fn get_file_data(
        &self,
        session: &Session,
        item_id: u64,
        mapped_name: &str,
        key: &ItemKey,
    ) -> CbxResult<Vec<u8>> {
        let sealed = self
            .store
            .get_file(session.user_id, item_id, mapped_name)
            .await?;
        decompress(&sym::decrypt(&sealed, key.as_str())?)
    }

    pub async fn delete_file(
        &self,
        session: &Session,
        item_id: u64,
        mapped_name: &str,
    ) -> CbxResult<()> {
        self.store
            .delete_file(session.user_id, item_id, mapped_name)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_roundtrip() {
        let data = b"hello world hello world hello world".repeat(20);
        let packed = compress(&data).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(decompress(&packed).unwrap(), data);
    }

    #[test]
    fn test_decompress_garbage_is_corrupt() {
        let err = decompress(&[0xde, 0xad, 0xbe, 0xef, 0x01]).unwrap_err();
        assert!(matches!(err, CbxError::EnvelopeCorrupt(_)));
    }

    #[test]
    fn test_seal_roundtrip() {
        let key = ItemKey::generate();
        let sealed = seal_content(b"file body", &key).unwrap();
        let opened =
            decompress(&sym::decrypt(&sealed, key.as_str()).unwrap()).unwrap();
        assert_eq!(opened, b"file body");
    }

    #[test]
    fn test_sealed_name_is_stable() {
        // The file map depends on names re-encrypting identically.
        let key = ItemKey::generate();
        assert_eq!(seal_name("a.txt", &key), seal_name("a.txt", &key));
    }
}
