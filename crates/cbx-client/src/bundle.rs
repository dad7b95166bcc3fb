//! Offline item bundles: a fully sealed item (wrapped key, metadata, tags,
//! files) assembled without a server connection, uploadable later in one
//! pass. Everything in a bundle is already ciphertext, so a bundle can be
//! persisted or shipped through untrusted channels as-is.

use serde::{Deserialize, Serialize};

use cbx_core::CbxResult;
use cbx_crypto::{asym, sym, ItemKey};

use crate::file::{seal_content, seal_name};

/// The sealed index portion of a bundle: everything except file bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleIndex {
    pub key_cipher: String,
    pub meta_cipher: String,
    pub tag_ciphers: Vec<String>,
    /// Mapped (encrypted) file names, in upload order.
    pub file_names: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct BundleFile {
    pub mapped_name: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ItemBundle {
    pub index: BundleIndex,
    pub files: Vec<BundleFile>,
}

/// Accumulates plaintext parts and seals them under a fresh item key.
pub struct BundleBuilder {
    key: ItemKey,
    meta_json: String,
    tags: Vec<String>,
    files: Vec<(String, Vec<u8>)>,
}

impl BundleBuilder {
    pub fn new<M: Serialize>(meta: &M, tags: &[String]) -> CbxResult<BundleBuilder> {
        let meta_json = serde_json::to_string(meta)
            .map_err(|e| anyhow::anyhow!("meta serialization: {e}"))?;
        Ok(BundleBuilder {
            key: ItemKey::generate(),
            meta_json,
            tags: tags.to_vec(),
            files: Vec::new(),
        })
    }

    pub fn add_file(&mut self, name: &str, data: Vec<u8>) -> &mut BundleBuilder {
        self.files.push((name.to_string(), data));
        self
    }

    /// Seal everything for the given owner. Consumes the builder; the item
    /// key is dropped (and zeroized) with it.
    pub fn build(self, owner_public_key: &str) -> CbxResult<ItemBundle> {
        let mut files = Vec::with_capacity(self.files.len());
        let mut file_names = Vec::with_capacity(self.files.len());
        for (name, data) in &self.files {
            let mapped = seal_name(name, &self.key);
            let sealed = seal_content(data, &self.key)?;
            file_names.push(mapped.clone());
            files.push(BundleFile {
                mapped_name: mapped,
                data: sealed,
            });
        }
        let index = BundleIndex {
            key_cipher: asym::encrypt_wrapped(self.key.as_str(), owner_public_key)?,
            meta_cipher: sym::encrypt_wrapped(&self.meta_json, self.key.as_str()),
            tag_ciphers: self
                .tags
                .iter()
                .map(|t| sym::encrypt_wrapped(t, self.key.as_str()))
                .collect(),
            file_names,
        };
        Ok(ItemBundle { index, files })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_seals_every_part() {
        let pair = crate::test_keys::shared_pair();
        let mut builder = BundleBuilder::new(&json!({"title": "t"}), &["a".into()]).unwrap();
        builder.add_file("x.txt", b"payload".to_vec());
        let bundle = builder.build(&pair.public_key).unwrap();

        assert_eq!(bundle.files.len(), 1);
        assert_eq!(bundle.index.file_names, vec![bundle.files[0].mapped_name.clone()]);

        let key = asym::decrypt_wrapped(&bundle.index.key_cipher, &pair.private_key).unwrap();
        let meta = sym::decrypt_wrapped(&bundle.index.meta_cipher, &key).unwrap();
        assert_eq!(meta, r#"{"title":"t"}"#);
        assert_eq!(
            sym::decrypt_wrapped(&bundle.index.tag_ciphers[0], &key).unwrap(),
            "a"
        );
    }
}
