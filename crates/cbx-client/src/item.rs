//! Item envelope operations.
//!
//! Per item: one fresh symmetric key, wrapped under the owner's public key;
//! meta, tags, and filenames are encrypted under that item key. Asymmetric
//! decryption is used only to recover the item key — never applied directly
//! to meta, tags, or file content, since chunked RSA is far slower than the
//! symmetric path for bulk data.

use std::future::Future;
use std::sync::Arc;

use futures::future;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use cbx_core::types::{EncryptedItemRecord, NewItemRecord};
use cbx_core::{CbxError, CbxResult};
use cbx_crypto::{asym, sym, ItemKey};

use crate::account::Session;
use crate::store::RemoteStore;

/// A decrypted tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagData {
    pub id: u64,
    pub tag: String,
}

/// A fully decrypted item, including its unwrapped key (needed immediately
/// for file operations; the server never returns it).
#[derive(Debug)]
pub struct ItemIndexData<M> {
    pub id: u64,
    pub key: ItemKey,
    pub meta: M,
    pub tags: Vec<TagData>,
}

/// One decrypted page of the item listing.
#[derive(Debug)]
pub struct ItemList<M> {
    pub total: u64,
    pub items: Vec<ItemIndexData<M>>,
}

/// Ready-made meta parser: deserialize straight into `M`.
///
/// `get_item`'s parser argument is a caller-supplied projection from the
/// decrypted JSON into a typed meta value; it may be effectful or
/// asynchronous (schema migration, lookups) and is awaited. This one just
/// maps a shape mismatch to `EnvelopeCorrupt`.
pub async fn typed_meta<M: DeserializeOwned>(value: serde_json::Value) -> CbxResult<M> {
    serde_json::from_value(value)
        .map_err(|e| CbxError::corrupt(format!("meta does not match expected shape: {e}")))
}

fn meta_value(meta_text: &str) -> CbxResult<serde_json::Value> {
    // Cipher-level decryption succeeded; a parse failure here points at the
    // wrong item key, not transport corruption.
    serde_json::from_str(meta_text)
        .map_err(|_| CbxError::corrupt("decrypted item meta is not valid JSON"))
}

pub(crate) async fn decrypt_item<M, P, Fut>(
    record: EncryptedItemRecord,
    private_key: &str,
    parser: &P,
) -> CbxResult<ItemIndexData<M>>
where
    P: Fn(serde_json::Value) -> Fut,
    Fut: Future<Output = CbxResult<M>>,
{
    let key = ItemKey::from_text(asym::decrypt_wrapped(&record.key_cipher, private_key)?);
    let meta_text = sym::decrypt_wrapped(&record.meta_cipher, key.as_str())?;
    let meta = parser(meta_value(&meta_text)?).await?;
    let tags = record
        .tags
        .iter()
        .map(|t| {
            Ok(TagData {
                id: t.id,
                tag: sym::decrypt_wrapped(&t.tag_cipher, key.as_str())?,
            })
        })
        .collect::<CbxResult<Vec<_>>>()?;
    Ok(ItemIndexData {
        id: record.id,
        key,
        meta,
        tags,
    })
}

#[derive(Clone)]
pub struct ItemClient {
    store: Arc<dyn RemoteStore>,
}

impl ItemClient {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    /// Create an item: fresh item key, meta and tags wrapped under it, the
    /// key itself wrapped under the owner's public key. Returns the
    /// unwrapped key for immediate file uploads.
    pub async fn create_item<M: Serialize>(
        &self,
        session: &Session,
        meta: &M,
        tags: &[String],
    ) -> CbxResult<(u64, ItemKey)> {
        let key = ItemKey::generate();
        let record = NewItemRecord {
            key_cipher: asym::encrypt_wrapped(key.as_str(), &session.public_key)?,
            meta_cipher: sym::encrypt_wrapped(&to_json(meta)?, key.as_str()),
            tag_ciphers: tags
                .iter()
                .map(|t| sym::encrypt_wrapped(t, key.as_str()))
                .collect(),
        };
        let id = self.store.create_item(session.user_id, record).await?;
        info!(item_id = id, "item created");
        Ok((id, key))
    }

    pub async fn get_item<M, P, Fut>(
        &self,
        session: &Session,
        item_id: u64,
        parser: P,
    ) -> CbxResult<ItemIndexData<M>>
    where
        P: Fn(serde_json::Value) -> Fut,
        Fut: Future<Output = CbxResult<M>>,
    {
        let record = self.store.get_item(session.user_id, item_id).await?;
        decrypt_item(record, session.private_key(), &parser).await
    }

    /// Paginated listing. Per-item decryption runs as unordered concurrent
    /// sub-operations; the returned sequence preserves server order.
    pub async fn query_item_list<M, P, Fut>(
        &self,
        session: &Session,
        offset: u64,
        limit: u64,
        parser: P,
    ) -> CbxResult<ItemList<M>>
    where
        P: Fn(serde_json::Value) -> Fut,
        Fut: Future<Output = CbxResult<M>>,
    {
        let page = self
            .store
            .list_items(session.user_id, offset, limit)
            .await?;
        debug!(total = page.total, fetched = page.items.len(), "item page");
        let items = future::try_join_all(
            page.items
                .into_iter()
                .map(|rec| decrypt_item(rec, session.private_key(), &parser)),
        )
        .await?;
        Ok(ItemList {
            total: page.total,
            items,
        })
    }

    pub async fn items_total(&self, session: &Session) -> CbxResult<u64> {
        self.store.items_total(session.user_id).await
    }

    /// Re-wrap the meta with the already-known item key; no round trip to
    /// fetch the key.
    pub async fn update_item_meta<M: Serialize>(
        &self,
        session: &Session,
        item_id: u64,
        meta: &M,
        key: &ItemKey,
    ) -> CbxResult<()> {
        let meta_cipher = sym::encrypt_wrapped(&to_json(meta)?, key.as_str());
        self.store
            .update_item_meta(session.user_id, item_id, meta_cipher)
            .await
    }

    pub async fn add_tag(
        &self,
        session: &Session,
        item_id: u64,
        tag: &str,
        key: &ItemKey,
    ) -> CbxResult<TagData> {
        let tag_cipher = sym::encrypt_wrapped(tag, key.as_str());
        let id = self
            .store
            .add_tag(session.user_id, item_id, tag_cipher)
            .await?;
        Ok(TagData {
            id,
            tag: tag.to_string(),
        })
    }

    /// Deletion is by tag id, irreversible.
    pub async fn delete_tag(&self, session: &Session, item_id: u64, tag_id: u64) -> CbxResult<()> {
        self.store.delete_tag(session.user_id, item_id, tag_id).await
    }

    pub async fn delete_item(&self, session: &Session, item_id: u64) -> CbxResult<()> {
        info!(item_id, "deleting item");
        self.store.delete_item(session.user_id, item_id).await
    }
}

fn to_json<M: Serialize>(meta: &M) -> CbxResult<String> {
    serde_json::to_string(meta)
        .map_err(|e| anyhow::anyhow!("meta serialization: {e}").into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_value_rejects_non_json() {
        let err = meta_value("\u{fffd}garbage from a wrong key").unwrap_err();
        assert!(matches!(err, CbxError::EnvelopeCorrupt(_)));
    }

    #[tokio::test]
    async fn test_typed_meta_shape_mismatch() {
        #[derive(Debug, serde::Deserialize)]
        struct Meta {
            #[allow(dead_code)]
            title: String,
        }
        let err = typed_meta::<Meta>(serde_json::json!({ "other": 1 }))
            .await
            .unwrap_err();
        assert!(matches!(err, CbxError::EnvelopeCorrupt(_)));
    }
}
