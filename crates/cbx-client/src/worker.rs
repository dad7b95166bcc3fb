//! Worker-side client: registration, presence, the claim loop, and the
//! upload path for delivering processed results as new items.
//!
//! A worker authenticates with an API token minted by the owning user, and
//! generates its own key pair at registration; the private key never leaves
//! the worker. Task URLs reach it encrypted under its public key.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::info;

use cbx_core::types::{NewItemRecord, TaskStatus};
use cbx_core::CbxResult;
use cbx_crypto::{asym, sym, ItemKey, KeyPair};

use crate::bundle::ItemBundle;
use crate::file::{seal_content, seal_name};
use crate::notify::WorkerChannel;
use crate::store::{NotifyTransport, RemoteStore};

/// A task claimed from the queue, URL decrypted with the worker's key.
#[derive(Debug, Clone)]
pub struct ClaimedTask {
    pub id: u64,
    pub url: String,
}

pub struct WorkerClient {
    store: Arc<dyn RemoteStore>,
    token: String,
    worker_id: u64,
    key_pair: KeyPair,
}

impl WorkerClient {
    /// Register a new worker identity under the presented token, generating
    /// a fresh key pair for it.
    pub async fn register(
        store: Arc<dyn RemoteStore>,
        token: &str,
        title: &str,
    ) -> CbxResult<WorkerClient> {
        let key_pair = asym::generate_key_pair()?;
        let worker_id = store.register_worker(token, title).await?;
        info!(worker_id, title, "worker registered");
        Ok(WorkerClient {
            store,
            token: token.to_string(),
            worker_id,
            key_pair,
        })
    }

    pub fn worker_id(&self) -> u64 {
        self.worker_id
    }

    pub fn public_key(&self) -> &str {
        &self.key_pair.public_key
    }

    /// Open the presence channel. While it is up the worker is online; the
    /// handshake hands the owner this worker's public key, wrapped under the
    /// owner's key. Pings arrive on `notify_tx` whenever there may be work.
    pub async fn connect(
        &self,
        transport: &dyn NotifyTransport,
        user_public_key: &str,
        notify_tx: mpsc::UnboundedSender<()>,
    ) -> CbxResult<WorkerChannel> {
        WorkerChannel::connect(
            transport,
            &self.token,
            &self.key_pair.public_key,
            user_public_key,
            notify_tx,
        )
        .await
    }

    /// Public key of the account this worker serves.
    pub async fn owner_public_key(&self) -> CbxResult<String> {
        self.store.owner_public_key(&self.token).await
    }

    /// Claim at most one queued task. `None` means an empty queue — a
    /// normal result, not an error.
    pub async fn poll_task(&self) -> CbxResult<Option<ClaimedTask>> {
        let Some(record) = self.store.claim_task(&self.token).await? else {
            return Ok(None);
        };
        let url = asym::decrypt_wrapped(&record.url_cipher, &self.key_pair.private_key)?;
        info!(task_id = record.id, "task claimed");
        Ok(Some(ClaimedTask {
            id: record.id,
            url,
        }))
    }

    pub async fn task_success(&self, task_id: u64) -> CbxResult<()> {
        self.store
            .set_task_status(&self.token, task_id, TaskStatus::Success)
            .await
    }

    pub async fn task_failed(&self, task_id: u64) -> CbxResult<()> {
        self.store
            .set_task_status(&self.token, task_id, TaskStatus::Failed)
            .await
    }

    /// Create an item on the owner's behalf, wrapped for the owner's key.
    /// Returns the item id and the unwrapped item key for file uploads.
    pub async fn create_item<M: Serialize>(
        &self,
        owner_public_key: &str,
        meta: &M,
        tags: &[String],
    ) -> CbxResult<(u64, ItemKey)> {
        let key = ItemKey::generate();
        let meta_json = serde_json::to_string(meta)
            .map_err(|e| anyhow::anyhow!("meta serialization: {e}"))?;
        let record = NewItemRecord {
            key_cipher: asym::encrypt_wrapped(key.as_str(), owner_public_key)?,
            meta_cipher: sym::encrypt_wrapped(&meta_json, key.as_str()),
            tag_ciphers: tags
                .iter()
                .map(|t| sym::encrypt_wrapped(t, key.as_str()))
                .collect(),
        };
        let id = self.store.worker_create_item(&self.token, record).await?;
        Ok((id, key))
    }

    pub async fn upload_file(
        &self,
        item_id: u64,
        name: &str,
        key: &ItemKey,
        data: &[u8],
    ) -> CbxResult<String> {
        let mapped = seal_name(name, key);
        let sealed = seal_content(data, key)?;
        self.store
            .worker_put_file(&self.token, item_id, &mapped, sealed)
            .await?;
        Ok(mapped)
    }

    /// Submit a pre-built offline bundle as one item.
    pub async fn upload_bundle(&self, bundle: ItemBundle) -> CbxResult<u64> {
        let record = NewItemRecord {
            key_cipher: bundle.index.key_cipher,
            meta_cipher: bundle.index.meta_cipher,
            tag_ciphers: bundle.index.tag_ciphers,
        };
        let item_id = self.store.worker_create_item(&self.token, record).await?;
        for file in bundle.files {
            self.store
                .worker_put_file(&self.token, item_id, &file.mapped_name, file.data)
                .await?;
        }
        info!(item_id, "bundle uploaded");
        Ok(item_id)
    }
}
