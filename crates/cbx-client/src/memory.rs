//! In-process reference implementation of the storage and notification
//! boundaries, used by the integration tests and as the executable
//! specification of server behavior.
//!
//! One mutex guards all tables, which makes `claim_task` the atomic
//! read-modify-write the state machine requires: find the first SUSPENDED
//! task for the worker and flip it to RUNNING while holding the lock, so two
//! concurrent claims can never return the same task.
//!
//! Presence is channel-driven: connecting a notification channel marks the
//! worker online and records its wrapped public key; dropping the connection
//! (any exit path) marks it offline again.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use cbx_core::types::{
    AccountRecord, ChannelHandshake, EncryptedItemRecord, EncryptedTagRecord,
    EncryptedTaskRecord, EncryptedWorkerRecord, ItemPage, NewAccountRecord, NewItemRecord,
    NewTaskRecord, TaskStatus, TokenCreated, TokenRecord,
};
use cbx_core::{CbxError, CbxResult};

use crate::store::{NotifyConnection, NotifyTransport, RemoteStore};

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    accounts: BTreeMap<u64, AccountRow>,
    items: BTreeMap<u64, ItemRow>,
    /// (item_id, mapped_name) → compressed+encrypted content
    files: BTreeMap<(u64, String), Vec<u8>>,
    tokens: BTreeMap<u64, TokenRow>,
    workers: BTreeMap<u64, WorkerRow>,
    tasks: BTreeMap<u64, TaskRow>,
}

struct AccountRow {
    id: u64,
    username: String,
    salt: String,
    auth_hash: String,
    public_key: String,
    wrapped_private_key: String,
}

struct ItemRow {
    id: u64,
    user_id: u64,
    key_cipher: String,
    meta_cipher: String,
    tags: Vec<EncryptedTagRecord>,
}

struct TokenRow {
    id: u64,
    user_id: u64,
    title: String,
    secret: String,
}

struct WorkerRow {
    id: u64,
    user_id: u64,
    token_id: u64,
    title: String,
    online: bool,
    wrapped_public_key: Option<String>,
    /// Bumped per connection so a stale connection's drop cannot knock a
    /// newer connection's presence offline.
    conn_epoch: u64,
    ping_tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
}

struct TaskRow {
    id: u64,
    user_id: u64,
    worker_id: u64,
    url_for_worker: String,
    url_for_user: String,
    status: TaskStatus,
}

impl Inner {
    fn alloc_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn token_by_secret(&self, secret: &str) -> CbxResult<&TokenRow> {
        self.tokens
            .values()
            .find(|t| t.secret == secret)
            .ok_or(CbxError::Unauthorized)
    }

    fn worker_by_token(&self, token_id: u64) -> CbxResult<&WorkerRow> {
        self.workers
            .values()
            .find(|w| w.token_id == token_id)
            .ok_or_else(|| CbxError::NotFound("worker not registered for token".into()))
    }

    fn item(&self, user_id: u64, item_id: u64) -> CbxResult<&ItemRow> {
        let row = self
            .items
            .get(&item_id)
            .ok_or_else(|| CbxError::NotFound(format!("item {item_id}")))?;
        if row.user_id != user_id {
            return Err(CbxError::Unauthorized);
        }
        Ok(row)
    }

    fn item_mut(&mut self, user_id: u64, item_id: u64) -> CbxResult<&mut ItemRow> {
        let row = self
            .items
            .get_mut(&item_id)
            .ok_or_else(|| CbxError::NotFound(format!("item {item_id}")))?;
        if row.user_id != user_id {
            return Err(CbxError::Unauthorized);
        }
        Ok(row)
    }

    fn worker_record(row: &WorkerRow) -> EncryptedWorkerRecord {
        EncryptedWorkerRecord {
            id: row.id,
            title: row.title.clone(),
            online: row.online,
            wrapped_public_key: row.wrapped_public_key.clone(),
        }
    }

    fn item_record(row: &ItemRow) -> EncryptedItemRecord {
        EncryptedItemRecord {
            id: row.id,
            key_cipher: row.key_cipher.clone(),
            meta_cipher: row.meta_cipher.clone(),
            tags: row.tags.clone(),
        }
    }

    fn task_record(row: &TaskRow, for_worker: bool, worker_title: String) -> EncryptedTaskRecord {
        EncryptedTaskRecord {
            id: row.id,
            worker_id: row.worker_id,
            worker_title,
            url_cipher: if for_worker {
                row.url_for_worker.clone()
            } else {
                row.url_for_user.clone()
            },
            status: row.status,
        }
    }

    fn worker_title(&self, worker_id: u64) -> String {
        self.workers
            .get(&worker_id)
            .map(|w| w.title.clone())
            .unwrap_or_default()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned lock only means a panic elsewhere; the tables are fine.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn create_account(&self, record: NewAccountRecord) -> CbxResult<u64> {
        let mut inner = self.lock();
        if inner.accounts.values().any(|a| a.username == record.username) {
            return Err(CbxError::Transport(format!(
                "username {} already registered",
                record.username
            )));
        }
        let id = inner.alloc_id();
        inner.accounts.insert(
            id,
            AccountRow {
                id,
                username: record.username,
                salt: record.salt,
                auth_hash: record.auth_hash,
                public_key: record.public_key,
                wrapped_private_key: record.wrapped_private_key,
            },
        );
        Ok(id)
    }

    async fn lookup_salt(&self, username: &str) -> CbxResult<String> {
        let inner = self.lock();
        inner
            .accounts
            .values()
            .find(|a| a.username == username)
            .map(|a| a.salt.clone())
            .ok_or_else(|| CbxError::NotFound(format!("user {username}")))
    }

    async fn verify_login(&self, username: &str, auth_hash: &str) -> CbxResult<AccountRecord> {
        let inner = self.lock();
        // Wrong username and wrong hash are indistinguishable to the caller.
        inner
            .accounts
            .values()
            .find(|a| a.username == username && a.auth_hash == auth_hash)
            .map(|a| AccountRecord {
                id: a.id,
                username: a.username.clone(),
                public_key: a.public_key.clone(),
                wrapped_private_key: a.wrapped_private_key.clone(),
            })
            .ok_or(CbxError::Unauthorized)
    }

    async fn create_item(&self, user_id: u64, record: NewItemRecord) -> CbxResult<u64> {
        let mut inner = self.lock();
        let id = inner.alloc_id();
        let tags = record
            .tag_ciphers
            .into_iter()
            .map(|tag_cipher| {
                let tag_id = inner.alloc_id();
                EncryptedTagRecord {
                    id: tag_id,
                    tag_cipher,
                }
            })
            .collect();
        inner.items.insert(
            id,
            ItemRow {
                id,
                user_id,
                key_cipher: record.key_cipher,
                meta_cipher: record.meta_cipher,
                tags,
            },
        );
        Ok(id)
    }

    async fn get_item(&self, user_id: u64, item_id: u64) -> CbxResult<EncryptedItemRecord> {
        let inner = self.lock();
        inner.item(user_id, item_id).map(Inner::item_record)
    }

    async fn list_items(&self, user_id: u64, offset: u64, limit: u64) -> CbxResult<ItemPage> {
        let inner = self.lock();
        let owned: Vec<&ItemRow> = inner
            .items
            .values()
            .filter(|i| i.user_id == user_id)
            .collect();
        let total = owned.len() as u64;
        let items = owned
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|row| Inner::item_record(row))
            .collect();
        Ok(ItemPage { total, items })
    }

    async fn items_total(&self, user_id: u64) -> CbxResult<u64> {
        let inner = self.lock();
        Ok(inner.items.values().filter(|i| i.user_id == user_id).count() as u64)
    }

    async fn delete_item(&self, user_id: u64, item_id: u64) -> CbxResult<()> {
        let mut inner = self.lock();
        inner.item(user_id, item_id)?;
        inner.items.remove(&item_id);
        inner.files.retain(|(id, _), _| *id != item_id);
        Ok(())
    }

    async fn update_item_meta(
        &self,
        user_id: u64,
        item_id: u64,
        meta_cipher: String,
    ) -> CbxResult<()> {
        let mut inner = self.lock();
        inner.item_mut(user_id, item_id)?.meta_cipher = meta_cipher;
        Ok(())
    }

    async fn add_tag(&self, user_id: u64, item_id: u64, tag_cipher: String) -> CbxResult<u64> {
        let mut inner = self.lock();
        inner.item(user_id, item_id)?;
        let tag_id = inner.alloc_id();
        inner
            .items
            .get_mut(&item_id)
            .expect("checked above")
            .tags
            .push(EncryptedTagRecord {
                id: tag_id,
                tag_cipher,
            });
        Ok(tag_id)
    }

    async fn delete_tag(&self, user_id: u64, item_id: u64, tag_id: u64) -> CbxResult<()> {
        let mut inner = self.lock();
        let row = inner.item_mut(user_id, item_id)?;
        let before = row.tags.len();
        row.tags.retain(|t| t.id != tag_id);
        if row.tags.len() == before {
            return Err(CbxError::NotFound(format!("tag {tag_id}")));
        }
        Ok(())
    }

    async fn put_file(
        &self,
        user_id: u64,
        item_id: u64,
        mapped_name: &str,
        data: Vec<u8>,
    ) -> CbxResult<()> {
        let mut inner = self.lock();
        inner.item(user_id, item_id)?;
        inner.files.insert((item_id, mapped_name.to_string()), data);
        Ok(())
    }

    async fn list_files(&self, user_id: u64, item_id: u64) -> CbxResult<Vec<String>> {
        let inner = self.lock();
        inner.item(user_id, item_id)?;
        Ok(inner
            .files
            .keys()
            .filter(|(id, _)| *id == item_id)
            .map(|(_, name)| name.clone())
            .collect())
    }

    async fn get_file(&self, user_id: u64, item_id: u64, mapped_name: &str) -> CbxResult<Vec<u8>> {
        let inner = self.lock();
        inner.item(user_id, item_id)?;
        inner
            .files
            .get(&(item_id, mapped_name.to_string()))
            .cloned()
            .ok_or_else(|| CbxError::NotFound(format!("file {mapped_name}")))
    }

    async fn delete_file(&self, user_id: u64, item_id: u64, mapped_name: &str) -> CbxResult<()> {
        let mut inner = self.lock();
        inner.item(user_id, item_id)?;
        inner
            .files
            .remove(&(item_id, mapped_name.to_string()))
            .map(|_| ())
            .ok_or_else(|| CbxError::NotFound(format!("file {mapped_name}")))
    }

    async fn create_token(&self, user_id: u64, title: &str) -> CbxResult<TokenCreated> {
        let mut inner = self.lock();
        let id = inner.alloc_id();
        let secret = {
            use base64::Engine;
            use rand::RngCore;
            let mut raw = [0u8; 24];
            rand::thread_rng().fill_bytes(&mut raw);
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(raw)
        };
        inner.tokens.insert(
            id,
            TokenRow {
                id,
                user_id,
                title: title.to_string(),
                secret: secret.clone(),
            },
        );
        Ok(TokenCreated {
            id,
            title: title.to_string(),
            token: secret,
        })
    }

    async fn list_tokens(&self, user_id: u64) -> CbxResult<Vec<TokenRecord>> {
        let inner = self.lock();
        Ok(inner
            .tokens
            .values()
            .filter(|t| t.user_id == user_id)
            .map(|t| TokenRecord {
                id: t.id,
                title: t.title.clone(),
            })
            .collect())
    }

    async fn delete_token(&self, user_id: u64, token_id: u64) -> CbxResult<()> {
        let mut inner = self.lock();
        match inner.tokens.get(&token_id) {
            None => return Err(CbxError::NotFound(format!("token {token_id}"))),
            Some(t) if t.user_id != user_id => return Err(CbxError::Unauthorized),
            Some(_) => {}
        }
        inner.tokens.remove(&token_id);
        Ok(())
    }

    async fn list_workers(&self, user_id: u64) -> CbxResult<Vec<EncryptedWorkerRecord>> {
        let inner = self.lock();
        Ok(inner
            .workers
            .values()
            .filter(|w| w.user_id == user_id)
            .map(Inner::worker_record)
            .collect())
    }

    async fn delete_worker(&self, user_id: u64, worker_id: u64) -> CbxResult<()> {
        let mut inner = self.lock();
        match inner.workers.get(&worker_id) {
            None => return Err(CbxError::NotFound(format!("worker {worker_id}"))),
            Some(w) if w.user_id != user_id => return Err(CbxError::Unauthorized),
            Some(_) => {}
        }
        inner.workers.remove(&worker_id);
        Ok(())
    }

    async fn add_task(&self, user_id: u64, record: NewTaskRecord) -> CbxResult<u64> {
        let mut inner = self.lock();
        match inner.workers.get(&record.worker_id) {
            None => return Err(CbxError::NotFound(format!("worker {}", record.worker_id))),
            Some(w) if w.user_id != user_id => return Err(CbxError::Unauthorized),
            Some(_) => {}
        }
        let id = inner.alloc_id();
        inner.tasks.insert(
            id,
            TaskRow {
                id,
                user_id,
                worker_id: record.worker_id,
                url_for_worker: record.url_for_worker,
                url_for_user: record.url_for_user,
                status: TaskStatus::Suspended,
            },
        );
        // Nudge the worker if it has a live channel; payload is opaque.
        if let Some(w) = inner.workers.get(&record.worker_id) {
            if let Some(tx) = &w.ping_tx {
                let _ = tx.send(b"ping".to_vec());
            }
        }
        debug!(task_id = id, worker_id = record.worker_id, "task queued");
        Ok(id)
    }

    async fn get_task(&self, user_id: u64, task_id: u64) -> CbxResult<EncryptedTaskRecord> {
        let inner = self.lock();
        let row = inner
            .tasks
            .get(&task_id)
            .ok_or_else(|| CbxError::NotFound(format!("task {task_id}")))?;
        if row.user_id != user_id {
            return Err(CbxError::Unauthorized);
        }
        Ok(Inner::task_record(row, false, inner.worker_title(row.worker_id)))
    }

    async fn list_tasks(&self, user_id: u64) -> CbxResult<Vec<EncryptedTaskRecord>> {
        let inner = self.lock();
        Ok(inner
            .tasks
            .values()
            .filter(|t| t.user_id == user_id)
            .map(|row| Inner::task_record(row, false, inner.worker_title(row.worker_id)))
            .collect())
    }

    async fn delete_task(&self, user_id: u64, task_id: u64) -> CbxResult<()> {
        let mut inner = self.lock();
        match inner.tasks.get(&task_id) {
            None => return Err(CbxError::NotFound(format!("task {task_id}"))),
            Some(t) if t.user_id != user_id => return Err(CbxError::Unauthorized),
            Some(_) => {}
        }
        inner.tasks.remove(&task_id);
        Ok(())
    }

    async fn register_worker(&self, token: &str, title: &str) -> CbxResult<u64> {
        let mut inner = self.lock();
        let (token_id, user_id) = {
            let t = inner.token_by_secret(token)?;
            (t.id, t.user_id)
        };
        let id = inner.alloc_id();
        inner.workers.insert(
            id,
            WorkerRow {
                id,
                user_id,
                token_id,
                title: title.to_string(),
                online: false,
                wrapped_public_key: None,
                conn_epoch: 0,
                ping_tx: None,
            },
        );
        Ok(id)
    }

    async fn owner_public_key(&self, token: &str) -> CbxResult<String> {
        let inner = self.lock();
        let user_id = inner.token_by_secret(token)?.user_id;
        inner
            .accounts
            .get(&user_id)
            .map(|a| a.public_key.clone())
            .ok_or_else(|| CbxError::NotFound("token owner".into()))
    }

    async fn claim_task(&self, token: &str) -> CbxResult<Option<EncryptedTaskRecord>> {
        // Single lock scope: select + flip to RUNNING is one atomic step.
        let mut inner = self.lock();
        let worker_id = {
            let token_id = inner.token_by_secret(token)?.id;
            inner.worker_by_token(token_id)?.id
        };
        let candidate = inner
            .tasks
            .values()
            .find(|t| t.worker_id == worker_id && t.status == TaskStatus::Suspended)
            .map(|t| t.id);
        let Some(task_id) = candidate else {
            return Ok(None);
        };
        let title = inner.worker_title(worker_id);
        let row = inner.tasks.get_mut(&task_id).expect("selected above");
        row.status = TaskStatus::Running;
        debug!(task_id, worker_id, "task claimed");
        Ok(Some(Inner::task_record(row, true, title)))
    }

    async fn set_task_status(
        &self,
        token: &str,
        task_id: u64,
        status: TaskStatus,
    ) -> CbxResult<()> {
        let mut inner = self.lock();
        inner.token_by_secret(token)?;
        if !status.is_terminal() {
            return Err(CbxError::InvalidTransition(format!(
                "workers may only report terminal states, not {status:?}"
            )));
        }
        let row = inner
            .tasks
            .get_mut(&task_id)
            .ok_or_else(|| CbxError::NotFound(format!("task {task_id}")))?;
        if row.status != TaskStatus::Running {
            return Err(CbxError::InvalidTransition(format!(
                "task {task_id} is {:?}, not RUNNING",
                row.status
            )));
        }
        row.status = status;
        Ok(())
    }

    async fn worker_create_item(&self, token: &str, record: NewItemRecord) -> CbxResult<u64> {
        let user_id = self.lock().token_by_secret(token)?.user_id;
        self.create_item(user_id, record).await
    }

    async fn worker_put_file(
        &self,
        token: &str,
        item_id: u64,
        mapped_name: &str,
        data: Vec<u8>,
    ) -> CbxResult<()> {
        let user_id = self.lock().token_by_secret(token)?.user_id;
        self.put_file(user_id, item_id, mapped_name, data).await
    }
}

// ── Notification transport ────────────────────────────────────────────────

/// Flips the worker offline when the connection is dropped, on any exit path.
struct PresenceGuard {
    inner: Arc<Mutex<Inner>>,
    worker_id: u64,
    epoch: u64,
}

impl Drop for PresenceGuard {
    fn drop(&mut self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(w) = inner.workers.get_mut(&self.worker_id) {
            if w.conn_epoch == self.epoch {
                w.online = false;
                w.wrapped_public_key = None;
                w.ping_tx = None;
                debug!(worker_id = self.worker_id, "worker offline");
            }
        }
    }
}

pub struct MemoryConnection {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    _guard: PresenceGuard,
}

#[async_trait]
impl NotifyConnection for MemoryConnection {
    async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }
}

#[async_trait]
impl NotifyTransport for MemoryStore {
    async fn connect(&self, handshake: ChannelHandshake) -> CbxResult<Box<dyn NotifyConnection>> {
        let mut inner = self.lock();
        let worker_id = {
            let token_id = inner.token_by_secret(&handshake.token)?.id;
            inner.worker_by_token(token_id)?.id
        };
        let (tx, rx) = mpsc::unbounded_channel();
        // Ack first so the client's wait-for-first-message completes.
        let _ = tx.send(b"ok".to_vec());
        let w = inner.workers.get_mut(&worker_id).expect("resolved above");
        w.conn_epoch += 1;
        w.online = true;
        w.wrapped_public_key = Some(handshake.wrapped_public_key);
        w.ping_tx = Some(tx);
        let epoch = w.conn_epoch;
        debug!(worker_id, "worker online");
        Ok(Box::new(MemoryConnection {
            rx,
            _guard: PresenceGuard {
                inner: Arc::clone(&self.inner),
                worker_id,
                epoch,
            },
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> (MemoryStore, u64, String) {
        let store = MemoryStore::new();
        let user_id = store
            .create_account(NewAccountRecord {
                username: "alice".into(),
                salt: "s".into(),
                auth_hash: "h".into(),
                public_key: "PUB".into(),
                wrapped_private_key: "WRAPPED".into(),
            })
            .await
            .unwrap();
        let token = store.create_token(user_id, "worker-token").await.unwrap();
        (store, user_id, token.token)
    }

    #[tokio::test]
    async fn test_login_mismatch_is_unauthorized() {
        let (store, _, _) = seeded().await;
        let err = store.verify_login("alice", "wrong").await.unwrap_err();
        assert!(matches!(err, CbxError::Unauthorized));
        let err = store.verify_login("nobody", "h").await.unwrap_err();
        assert!(matches!(err, CbxError::Unauthorized));
    }

    #[tokio::test]
    async fn test_owner_check_on_items() {
        let (store, user_id, _) = seeded().await;
        let other = store
            .create_account(NewAccountRecord {
                username: "mallory".into(),
                salt: "s".into(),
                auth_hash: "h".into(),
                public_key: "PUB".into(),
                wrapped_private_key: "W".into(),
            })
            .await
            .unwrap();
        let item_id = store
            .create_item(
                user_id,
                NewItemRecord {
                    key_cipher: "k".into(),
                    meta_cipher: "m".into(),
                    tag_ciphers: vec![],
                },
            )
            .await
            .unwrap();
        let err = store.get_item(other, item_id).await.unwrap_err();
        assert!(matches!(err, CbxError::Unauthorized));
    }

    #[tokio::test]
    async fn test_concurrent_claims_single_winner() {
        let (store, user_id, token) = seeded().await;
        let worker_id = store.register_worker(&token, "w").await.unwrap();
        store
            .add_task(
                user_id,
                NewTaskRecord {
                    worker_id,
                    url_for_worker: "cw".into(),
                    url_for_user: "cu".into(),
                },
            )
            .await
            .unwrap();

        let (a, b) = tokio::join!(store.claim_task(&token), store.claim_task(&token));
        let got = [a.unwrap(), b.unwrap()];
        assert_eq!(
            got.iter().filter(|r| r.is_some()).count(),
            1,
            "exactly one concurrent poller may receive the task"
        );
    }

    #[tokio::test]
    async fn test_status_update_requires_running() {
        let (store, user_id, token) = seeded().await;
        let worker_id = store.register_worker(&token, "w").await.unwrap();
        let task_id = store
            .add_task(
                user_id,
                NewTaskRecord {
                    worker_id,
                    url_for_worker: "cw".into(),
                    url_for_user: "cu".into(),
                },
            )
            .await
            .unwrap();

        // SUSPENDED → SUCCESS is not a worker-reportable transition
        let err = store
            .set_task_status(&token, task_id, TaskStatus::Success)
            .await
            .unwrap_err();
        assert!(matches!(err, CbxError::InvalidTransition(_)));

        store.claim_task(&token).await.unwrap().unwrap();
        store
            .set_task_status(&token, task_id, TaskStatus::Success)
            .await
            .unwrap();

        // SUCCESS is final
        let err = store
            .set_task_status(&token, task_id, TaskStatus::Failed)
            .await
            .unwrap_err();
        assert!(matches!(err, CbxError::InvalidTransition(_)));
    }
}
