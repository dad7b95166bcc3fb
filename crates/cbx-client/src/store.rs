//! The storage boundary: opaque create/get/list/delete operations keyed by
//! numeric ids, carrying only wrapped (ciphertext) payload fields.
//!
//! The server behind this trait is assumed to enforce owner-only access
//! (`Unauthorized` on violation) and to provide one genuinely atomic
//! primitive: `claim_task`, which selects at most one SUSPENDED task for the
//! calling worker and flips it to RUNNING in the same operation. Everything
//! else is plain CRUD over ciphertext.

use async_trait::async_trait;

use cbx_core::types::{
    AccountRecord, ChannelHandshake, EncryptedItemRecord, EncryptedTaskRecord,
    EncryptedWorkerRecord, ItemPage, NewAccountRecord, NewItemRecord, NewTaskRecord,
    TaskStatus, TokenCreated, TokenRecord,
};
use cbx_core::CbxResult;

#[async_trait]
pub trait RemoteStore: Send + Sync {
    // ── Accounts ──────────────────────────────────────────────────────────

    async fn create_account(&self, record: NewAccountRecord) -> CbxResult<u64>;

    /// Salt lookup by username. Must exist as a separate call: login cannot
    /// hash the password before it knows the salt.
    async fn lookup_salt(&self, username: &str) -> CbxResult<String>;

    /// Verify the double-hashed credential. A mismatch is `Unauthorized`;
    /// the caller never learns whether salt or password was wrong.
    async fn verify_login(&self, username: &str, auth_hash: &str) -> CbxResult<AccountRecord>;

    // ── Items ─────────────────────────────────────────────────────────────

    async fn create_item(&self, user_id: u64, record: NewItemRecord) -> CbxResult<u64>;
    async fn get_item(&self, user_id: u64, item_id: u64) -> CbxResult<EncryptedItemRecord>;
    async fn list_items(&self, user_id: u64, offset: u64, limit: u64) -> CbxResult<ItemPage>;
    async fn items_total(&self, user_id: u64) -> CbxResult<u64>;
    async fn delete_item(&self, user_id: u64, item_id: u64) -> CbxResult<()>;
    async fn update_item_meta(
        &self,
        user_id: u64,
        item_id: u64,
        meta_cipher: String,
    ) -> CbxResult<()>;
    async fn add_tag(&self, user_id: u64, item_id: u64, tag_cipher: String) -> CbxResult<u64>;
    async fn delete_tag(&self, user_id: u64, item_id: u64, tag_id: u64) -> CbxResult<()>;

    // ── Files (keyed by encrypted name) ───────────────────────────────────

    async fn put_file(
        &self,
        user_id: u64,
        item_id: u64,
        mapped_name: &str,
        data: Vec<u8>,
    ) -> CbxResult<()>;
    async fn list_files(&self, user_id: u64, item_id: u64) -> CbxResult<Vec<String>>;
    async fn get_file(&self, user_id: u64, item_id: u64, mapped_name: &str) -> CbxResult<Vec<u8>>;
    async fn delete_file(&self, user_id: u64, item_id: u64, mapped_name: &str) -> CbxResult<()>;

    // ── API tokens ────────────────────────────────────────────────────────

    async fn create_token(&self, user_id: u64, title: &str) -> CbxResult<TokenCreated>;
    async fn list_tokens(&self, user_id: u64) -> CbxResult<Vec<TokenRecord>>;
    async fn delete_token(&self, user_id: u64, token_id: u64) -> CbxResult<()>;

    // ── Workers (owner side) ──────────────────────────────────────────────

    async fn list_workers(&self, user_id: u64) -> CbxResult<Vec<EncryptedWorkerRecord>>;
    async fn delete_worker(&self, user_id: u64, worker_id: u64) -> CbxResult<()>;

    // ── Tasks (owner side) ────────────────────────────────────────────────

    async fn add_task(&self, user_id: u64, record: NewTaskRecord) -> CbxResult<u64>;
    async fn get_task(&self, user_id: u64, task_id: u64) -> CbxResult<EncryptedTaskRecord>;
    async fn list_tasks(&self, user_id: u64) -> CbxResult<Vec<EncryptedTaskRecord>>;
    async fn delete_task(&self, user_id: u64, task_id: u64) -> CbxResult<()>;

    // ── Worker-authenticated surface (API token) ──────────────────────────

    async fn register_worker(&self, token: &str, title: &str) -> CbxResult<u64>;

    /// Public key of the account that owns the presented token; workers pull
    /// it to wrap item keys and bundle indexes for the owner.
    async fn owner_public_key(&self, token: &str) -> CbxResult<String>;

    /// Atomically claim at most one SUSPENDED task for this worker, flipping
    /// it to RUNNING. Two concurrent claims never both receive the same
    /// task. An empty queue is `Ok(None)`, not an error.
    async fn claim_task(&self, token: &str) -> CbxResult<Option<EncryptedTaskRecord>>;

    /// Report a terminal transition (`Success` or `Failed`) for a RUNNING
    /// task. Any other target or source state is `InvalidTransition`.
    async fn set_task_status(
        &self,
        token: &str,
        task_id: u64,
        status: TaskStatus,
    ) -> CbxResult<()>;

    /// Item creation on behalf of the token's owner (worker upload path).
    async fn worker_create_item(&self, token: &str, record: NewItemRecord) -> CbxResult<u64>;
    async fn worker_put_file(
        &self,
        token: &str,
        item_id: u64,
        mapped_name: &str,
        data: Vec<u8>,
    ) -> CbxResult<()>;
}

/// The notification-channel boundary. The first client→server message is the
/// registration handshake; everything after the server's ack is an opaque
/// "something changed" ping whose payload this crate ignores.
#[async_trait]
pub trait NotifyTransport: Send + Sync {
    async fn connect(&self, handshake: ChannelHandshake) -> CbxResult<Box<dyn NotifyConnection>>;
}

#[async_trait]
pub trait NotifyConnection: Send {
    /// Next server→client message; `None` once the channel is closed.
    async fn recv(&mut self) -> Option<Vec<u8>>;
}
