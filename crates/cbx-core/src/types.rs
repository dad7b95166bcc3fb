//! Wire records exchanged with the remote store.
//!
//! Every payload field here is ciphertext (base64 text produced by the
//! envelope layers in cbx-crypto); plaintext metadata, tags, filenames and
//! URLs exist only transiently in client memory. The server assigns all ids.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a delegated task.
///
/// Transitions: `Suspended --claim--> Running --report--> Success | Failed`,
/// and `Failed --retry--> Suspended` under a fresh id. `Success` is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Queued, waiting for the destination worker to claim it.
    Suspended,
    /// Claimed by the worker. There is no lease timeout: a worker that never
    /// reports leaves the task here until the owner deletes or retries it.
    Running,
    Success,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failed)
    }
}

// ── Accounts ──────────────────────────────────────────────────────────────

/// Registration payload. Carries the double-hashed auth credential and the
/// wrapped private key; the password and the single-hash kek never appear.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAccountRecord {
    pub username: String,
    /// Per-account random nonce, generated once and never rotated (base64).
    pub salt: String,
    /// `B64(SHA-256(kek ‖ salt))` where `kek = B64(SHA-256(password ‖ salt))`.
    pub auth_hash: String,
    /// Owner RSA public key, SPKI PEM.
    pub public_key: String,
    /// Owner RSA private key, wrapped under the kek by the symmetric envelope.
    pub wrapped_private_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRecord {
    pub id: u64,
    pub username: String,
    pub public_key: String,
    pub wrapped_private_key: String,
}

// ── Items ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewItemRecord {
    /// Item key wrapped under the owner's public key.
    pub key_cipher: String,
    /// JSON meta encrypted under the item key.
    pub meta_cipher: String,
    pub tag_ciphers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedTagRecord {
    pub id: u64,
    pub tag_cipher: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedItemRecord {
    pub id: u64,
    pub key_cipher: String,
    pub meta_cipher: String,
    pub tags: Vec<EncryptedTagRecord>,
}

/// One page of a paginated item listing, in server order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemPage {
    pub total: u64,
    pub items: Vec<EncryptedItemRecord>,
}

// ── Tasks ─────────────────────────────────────────────────────────────────

/// Task creation payload. The URL is encrypted twice so that both the
/// requesting user and the destination worker can read it without the server
/// ever holding a key that decrypts either copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTaskRecord {
    pub worker_id: u64,
    pub url_for_worker: String,
    pub url_for_user: String,
}

/// A task as seen by one audience: `url_cipher` is the copy encrypted for
/// whoever fetched the record (owner listing vs. worker claim).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedTaskRecord {
    pub id: u64,
    pub worker_id: u64,
    pub worker_title: String,
    pub url_cipher: String,
    pub status: TaskStatus,
}

// ── Workers ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedWorkerRecord {
    pub id: u64,
    pub title: String,
    pub online: bool,
    /// Worker public key wrapped under the owner's public key; present only
    /// while a live notification channel exists for this worker.
    pub wrapped_public_key: Option<String>,
}

/// Decrypted view of a worker. Online and offline workers carry different
/// data, so this is a closed sum rather than a record with optional fields:
/// a public key is available exactly when the worker is connected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WorkerInfo {
    Offline {
        id: u64,
        title: String,
    },
    Online {
        id: u64,
        title: String,
        public_key: String,
    },
}

impl WorkerInfo {
    pub fn id(&self) -> u64 {
        match self {
            WorkerInfo::Offline { id, .. } => *id,
            WorkerInfo::Online { id, .. } => *id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            WorkerInfo::Offline { title, .. } => title,
            WorkerInfo::Online { title, .. } => title,
        }
    }

    pub fn is_online(&self) -> bool {
        matches!(self, WorkerInfo::Online { .. })
    }
}

// ── API tokens ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    pub id: u64,
    pub title: String,
}

/// Returned once at creation; the secret is not retrievable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenCreated {
    pub id: u64,
    pub title: String,
    pub token: String,
}

// ── Notification channel ──────────────────────────────────────────────────

/// First client→server message on a worker notification channel. The worker's
/// public key is wrapped under the owner's public key so the server can relay
/// the worker↔owner association without being able to read it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelHandshake {
    pub token: String,
    pub wrapped_public_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_status_terminal() {
        assert!(!TaskStatus::Suspended.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Success.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
    }

    #[test]
    fn test_task_status_wire_format() {
        let json = serde_json::to_string(&TaskStatus::Suspended).unwrap();
        assert_eq!(json, "\"SUSPENDED\"");
        let back: TaskStatus = serde_json::from_str("\"FAILED\"").unwrap();
        assert_eq!(back, TaskStatus::Failed);
    }

    #[test]
    fn test_worker_info_accessors() {
        let off = WorkerInfo::Offline {
            id: 3,
            title: "fetcher".into(),
        };
        assert_eq!(off.id(), 3);
        assert_eq!(off.title(), "fetcher");
        assert!(!off.is_online());

        let on = WorkerInfo::Online {
            id: 4,
            title: "fetcher".into(),
            public_key: "PEM".into(),
        };
        assert!(on.is_online());
    }
}
