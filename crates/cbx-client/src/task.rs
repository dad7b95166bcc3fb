//! Owner-side task distribution: queue work for a worker, inspect progress,
//! retry failures.
//!
//! The sensitive payload (the URL) is encrypted twice at creation — once for
//! the worker, once for the requesting user — so each party reads its own
//! copy and the server can read neither. Retry is not an in-place status
//! reset: it decrypts the user's copy, deletes the record, and mints a fresh
//! task id, so external systems correlating ids must not assume stability
//! across retries.

use std::sync::Arc;

use futures::future;
use tracing::info;

use cbx_core::types::{NewTaskRecord, TaskStatus, WorkerInfo};
use cbx_core::{CbxError, CbxResult};
use cbx_crypto::asym;

use crate::account::Session;
use crate::store::RemoteStore;

/// A task as the owner sees it, URL decrypted.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub id: u64,
    pub worker_id: u64,
    pub worker_title: String,
    pub url: String,
    pub status: TaskStatus,
}

#[derive(Clone)]
pub struct TaskClient {
    store: Arc<dyn RemoteStore>,
}

impl TaskClient {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    /// List this account's workers, decrypting the wrapped public key of
    /// each online one.
    pub async fn query_workers(&self, session: &Session) -> CbxResult<Vec<WorkerInfo>> {
        let records = self.store.list_workers(session.user_id).await?;
        records
            .into_iter()
            .map(|r| match (r.online, r.wrapped_public_key) {
                (true, Some(wrapped)) => Ok(WorkerInfo::Online {
                    id: r.id,
                    title: r.title,
                    public_key: asym::decrypt_wrapped(&wrapped, session.private_key())?,
                }),
                _ => Ok(WorkerInfo::Offline {
                    id: r.id,
                    title: r.title,
                }),
            })
            .collect()
    }

    pub async fn delete_worker(&self, session: &Session, worker_id: u64) -> CbxResult<()> {
        self.store.delete_worker(session.user_id, worker_id).await
    }

    /// Queue a URL for a worker. Requires the worker's public key, which is
    /// only known while the worker is online (see [`Self::query_workers`]).
    pub async fn add_task(
        &self,
        session: &Session,
        url: &str,
        worker_id: u64,
        worker_public_key: &str,
    ) -> CbxResult<u64> {
        let record = NewTaskRecord {
            worker_id,
            url_for_worker: asym::encrypt_wrapped(url, worker_public_key)?,
            url_for_user: asym::encrypt_wrapped(url, &session.public_key)?,
        };
        let id = self.store.add_task(session.user_id, record).await?;
        info!(task_id = id, worker_id, "task added");
        Ok(id)
    }

    /// All of this account's tasks, URLs decrypted concurrently; output
    /// order preserves server order.
    pub async fn query_tasks(&self, session: &Session) -> CbxResult<Vec<TaskInfo>> {
        let records = self.store.list_tasks(session.user_id).await?;
        future::try_join_all(records.into_iter().map(|r| async move {
            Ok(TaskInfo {
                id: r.id,
                worker_id: r.worker_id,
                worker_title: r.worker_title,
                url: asym::decrypt_wrapped(&r.url_cipher, session.private_key())?,
                status: r.status,
            })
        }))
        .await
    }

    pub async fn delete_task(&self, session: &Session, task_id: u64) -> CbxResult<()> {
        self.store.delete_task(session.user_id, task_id).await
    }

    /// Retry a FAILED task: recover the URL from the user's copy, resolve
    /// the worker's current public key, delete the old record, and create a
    /// fresh one (new id, SUSPENDED).
    pub async fn retry_task(&self, session: &Session, task_id: u64) -> CbxResult<u64> {
        let record = self.store.get_task(session.user_id, task_id).await?;
        if record.status != TaskStatus::Failed {
            return Err(CbxError::InvalidTransition(format!(
                "retry requires FAILED, task {task_id} is {:?}",
                record.status
            )));
        }
        let url = asym::decrypt_wrapped(&record.url_cipher, session.private_key())?;

        let workers = self.query_workers(session).await?;
        let public_key = workers
            .iter()
            .find_map(|w| match w {
                WorkerInfo::Online { id, public_key, .. } if *id == record.worker_id => {
                    Some(public_key.clone())
                }
                _ => None,
            })
            .ok_or_else(|| {
                CbxError::NotFound(format!(
                    "worker {} is not online; its public key is unavailable",
                    record.worker_id
                ))
            })?;

        self.store.delete_task(session.user_id, task_id).await?;
        let new_id = self
            .add_task(session, &url, record.worker_id, &public_key)
            .await?;
        info!(old_task_id = task_id, new_task_id = new_id, "task retried");
        Ok(new_id)
    }
}
