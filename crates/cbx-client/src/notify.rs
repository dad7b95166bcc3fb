//! Worker notification channel.
//!
//! A worker holds a long-lived channel open while it is willing to accept
//! tasks; the channel's lifetime IS the worker's presence. The registration
//! handshake carries the worker's public key wrapped under the owner's
//! public key, so the owner can correlate "this connection belongs to worker
//! X" without the server learning the key.
//!
//! Connect sequence: open transport → send handshake → wait for the server's
//! first message (the ack; this wait has no timeout by contract) → forward
//! every later message as an opaque "something changed" ping.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use cbx_core::types::ChannelHandshake;
use cbx_core::{CbxError, CbxResult};
use cbx_crypto::asym;

use crate::store::NotifyTransport;

pub struct WorkerChannel {
    forward: JoinHandle<()>,
}

impl WorkerChannel {
    /// Open a presence channel for a registered worker.
    ///
    /// Pings (payload ignored) are forwarded to `notify_tx`. The connection
    /// is released on every exit path: a handshake that never gets its ack
    /// drops the transport connection before returning the error.
    pub async fn connect(
        transport: &dyn NotifyTransport,
        token: &str,
        worker_public_key: &str,
        user_public_key: &str,
        notify_tx: mpsc::UnboundedSender<()>,
    ) -> CbxResult<WorkerChannel> {
        let handshake = ChannelHandshake {
            token: token.to_string(),
            wrapped_public_key: asym::encrypt_wrapped(worker_public_key, user_public_key)?,
        };
        let mut conn = transport.connect(handshake).await?;

        // Registration is complete only once the server has spoken.
        if conn.recv().await.is_none() {
            // conn drops here, releasing the transport resource
            return Err(CbxError::Transport(
                "notification channel closed before acknowledging registration".into(),
            ));
        }
        debug!("notification channel established");

        let forward = tokio::spawn(async move {
            while conn.recv().await.is_some() {
                if notify_tx.send(()).is_err() {
                    break;
                }
            }
            debug!("notification channel closed");
        });
        Ok(WorkerChannel { forward })
    }

    /// Close the channel, dropping the transport connection. Presence flips
    /// offline within the transport's disconnect-detection latency.
    pub fn close(self) {
        self.forward.abort();
    }
}

impl Drop for WorkerChannel {
    fn drop(&mut self) {
        self.forward.abort();
    }
}
