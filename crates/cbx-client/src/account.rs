//! Account registration, login, and the authenticated session.

use std::sync::Arc;

use secrecy::SecretString;
use tracing::info;
use zeroize::Zeroize;

use cbx_core::CbxResult;
use cbx_crypto::custody;

use crate::store::RemoteStore;

/// An authenticated session holding the unlocked private key.
#[derive(Clone)]
pub struct Session {
    pub user_id: u64,
    pub username: String,
    pub public_key: String,
    private_key: String,
}

impl Session {
    pub fn private_key(&self) -> &str {
        &self.private_key
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.private_key.zeroize();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

#[derive(Clone)]
pub struct AccountClient {
    store: Arc<dyn RemoteStore>,
}

impl AccountClient {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    /// Register a new account: fresh salt and key pair, auth hash and
    /// wrapped private key submitted; the password and kek never leave this
    /// process.
    pub async fn register(&self, username: &str, password: &SecretString) -> CbxResult<Session> {
        let (record, pair) = custody::register_credentials(username, password)?;
        let user_id = self.store.create_account(record).await?;
        info!(user_id, username, "account registered");
        Ok(Session {
            user_id,
            username: username.to_string(),
            public_key: pair.public_key.clone(),
            private_key: pair.private_key.clone(),
        })
    }

    /// Log in: fetch the salt, recompute the hash chain, verify, and unlock
    /// the stored private key.
    pub async fn login(&self, username: &str, password: &SecretString) -> CbxResult<Session> {
        let salt = self.store.lookup_salt(username).await?;
        let auth_hash = custody::login_hash(password, &salt);
        let account = self.store.verify_login(username, &auth_hash).await?;
        let private_key =
            custody::unlock_private_key(&account.wrapped_private_key, password, &salt)?;
        info!(user_id = account.id, username, "logged in");
        Ok(Session {
            user_id: account.id,
            username: account.username,
            public_key: account.public_key,
            private_key,
        })
    }
}
