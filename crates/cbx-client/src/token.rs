//! API token management. Tokens are opaque bearer credentials a user mints
//! for workers; the server stores only a lookup handle plus a title.

use std::sync::Arc;

use cbx_core::types::{TokenCreated, TokenRecord};
use cbx_core::CbxResult;

use crate::account::Session;
use crate::store::RemoteStore;

pub struct TokenClient {
    store: Arc<dyn RemoteStore>,
}

impl TokenClient {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    /// Mint a token. The secret is only returned here; list operations
    /// expose the title and id but never the secret again.
    pub async fn create_token(&self, session: &Session, title: &str) -> CbxResult<TokenCreated> {
        self.store.create_token(session.user_id, title).await
    }

    pub async fn list_tokens(&self, session: &Session) -> CbxResult<Vec<TokenRecord>> {
        self.store.list_tokens(session.user_id).await
    }

    pub async fn delete_token(&self, session: &Session, token_id: u64) -> CbxResult<()> {
        self.store.delete_token(session.user_id, token_id).await
    }
}
