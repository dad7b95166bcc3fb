//! `CbxClient` bundles the owner-side capability clients over one shared
//! store handle. Construction is explicit: the caller supplies the
//! `RemoteStore` implementation (HTTP in production, `MemoryStore` in
//! tests) and reaches each capability as a field.

use std::sync::Arc;

use crate::account::AccountClient;
use crate::file::FileClient;
use crate::item::ItemClient;
use crate::store::RemoteStore;
use crate::task::TaskClient;
use crate::token::TokenClient;

pub struct CbxClient {
    pub account: AccountClient,
    pub items: ItemClient,
    pub files: FileClient,
    pub tasks: TaskClient,
    pub tokens: TokenClient,
}

impl CbxClient {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            account: AccountClient::new(store.clone()),
            items: ItemClient::new(store.clone()),
            files: FileClient::new(store.clone()),
            tasks: TaskClient::new(store.clone()),
            tokens: TokenClient::new(store),
        }
    }
}
