//! ProxyService — shared state handed to every handler.
//!
//! Holds the backend client built once at startup, the streaming settings
//! and, when a metadata store is configured, the menu builder. Cloning is
//! cheap; nothing in here is mutated per request apart from the menu cache.

use crate::{
    models::object::{ObjectHandle, ObjectPath},
    services::{
        menu_service::MenuService,
        responder::StreamingResponder,
        store::{ObjectStore, StoreError, StoreResult},
    },
};
use std::sync::Arc;
use tokio::time::timeout;
use tracing::warn;

#[derive(Clone)]
pub struct ProxyService {
    pub store: Arc<dyn ObjectStore>,
    pub responder: StreamingResponder,
    pub menus: Option<MenuService>,
}

impl ProxyService {
    pub fn new(store: Arc<dyn ObjectStore>, responder: StreamingResponder) -> Self {
        Self {
            store,
            responder,
            menus: None,
        }
    }

    pub fn with_menus(mut self, menus: MenuService) -> Self {
        self.menus = Some(menus);
        self
    }

    /// Re-resolve on every request; existence and size are never cached.
    /// A probe that outlasts the backend timeout counts as not found.
    pub async fn resolve(&self, path: &ObjectPath) -> StoreResult<ObjectHandle> {
        let limit = self.responder.backend_timeout;
        match timeout(limit, self.store.resolve(path)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("metadata probe for {} timed out after {:?}", path, limit);
                Err(StoreError::NotFound(path.to_string()))
            }
        }
    }
}
