//! Live document accessor over registered CRDT bodies.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use folio_core::crdt::LiveBody;
use folio_core::{CanonicalNode, DocumentKey};
use tracing::debug;

use crate::collaborators::DocumentAccessor;
use crate::error::BoxError;

struct Registration {
    workspace_id: String,
    body: Arc<LiveBody>,
}

/// Serves the current content of live bodies registered by the transport.
#[derive(Default)]
pub struct LiveBodyAccessor {
    bodies: RwLock<HashMap<DocumentKey, Registration>>,
}

impl LiveBodyAccessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a body, or return the one already registered for the key.
    pub fn register(
        &self,
        key: DocumentKey,
        workspace_id: impl Into<String>,
        body: Arc<LiveBody>,
    ) -> Arc<LiveBody> {
        let mut bodies = self.bodies.write().unwrap_or_else(PoisonError::into_inner);
        let registration = bodies.entry(key).or_insert_with_key(|key| {
            debug!("Registering live body for {}", key);
            Registration {
                workspace_id: workspace_id.into(),
                body,
            }
        });
        registration.body.clone()
    }

    /// Stop serving a body. Returns it if it was registered.
    pub fn unregister(&self, key: &DocumentKey) -> Option<Arc<LiveBody>> {
        let mut bodies = self.bodies.write().unwrap_or_else(PoisonError::into_inner);
        bodies.remove(key).map(|registration| registration.body)
    }

    pub fn get(&self, key: &DocumentKey) -> Option<Arc<LiveBody>> {
        let bodies = self.bodies.read().unwrap_or_else(PoisonError::into_inner);
        bodies.get(key).map(|registration| registration.body.clone())
    }

    fn with_registration<T>(
        &self,
        key: &DocumentKey,
        f: impl FnOnce(&Registration) -> T,
    ) -> Result<T, BoxError> {
        let bodies = self.bodies.read().unwrap_or_else(PoisonError::into_inner);
        bodies
            .get(key)
            .map(f)
            .ok_or_else(|| format!("No live body registered for {}", key).into())
    }
}

#[async_trait]
impl DocumentAccessor for LiveBodyAccessor {
    async fn current_content(&self, key: &DocumentKey) -> Result<CanonicalNode, BoxError> {
        self.with_registration(key, |registration| registration.body.to_canonical())
    }

    async fn workspace_id(&self, key: &DocumentKey) -> Result<String, BoxError> {
        self.with_registration(key, |registration| registration.workspace_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_serves_registered_body() {
        let accessor = LiveBodyAccessor::new();
        let key = DocumentKey::new("page-1");
        let body = Arc::new(LiveBody::new());
        body.set_body("# Title\n\nHello world\n");
        accessor.register(key.clone(), "ws-1", body);

        let content = accessor.current_content(&key).await.unwrap();
        assert_eq!(content.node_type(), "doc");
        assert_eq!(content.children().len(), 2);
        assert_eq!(content.children()[0].node_type(), "heading");
        assert_eq!(accessor.workspace_id(&key).await.unwrap(), "ws-1");
    }

    #[tokio::test]
    async fn test_register_keeps_existing_body() {
        let accessor = LiveBodyAccessor::new();
        let key = DocumentKey::new("page-1");
        let first = Arc::new(LiveBody::new());
        first.set_body("first");

        accessor.register(key.clone(), "ws-1", first.clone());
        let kept = accessor.register(key.clone(), "ws-2", Arc::new(LiveBody::new()));

        assert!(Arc::ptr_eq(&first, &kept));
        assert_eq!(accessor.workspace_id(&key).await.unwrap(), "ws-1");
    }

    #[tokio::test]
    async fn test_missing_body_is_an_error() {
        let accessor = LiveBodyAccessor::new();
        let key = DocumentKey::new("page-1");
        assert!(accessor.current_content(&key).await.is_err());

        accessor.register(key.clone(), "ws-1", Arc::new(LiveBody::new()));
        assert!(accessor.unregister(&key).is_some());
        assert!(accessor.get(&key).is_none());
        assert!(accessor.workspace_id(&key).await.is_err());
    }
}
