//! Snapshot materialization.
//!
//! Turns the current live state of a document into a stored [`Version`],
//! unless nothing changed since the last one.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use folio_core::{DocumentKey, Version, VersionMeta, VersionStore, content_hash};
use tracing::{debug, info, warn};

use crate::collaborators::{
    DocumentAccessor, EventPublisher, ProfileResolver, VersionAction, VersionEvent,
};
use crate::error::{HistoryError, HistoryResult};

/// Result of a materialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaterializeOutcome {
    /// A new version was stored
    Created(VersionMeta),
    /// The content hash matched the latest version; nothing was stored
    Unchanged,
}

/// Fetches, hashes, deduplicates and stores document snapshots.
pub struct SnapshotMaterializer {
    accessor: Arc<dyn DocumentAccessor>,
    store: Arc<dyn VersionStore>,
    publisher: Arc<dyn EventPublisher>,
    profiles: Arc<dyn ProfileResolver>,
    retention: Option<Duration>,
}

impl SnapshotMaterializer {
    pub fn new(
        accessor: Arc<dyn DocumentAccessor>,
        store: Arc<dyn VersionStore>,
        publisher: Arc<dyn EventPublisher>,
        profiles: Arc<dyn ProfileResolver>,
    ) -> Self {
        Self {
            accessor,
            store,
            publisher,
            profiles,
            retention: None,
        }
    }

    /// Set how long new versions are kept (`None` = forever).
    pub fn with_retention(mut self, retention: Option<Duration>) -> Self {
        self.retention = retention;
        self
    }

    pub fn store(&self) -> &Arc<dyn VersionStore> {
        &self.store
    }

    /// Snapshot a document, attributing the version to `actor_ids`.
    ///
    /// Event publishing is best effort: once the version is stored, a
    /// publishing failure is logged and the version still counts as created.
    pub async fn materialize(
        &self,
        key: &DocumentKey,
        actor_ids: &BTreeSet<String>,
    ) -> HistoryResult<MaterializeOutcome> {
        let content = self
            .accessor
            .current_content(key)
            .await
            .map_err(HistoryError::Accessor)?
            .canonicalize();
        let hash = content_hash(&content);

        if let Some(latest) = self.store.find_latest(key)?
            && latest.content_hash == hash
        {
            debug!("Skipping snapshot of {}: content unchanged ({})", key, hash);
            return Ok(MaterializeOutcome::Unchanged);
        }

        let now = Utc::now();
        let mut version = Version::new(key.clone(), content, actor_ids.clone(), now);
        if let Some(expires_at) = self
            .retention
            .and_then(|retention| chrono::Duration::from_std(retention).ok())
            .and_then(|retention| now.checked_add_signed(retention))
        {
            version = version.with_expiry(expires_at);
        }

        self.store.insert(&version)?;
        info!(
            "Created version {} of {} ({} actors, hash {})",
            version.id,
            key,
            version.actor_ids.len(),
            version.content_hash
        );

        let meta = version.meta();
        self.announce(key, &meta).await;
        Ok(MaterializeOutcome::Created(meta))
    }

    async fn announce(&self, key: &DocumentKey, meta: &VersionMeta) {
        let workspace_id = match self.accessor.workspace_id(key).await {
            Ok(id) => id,
            Err(e) => {
                warn!("Not announcing version {}: no workspace for {}: {}", meta.id, key, e);
                return;
            }
        };

        let actors = match self.profiles.resolve_profiles(&meta.actor_ids).await {
            Ok(actors) => actors,
            Err(e) => {
                warn!("Failed to resolve actor profiles for version {}: {}", meta.id, e);
                Vec::new()
            }
        };

        let event = VersionEvent {
            action: VersionAction::Create,
            version: meta.clone(),
            actors,
        };
        if let Err(e) = self.publisher.publish(&workspace_id, event).await {
            warn!("Failed to publish version {} to {}: {}", meta.id, workspace_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{ActorProfile, AnonymousProfiles};
    use crate::error::BoxError;
    use async_trait::async_trait;
    use folio_core::version::StoreResult;
    use folio_core::{CanonicalNode, FolioError, MemoryVersionStore};
    use std::sync::Mutex;

    struct FixedAccessor {
        content: Mutex<CanonicalNode>,
    }

    impl FixedAccessor {
        fn new(text: &str) -> Self {
            Self {
                content: Mutex::new(doc(text)),
            }
        }

        fn set(&self, text: &str) {
            *self.content.lock().unwrap() = doc(text);
        }
    }

    fn doc(text: &str) -> CanonicalNode {
        CanonicalNode::doc(vec![CanonicalNode::paragraph(text)])
    }

    #[async_trait]
    impl DocumentAccessor for FixedAccessor {
        async fn current_content(&self, _key: &DocumentKey) -> Result<CanonicalNode, BoxError> {
            Ok(self.content.lock().unwrap().clone())
        }

        async fn workspace_id(&self, _key: &DocumentKey) -> Result<String, BoxError> {
            Ok("ws-1".to_string())
        }
    }

    #[derive(Default)]
    struct RecordingPublisher {
        events: Mutex<Vec<(String, VersionEvent)>>,
    }

    #[async_trait]
    impl EventPublisher for RecordingPublisher {
        async fn publish(&self, workspace_id: &str, event: VersionEvent) -> Result<(), BoxError> {
            self.events
                .lock()
                .unwrap()
                .push((workspace_id.to_string(), event));
            Ok(())
        }
    }

    struct FailingPublisher;

    #[async_trait]
    impl EventPublisher for FailingPublisher {
        async fn publish(&self, _: &str, _: VersionEvent) -> Result<(), BoxError> {
            Err("event bus down".into())
        }
    }

    struct FailingStore;

    impl VersionStore for FailingStore {
        fn find_latest(&self, _: &DocumentKey) -> StoreResult<Option<Version>> {
            Err(FolioError::Store("unreachable".to_string()))
        }
        fn insert(&self, _: &Version) -> StoreResult<()> {
            Err(FolioError::Store("unreachable".to_string()))
        }
        fn find_by_id(&self, _: uuid::Uuid) -> StoreResult<Option<Version>> {
            Ok(None)
        }
        fn list(
            &self,
            _: &DocumentKey,
            _: Option<usize>,
        ) -> StoreResult<Vec<VersionMeta>> {
            Ok(Vec::new())
        }
        fn set_label(&self, _: uuid::Uuid, _: Option<&str>) -> StoreResult<bool> {
            Ok(false)
        }
        fn purge_expired(&self, _: chrono::DateTime<Utc>) -> StoreResult<usize> {
            Ok(0)
        }
    }

    fn actors(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_creates_version_and_publishes_event() {
        let store = Arc::new(MemoryVersionStore::new());
        let publisher = Arc::new(RecordingPublisher::default());
        let materializer = SnapshotMaterializer::new(
            Arc::new(FixedAccessor::new("Hello")),
            store.clone(),
            publisher.clone(),
            Arc::new(AnonymousProfiles),
        )
        .with_retention(Some(Duration::from_secs(3600)));

        let key = DocumentKey::new("p1");
        let outcome = materializer
            .materialize(&key, &actors(&["alice", "bob"]))
            .await
            .unwrap();

        let MaterializeOutcome::Created(meta) = outcome else {
            panic!("Expected a new version");
        };
        assert_eq!(meta.actor_ids, actors(&["alice", "bob"]));
        assert!(meta.expires_at.is_some());
        assert_eq!(store.len(), 1);

        let events = publisher.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, "ws-1");
        assert_eq!(events[0].1.action, VersionAction::Create);
        assert_eq!(events[0].1.version, meta);
        assert_eq!(
            events[0].1.actors,
            vec![ActorProfile::anonymous("alice"), ActorProfile::anonymous("bob")]
        );
    }

    #[tokio::test]
    async fn test_unchanged_content_is_not_stored_twice() {
        let store = Arc::new(MemoryVersionStore::new());
        let accessor = Arc::new(FixedAccessor::new("Same"));
        let materializer = SnapshotMaterializer::new(
            accessor.clone(),
            store.clone(),
            Arc::new(RecordingPublisher::default()),
            Arc::new(AnonymousProfiles),
        );
        let key = DocumentKey::new("p1");

        let first = materializer.materialize(&key, &actors(&["a"])).await.unwrap();
        let second = materializer.materialize(&key, &actors(&["b"])).await.unwrap();
        assert!(matches!(first, MaterializeOutcome::Created(_)));
        assert_eq!(second, MaterializeOutcome::Unchanged);
        assert_eq!(store.len(), 1);

        accessor.set("Different");
        let third = materializer.materialize(&key, &actors(&["b"])).await.unwrap();
        assert!(matches!(third, MaterializeOutcome::Created(_)));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_publish_failure_still_creates_version() {
        let store = Arc::new(MemoryVersionStore::new());
        let materializer = SnapshotMaterializer::new(
            Arc::new(FixedAccessor::new("Hello")),
            store.clone(),
            Arc::new(FailingPublisher),
            Arc::new(AnonymousProfiles),
        );

        let outcome = materializer
            .materialize(&DocumentKey::new("p1"), &actors(&["a"]))
            .await
            .unwrap();
        assert!(matches!(outcome, MaterializeOutcome::Created(_)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_store_failure_is_transient() {
        let materializer = SnapshotMaterializer::new(
            Arc::new(FixedAccessor::new("Hello")),
            Arc::new(FailingStore),
            Arc::new(RecordingPublisher::default()),
            Arc::new(AnonymousProfiles),
        );

        let err = materializer
            .materialize(&DocumentKey::new("p1"), &actors(&["a"]))
            .await
            .unwrap_err();
        assert!(matches!(err, HistoryError::Store(_)));
        assert!(err.is_transient());
    }
}
