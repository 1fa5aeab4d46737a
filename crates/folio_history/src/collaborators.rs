//! Interfaces to the services around the history core.
//!
//! The coordinator and materializer never reach for global state: the live
//! document transport, the event fan-out and the profile directory are
//! injected through these traits.

use std::collections::BTreeSet;

use async_trait::async_trait;
use folio_core::{CanonicalNode, DocumentKey, VersionMeta};
use serde::{Deserialize, Serialize};

use crate::error::BoxError;

/// Read access to the authoritative merged state of live documents.
#[async_trait]
pub trait DocumentAccessor: Send + Sync {
    /// Current content of a document as a canonical tree.
    async fn current_content(&self, key: &DocumentKey) -> Result<CanonicalNode, BoxError>;

    /// Workspace that owns a document, used to route events.
    async fn workspace_id(&self, key: &DocumentKey) -> Result<String, BoxError>;
}

/// Fan-out of version events to workspace subscribers.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, workspace_id: &str, event: VersionEvent) -> Result<(), BoxError>;
}

/// Resolution of actor ids to display profiles.
#[async_trait]
pub trait ProfileResolver: Send + Sync {
    async fn resolve_profiles(
        &self,
        actor_ids: &BTreeSet<String>,
    ) -> Result<Vec<ActorProfile>, BoxError>;
}

/// Public profile of an actor, as shown next to a version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorProfile {
    pub id: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl ActorProfile {
    /// A profile carrying only the actor id.
    pub fn anonymous(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            avatar_url: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionAction {
    Create,
}

/// Event published when a version is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionEvent {
    pub action: VersionAction,
    pub version: VersionMeta,
    pub actors: Vec<ActorProfile>,
}

/// Profile resolver that knows nothing but ids.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnonymousProfiles;

#[async_trait]
impl ProfileResolver for AnonymousProfiles {
    async fn resolve_profiles(
        &self,
        actor_ids: &BTreeSet<String>,
    ) -> Result<Vec<ActorProfile>, BoxError> {
        Ok(actor_ids.iter().map(ActorProfile::anonymous).collect())
    }
}
