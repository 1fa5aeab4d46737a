//! Versions: immutable, persisted snapshots of a document.
//!
//! A [`Version`] records the canonical content of a document at a point in
//! time together with its content hash and the actors whose edits it
//! captures. Versions are scoped by [`DocumentKey`] and persisted through a
//! [`VersionStore`].

mod memory_store;
#[cfg(all(not(target_arch = "wasm32"), feature = "sqlite"))]
mod sqlite_store;
mod store;

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::canonical::CanonicalNode;
use crate::error::FolioError;
use crate::hash::{ContentHash, content_hash};

pub use memory_store::MemoryVersionStore;
#[cfg(all(not(target_arch = "wasm32"), feature = "sqlite"))]
pub use sqlite_store::SqliteVersionStore;
pub use store::{StoreResult, VersionStore};

/// Identifies a versioned document: a content entity plus an optional
/// variant (e.g. a translation or draft of the same entity).
///
/// Written as `"{entity}"` or `"{entity}:{variant}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentKey {
    entity_id: String,
    variant_id: Option<String>,
}

impl DocumentKey {
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            variant_id: None,
        }
    }

    pub fn with_variant(entity_id: impl Into<String>, variant_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            variant_id: Some(variant_id.into()),
        }
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn variant_id(&self) -> Option<&str> {
        self.variant_id.as_deref()
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.variant_id {
            Some(variant) => write!(f, "{}:{}", self.entity_id, variant),
            None => f.write_str(&self.entity_id),
        }
    }
}

impl FromStr for DocumentKey {
    type Err = FolioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (entity, variant) = match s.split_once(':') {
            Some((entity, variant)) => (entity, Some(variant)),
            None => (s, None),
        };

        if entity.is_empty() || variant.is_some_and(|v| v.is_empty() || v.contains(':')) {
            return Err(FolioError::InvalidDocumentKey(s.to_string()));
        }

        Ok(Self {
            entity_id: entity.to_string(),
            variant_id: variant.map(str::to_string),
        })
    }
}

impl TryFrom<String> for DocumentKey {
    type Error = FolioError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DocumentKey> for String {
    fn from(key: DocumentKey) -> Self {
        key.to_string()
    }
}

/// An immutable snapshot of a document.
///
/// Only `label` may change after the version is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub id: Uuid,
    pub document_key: DocumentKey,
    pub created_at: DateTime<Utc>,
    pub content_hash: ContentHash,
    /// Actors whose edits are captured by this version
    pub actor_ids: BTreeSet<String>,
    pub content: CanonicalNode,
    /// When the retention policy allows this version to be purged
    pub expires_at: Option<DateTime<Utc>>,
    /// Optional user-assigned name ("Submitted draft")
    pub label: Option<String>,
}

impl Version {
    /// Build a new version of `content`, hashing it.
    ///
    /// The content is stored as given; callers canonicalize first.
    pub fn new(
        document_key: DocumentKey,
        content: CanonicalNode,
        actor_ids: BTreeSet<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_key,
            created_at,
            content_hash: content_hash(&content),
            actor_ids,
            content,
            expires_at: None,
            label: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Public metadata of this version (everything except the content).
    pub fn meta(&self) -> VersionMeta {
        VersionMeta {
            id: self.id,
            document_key: self.document_key.to_string(),
            created_at: self.created_at,
            content_hash: self.content_hash.to_string(),
            actor_ids: self.actor_ids.clone(),
            expires_at: self.expires_at,
            label: self.label.clone(),
        }
    }

    /// Whether the retention policy allows purging this version at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

/// Version metadata for listings and events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct VersionMeta {
    pub id: Uuid,

    /// `"{entity}"` or `"{entity}:{variant}"`
    pub document_key: String,

    pub created_at: DateTime<Utc>,

    /// Hex SHA-256 of the canonical content
    pub content_hash: String,

    pub actor_ids: BTreeSet<String>,

    pub expires_at: Option<DateTime<Utc>>,

    pub label: Option<String>,
}
