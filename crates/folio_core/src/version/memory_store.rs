//! In-memory version store for testing.
//!
//! This provides a simple in-memory implementation of [`VersionStore`]
//! for use in unit tests and development.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::store::{StoreResult, VersionStore};
use super::{DocumentKey, Version, VersionMeta};
use crate::error::FolioError;

/// In-memory version storage.
///
/// Thread-safe via `RwLock`, but data is lost when dropped. Clones share the
/// same underlying data.
#[derive(Debug, Default, Clone)]
pub struct MemoryVersionStore {
    /// Versions per document, in insertion (= creation) order
    versions: Arc<RwLock<HashMap<DocumentKey, Vec<Version>>>>,
}

fn poisoned<T>(_: PoisonError<T>) -> FolioError {
    FolioError::Store("version store lock poisoned".to_string())
}

impl MemoryVersionStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored versions across all documents.
    pub fn len(&self) -> usize {
        self.versions
            .read()
            .map(|versions| versions.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl VersionStore for MemoryVersionStore {
    fn find_latest(&self, key: &DocumentKey) -> StoreResult<Option<Version>> {
        let versions = self.versions.read().map_err(poisoned)?;
        Ok(versions.get(key).and_then(|v| v.last()).cloned())
    }

    fn insert(&self, version: &Version) -> StoreResult<()> {
        let mut versions = self.versions.write().map_err(poisoned)?;
        if versions.values().flatten().any(|v| v.id == version.id) {
            return Err(FolioError::DuplicateVersion(version.id));
        }
        versions
            .entry(version.document_key.clone())
            .or_default()
            .push(version.clone());
        Ok(())
    }

    fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Version>> {
        let versions = self.versions.read().map_err(poisoned)?;
        Ok(versions.values().flatten().find(|v| v.id == id).cloned())
    }

    fn list(&self, key: &DocumentKey, limit: Option<usize>) -> StoreResult<Vec<VersionMeta>> {
        let versions = self.versions.read().map_err(poisoned)?;
        let doc_versions = versions.get(key).map(|v| v.as_slice()).unwrap_or(&[]);

        Ok(doc_versions
            .iter()
            .rev()
            .take(limit.unwrap_or(usize::MAX))
            .map(Version::meta)
            .collect())
    }

    fn set_label(&self, id: Uuid, label: Option<&str>) -> StoreResult<bool> {
        let mut versions = self.versions.write().map_err(poisoned)?;
        match versions.values_mut().flatten().find(|v| v.id == id) {
            Some(version) => {
                version.label = label.map(str::to_string);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        let mut versions = self.versions.write().map_err(poisoned)?;
        let mut purged = 0;
        for doc_versions in versions.values_mut() {
            let before = doc_versions.len();
            doc_versions.retain(|v| !v.is_expired(now));
            purged += before - doc_versions.len();
        }
        versions.retain(|_, v| !v.is_empty());
        Ok(purged)
    }
}
