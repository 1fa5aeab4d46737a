//! Storage abstraction for versions.
//!
//! This module defines the [`VersionStore`] trait which abstracts over the
//! backends (SQLite, in-memory) that persist [`Version`]s.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{DocumentKey, Version, VersionMeta};
use crate::error::FolioError;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, FolioError>;

/// Trait for version storage backends.
///
/// # Storage Model
///
/// Versions are append-only. Their content is never updated or deleted
/// through this trait except by retention ([`VersionStore::purge_expired`]);
/// the only mutable field is the label.
pub trait VersionStore: Send + Sync {
    /// The most recent version for a document, if any.
    fn find_latest(&self, key: &DocumentKey) -> StoreResult<Option<Version>>;

    /// Persist a new version.
    ///
    /// Fails with [`FolioError::DuplicateVersion`] if the id is taken.
    fn insert(&self, version: &Version) -> StoreResult<()>;

    /// Look up a version by id.
    fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Version>>;

    /// Version metadata for a document, newest first.
    ///
    /// `limit` caps the number of entries returned (`None` = all).
    fn list(&self, key: &DocumentKey, limit: Option<usize>) -> StoreResult<Vec<VersionMeta>>;

    /// Set or clear the label of a version.
    ///
    /// Returns `false` if the version does not exist.
    fn set_label(&self, id: Uuid, label: Option<&str>) -> StoreResult<bool>;

    /// Delete every version whose expiry is at or before `now`.
    ///
    /// Returns the number of versions deleted.
    fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<usize>;
}
