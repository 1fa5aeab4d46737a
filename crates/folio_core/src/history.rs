//! Version history queries.
//!
//! [`VersionHistory`] answers the questions a history UI or an exporter
//! asks of a [`VersionStore`]: which versions exist for a document, and what
//! changed between two of them.

use std::sync::Arc;

use uuid::Uuid;

use crate::canonical::CanonicalNode;
use crate::diff::{DiffNode, DiffOptions, diff_with_options};
use crate::error::FolioError;
use crate::version::{DocumentKey, StoreResult, Version, VersionMeta, VersionStore};

/// Read-side access to stored versions.
pub struct VersionHistory {
    store: Arc<dyn VersionStore>,
    options: DiffOptions,
}

impl VersionHistory {
    /// Create a history view over the given store.
    pub fn new(store: Arc<dyn VersionStore>) -> Self {
        Self {
            store,
            options: DiffOptions::default(),
        }
    }

    /// Use custom diff options for every diff this view computes.
    pub fn with_diff_options(mut self, options: DiffOptions) -> Self {
        self.options = options;
        self
    }

    /// Get the versions of a document, newest first.
    pub fn get_history(
        &self,
        key: &DocumentKey,
        limit: Option<usize>,
    ) -> StoreResult<Vec<VersionMeta>> {
        self.store.list(key, limit)
    }

    /// Fetch a version, failing if it does not exist.
    pub fn get_version(&self, id: Uuid) -> StoreResult<Version> {
        self.store
            .find_by_id(id)?
            .ok_or(FolioError::VersionNotFound(id))
    }

    /// Diff two versions.
    ///
    /// A missing `from` diffs against an empty document, which is how the
    /// first version of a document is presented.
    pub fn diff_versions(&self, from: Option<Uuid>, to: Uuid) -> StoreResult<DiffNode> {
        let to = self.get_version(to)?;
        let from_content = match from {
            Some(id) => self.get_version(id)?.content,
            None => CanonicalNode::empty_doc(),
        };
        Ok(diff_with_options(&from_content, &to.content, &self.options))
    }

    /// Diff a version against the one stored right before it for the same
    /// document (or against an empty document if it is the first).
    pub fn diff_with_previous(&self, id: Uuid) -> StoreResult<DiffNode> {
        let version = self.get_version(id)?;
        let history = self.store.list(&version.document_key, None)?;

        let previous = history
            .iter()
            .position(|meta| meta.id == id)
            .and_then(|idx| history.get(idx + 1))
            .map(|meta| meta.id);

        let from_content = match previous {
            Some(prev) => self.get_version(prev)?.content,
            None => CanonicalNode::empty_doc(),
        };
        Ok(diff_with_options(&from_content, &version.content, &self.options))
    }
}
