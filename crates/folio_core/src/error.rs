use thiserror::Error;
use uuid::Uuid;

/// Unified error type for folio operations
#[derive(Debug, Error)]
pub enum FolioError {
    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Canonical tree errors
    #[error("Invalid node: {0}")]
    InvalidNode(String),

    #[error("Invalid document key '{0}'. Expected '<entity>' or '<entity>:<variant>'")]
    InvalidDocumentKey(String),

    // Storage errors
    #[cfg(all(not(target_arch = "wasm32"), feature = "sqlite"))]
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Version not found: {0}")]
    VersionNotFound(Uuid),

    #[error("Version {0} already exists")]
    DuplicateVersion(Uuid),

    // CRDT errors
    #[error("CRDT error: {0}")]
    Crdt(String),
}

/// Result type alias for folio operations
pub type FolioResult<T> = std::result::Result<T, FolioError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_not_found_names_the_id() {
        let id = Uuid::new_v4();
        let err = FolioError::VersionNotFound(id);

        assert!(err.to_string().contains(&id.to_string()));
    }
}
