use folio_core::FolioError;
use thiserror::Error;

use crate::config::ConfigError;

/// Boxed error returned by external collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors from snapshot materialization and coordinator setup
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Live document accessor failed: {0}")]
    Accessor(BoxError),

    #[error("Version store failed: {0}")]
    Store(#[from] FolioError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl HistoryError {
    /// Whether retrying the same materialization may succeed.
    ///
    /// Accessor and store failures are transient. Malformed data and bad
    /// configuration are not.
    pub fn is_transient(&self) -> bool {
        match self {
            HistoryError::Accessor(_) => true,
            HistoryError::Store(err) => !matches!(
                err,
                FolioError::Json(_)
                    | FolioError::InvalidNode(_)
                    | FolioError::InvalidDocumentKey(_)
                    | FolioError::DuplicateVersion(_)
            ),
            HistoryError::Config(_) => false,
        }
    }
}

/// Result type alias for history operations
pub type HistoryResult<T> = Result<T, HistoryError>;
