#![doc = include_str!("../README.md")]

/// Canonical document trees (and the markdown projection)
pub mod canonical;

/// Live CRDT bodies
#[cfg(feature = "crdt")]
pub mod crdt;

/// Structural diff engine
pub mod diff;

/// Error (common error types)
pub mod error;

/// Content and structural hashing
pub mod hash;

/// Version history queries
pub mod history;

/// Versions and version stores
pub mod version;

pub use canonical::{CanonicalNode, ElementNode, Mark, TextNode};
pub use diff::{ChangeState, DiffNode, DiffOptions, DiffStats, diff, diff_with_options};
pub use error::{FolioError, FolioResult};
pub use hash::{ContentHash, content_hash};
pub use history::VersionHistory;
pub use version::{DocumentKey, MemoryVersionStore, Version, VersionMeta, VersionStore};

#[cfg(all(not(target_arch = "wasm32"), feature = "sqlite"))]
pub use version::SqliteVersionStore;
