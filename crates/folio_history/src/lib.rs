#![doc = include_str!("../README.md")]

/// Live document accessor over CRDT bodies
#[cfg(feature = "crdt")]
pub mod accessor;

/// Collaborator interfaces (live documents, events, profiles)
pub mod collaborators;

/// Configuration (debounce, retention, retry)
pub mod config;

/// Debounced commit coordinator
pub mod coordinator;

pub mod error;

/// Snapshot materialization
pub mod materializer;

/// Edit signals
pub mod signal;

#[cfg(feature = "crdt")]
pub use accessor::LiveBodyAccessor;
pub use collaborators::{
    ActorProfile, AnonymousProfiles, DocumentAccessor, EventPublisher, ProfileResolver,
    VersionAction, VersionEvent,
};
pub use config::{ConfigError, DebounceConfig, DisconnectPolicy, HistoryConfig, RetryPolicy};
pub use coordinator::CommitCoordinator;
pub use error::{BoxError, HistoryError, HistoryResult};
pub use materializer::{MaterializeOutcome, SnapshotMaterializer};
pub use signal::{EditSignal, SignalKind};
