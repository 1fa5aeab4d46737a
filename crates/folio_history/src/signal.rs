//! Edit signals emitted by the live-document transport.

use std::collections::BTreeSet;

use folio_core::DocumentKey;
use tokio::time::Instant;

/// Why a signal was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// The document was mutated
    Edit,
    /// A participant left the document
    Disconnect,
}

/// Notification that a document changed or a participant left.
///
/// Carries no content: the current state is fetched when a snapshot is
/// actually taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditSignal {
    pub document_key: DocumentKey,
    pub actor_ids: BTreeSet<String>,
    pub observed_at: Instant,
    pub kind: SignalKind,
}

impl EditSignal {
    /// An edit by a single actor, observed now.
    pub fn edit(document_key: DocumentKey, actor_id: impl Into<String>) -> Self {
        Self {
            document_key,
            actor_ids: BTreeSet::from([actor_id.into()]),
            observed_at: Instant::now(),
            kind: SignalKind::Edit,
        }
    }

    /// A disconnect of a single actor, observed now.
    pub fn disconnect(document_key: DocumentKey, actor_id: impl Into<String>) -> Self {
        Self {
            kind: SignalKind::Disconnect,
            ..Self::edit(document_key, actor_id)
        }
    }

    pub fn observed_at(mut self, observed_at: Instant) -> Self {
        self.observed_at = observed_at;
        self
    }

    /// Attribute the signal to additional actors.
    pub fn with_actors(mut self, actor_ids: impl IntoIterator<Item = String>) -> Self {
        self.actor_ids.extend(actor_ids);
        self
    }
}
