//! Live document bodies backed by a CRDT.
//!
//! [`LiveBody`] wraps a Y.Doc whose `body` Y.Text holds markdown. Peers
//! exchange yrs updates; at any time the merged text can be projected into
//! a canonical tree for hashing and versioning.

use yrs::{Doc, GetString, ReadTxn, Text, Transact, Update, updates::decoder::Decode};

use crate::canonical::CanonicalNode;
use crate::canonical::markdown::from_markdown;
use crate::error::{FolioError, FolioResult};

/// Name of the Y.Text holding the document body.
const BODY_TEXT_NAME: &str = "body";

/// A collaboratively edited markdown body.
///
/// # Example
///
/// ```
/// use folio_core::crdt::LiveBody;
///
/// let body = LiveBody::new();
/// body.set_body("# Hello\n\nFirst draft.");
///
/// let tree = body.to_canonical();
/// assert_eq!(tree.children().len(), 2);
/// ```
pub struct LiveBody {
    doc: Doc,
    body_text: yrs::TextRef,
}

impl Default for LiveBody {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveBody {
    /// Create an empty body.
    pub fn new() -> Self {
        let doc = Doc::new();
        let body_text = doc.get_or_insert_text(BODY_TEXT_NAME);
        Self { doc, body_text }
    }

    /// Create a body from an encoded state (as produced by
    /// [`LiveBody::encode_state`]).
    pub fn from_state(state: &[u8]) -> FolioResult<Self> {
        let body = Self::new();
        body.apply_update(state)?;
        Ok(body)
    }

    /// Get the full body as markdown.
    pub fn get_body(&self) -> String {
        let txn = self.doc.transact();
        self.body_text.get_string(&txn)
    }

    /// Replace the body, applying only the changed middle section so that
    /// unchanged text keeps its CRDT identity and merges cleanly with
    /// concurrent remote edits.
    pub fn set_body(&self, content: &str) {
        let current = self.get_body();
        if current == content {
            return;
        }

        // Common prefix and suffix, measured in bytes on char boundaries
        let prefix: usize = current
            .chars()
            .zip(content.chars())
            .take_while(|(a, b)| a == b)
            .map(|(a, _)| a.len_utf8())
            .sum();
        let max_suffix = (current.len() - prefix).min(content.len() - prefix);
        let suffix: usize = current[prefix..]
            .chars()
            .rev()
            .zip(content[prefix..].chars().rev())
            .take_while(|(a, b)| a == b)
            .map(|(a, _)| a.len_utf8())
            .scan(0usize, |total, len| {
                *total += len;
                (*total <= max_suffix).then_some(len)
            })
            .sum();

        let delete_len = current.len() - prefix - suffix;
        let insert = &content[prefix..content.len() - suffix];

        let mut txn = self.doc.transact_mut();
        if delete_len > 0 {
            self.body_text
                .remove_range(&mut txn, prefix as u32, delete_len as u32);
        }
        if !insert.is_empty() {
            self.body_text.insert(&mut txn, prefix as u32, insert);
        }
    }

    /// Length of the body in bytes.
    pub fn body_len(&self) -> u32 {
        let txn = self.doc.transact();
        self.body_text.len(&txn)
    }

    /// Apply an update from a remote peer.
    pub fn apply_update(&self, update: &[u8]) -> FolioResult<()> {
        let decoded = Update::decode_v1(update)
            .map_err(|e| FolioError::Crdt(format!("Failed to decode update: {}", e)))?;

        let mut txn = self.doc.transact_mut();
        txn.apply_update(decoded)
            .map_err(|e| FolioError::Crdt(format!("Failed to apply update: {}", e)))?;
        Ok(())
    }

    /// Encode the full state as an update.
    pub fn encode_state(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.encode_state_as_update_v1(&Default::default())
    }

    /// Project the merged body into a canonical document tree.
    pub fn to_canonical(&self) -> CanonicalNode {
        from_markdown(&self.get_body())
    }
}

impl std::fmt::Debug for LiveBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveBody")
            .field("body_len", &self.body_len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_body_is_empty() {
        let body = LiveBody::new();
        assert_eq!(body.get_body(), "");
        assert_eq!(body.body_len(), 0);
        assert!(body.to_canonical().children().is_empty());
    }

    #[test]
    fn test_set_body_replaces_middle() {
        let body = LiveBody::new();
        body.set_body("Hello world");
        body.set_body("Hello brave world");
        assert_eq!(body.get_body(), "Hello brave world");

        body.set_body("Hello world");
        assert_eq!(body.get_body(), "Hello world");

        body.set_body("");
        assert_eq!(body.get_body(), "");
    }

    #[test]
    fn test_set_body_multibyte() {
        let body = LiveBody::new();
        body.set_body("café crème");
        body.set_body("café brûlée crème");
        assert_eq!(body.get_body(), "café brûlée crème");
    }

    #[test]
    fn test_set_body_repeated_chars() {
        let body = LiveBody::new();
        body.set_body("aaa");
        body.set_body("aaaa");
        assert_eq!(body.get_body(), "aaaa");
        body.set_body("a");
        assert_eq!(body.get_body(), "a");
    }

    #[test]
    fn test_sync_between_bodies() {
        let a = LiveBody::new();
        a.set_body("Content from a");

        let b = LiveBody::from_state(&a.encode_state()).unwrap();
        assert_eq!(b.get_body(), "Content from a");
    }

    #[test]
    fn test_concurrent_edits_converge() {
        let a = LiveBody::new();
        a.set_body("Hello World");
        let b = LiveBody::from_state(&a.encode_state()).unwrap();

        a.set_body("A: Hello World");
        b.set_body("Hello World!");

        a.apply_update(&b.encode_state()).unwrap();
        b.apply_update(&a.encode_state()).unwrap();

        assert_eq!(a.get_body(), b.get_body());
        assert_eq!(a.get_body(), "A: Hello World!");
    }

    #[test]
    fn test_invalid_update() {
        let body = LiveBody::new();
        assert!(matches!(
            body.apply_update(&[0xff, 0xff, 0xff]),
            Err(FolioError::Crdt(_))
        ));
    }

    #[test]
    fn test_to_canonical() {
        let body = LiveBody::new();
        body.set_body("# Notes\n\nSome *text*.\n");

        let tree = body.to_canonical();
        assert_eq!(tree.children()[0].node_type(), "heading");
        assert_eq!(tree.children()[1].text_content(), "Some text.");
    }
}
