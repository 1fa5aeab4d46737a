//! Content and structural hashing for canonical trees.
//!
//! Two kinds of fingerprints are computed here:
//!
//! - [`content_hash`]: a stable SHA-256 fingerprint of a whole tree, stored on
//!   every version and used to suppress no-op snapshots. It is independent of
//!   attribute insertion order and of process/platform.
//! - Structural keys ([`match_key`], [`subtree_key`]): fast in-process 64-bit
//!   hashes used by the diff engine to align children across two revisions.
//!   They are never persisted.

use std::fmt;
use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::canonical::{Attrs, CanonicalNode, ElementNode, Mark};

/// Hex-encoded SHA-256 fingerprint of a canonical tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wrap a previously computed hex digest (e.g. read back from storage).
    pub fn from_hex(hex: impl Into<String>) -> Self {
        ContentHash(hex.into())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the content fingerprint of a tree.
///
/// The tree is hashed as given; callers that want render-equivalent trees
/// to collide canonicalize first.
pub fn content_hash(node: &CanonicalNode) -> ContentHash {
    let mut hasher = Sha256::new();
    feed_node(&mut hasher, node);
    ContentHash(hex::encode(hasher.finalize()))
}

// Every variable-length field is length-prefixed so that distinct trees
// cannot produce the same byte stream.
fn feed_node(hasher: &mut Sha256, node: &CanonicalNode) {
    match node {
        CanonicalNode::Text(t) => {
            hasher.update([b'T']);
            feed_str(hasher, &t.text);
            feed_marks(hasher, &t.marks);
        }
        CanonicalNode::Element(el) => {
            hasher.update([b'E']);
            feed_str(hasher, &el.node_type);
            feed_attrs(hasher, &el.attrs);
            feed_marks(hasher, &el.marks);
            hasher.update((el.children.len() as u64).to_le_bytes());
            for child in &el.children {
                feed_node(hasher, child);
            }
        }
    }
}

fn feed_marks(hasher: &mut Sha256, marks: &[Mark]) {
    hasher.update((marks.len() as u64).to_le_bytes());
    for mark in marks {
        feed_str(hasher, &mark.mark_type);
        feed_attrs(hasher, &mark.attrs);
    }
}

fn feed_attrs(hasher: &mut Sha256, attrs: &Attrs) {
    hasher.update((attrs.len() as u64).to_le_bytes());
    for (key, value) in attrs {
        feed_str(hasher, key);
        feed_value(hasher, value);
    }
}

fn feed_value(hasher: &mut Sha256, value: &serde_json::Value) {
    use serde_json::Value;

    match value {
        Value::Null => hasher.update([b'n']),
        Value::Bool(b) => hasher.update([b'b', *b as u8]),
        Value::Number(n) => {
            hasher.update([b'#']);
            feed_str(hasher, &n.to_string());
        }
        Value::String(s) => {
            hasher.update([b's']);
            feed_str(hasher, s);
        }
        Value::Array(items) => {
            hasher.update([b'a']);
            hasher.update((items.len() as u64).to_le_bytes());
            for item in items {
                feed_value(hasher, item);
            }
        }
        Value::Object(map) => {
            hasher.update([b'o']);
            hasher.update((map.len() as u64).to_le_bytes());
            // Object key order is not guaranteed to be sorted (preserve_order)
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            for (key, item) in entries {
                feed_str(hasher, key);
                feed_value(hasher, item);
            }
        }
    }
}

fn feed_str(hasher: &mut Sha256, s: &str) {
    hasher.update((s.len() as u64).to_le_bytes());
    hasher.update(s.as_bytes());
}

/// Attribute names that never participate in structural matching.
///
/// These carry presentational or ephemeral state (rendering width, writing
/// direction) or are diff annotations themselves.
pub const DEFAULT_EPHEMERAL_ATTRS: &[&str] = &["diff", "dir", "width", "colwidth"];

/// Identity of a node for alignment: its type plus its non-ephemeral
/// attributes. Text nodes match on type alone.
pub fn match_key(node: &CanonicalNode, ephemeral_attrs: &[String]) -> u64 {
    match node {
        CanonicalNode::Text(_) => {
            let mut hasher = FxHasher::default();
            0u8.hash(&mut hasher);
            hasher.finish()
        }
        CanonicalNode::Element(el) => element_match_key(el, ephemeral_attrs),
    }
}

/// [`match_key`] of an element. Marks and children are not part of it.
pub fn element_match_key(el: &ElementNode, ephemeral_attrs: &[String]) -> u64 {
    let mut hasher = FxHasher::default();
    1u8.hash(&mut hasher);
    el.node_type.hash(&mut hasher);
    // Attrs is ordered by key, so iteration is already sorted
    for (key, value) in &el.attrs {
        if ephemeral_attrs.iter().any(|e| e == key) {
            continue;
        }
        key.hash(&mut hasher);
        hash_value(value, &mut hasher);
    }
    hasher.finish()
}

/// Hash of an entire subtree, including every attribute and mark.
///
/// Equal subtrees always produce equal keys; unequal subtrees may collide,
/// so callers confirm with `==` before treating a match as unchanged.
pub fn subtree_key(node: &CanonicalNode) -> u64 {
    let mut hasher = FxHasher::default();
    hash_subtree(node, &mut hasher);
    hasher.finish()
}

fn hash_subtree<H: Hasher>(node: &CanonicalNode, hasher: &mut H) {
    match node {
        CanonicalNode::Text(t) => {
            0u8.hash(hasher);
            t.text.hash(hasher);
            hash_marks(&t.marks, hasher);
        }
        CanonicalNode::Element(el) => {
            1u8.hash(hasher);
            el.node_type.hash(hasher);
            el.attrs.len().hash(hasher);
            for (key, value) in &el.attrs {
                key.hash(hasher);
                hash_value(value, hasher);
            }
            hash_marks(&el.marks, hasher);
            el.children.len().hash(hasher);
            for child in &el.children {
                hash_subtree(child, hasher);
            }
        }
    }
}

fn hash_marks<H: Hasher>(marks: &[Mark], hasher: &mut H) {
    marks.len().hash(hasher);
    for mark in marks {
        mark.mark_type.hash(hasher);
        for (key, value) in &mark.attrs {
            key.hash(hasher);
            hash_value(value, hasher);
        }
    }
}

// serde_json::Value does not implement Hash
fn hash_value<H: Hasher>(value: &serde_json::Value, hasher: &mut H) {
    use serde_json::Value;

    match value {
        Value::Null => 0u8.hash(hasher),
        Value::Bool(b) => {
            1u8.hash(hasher);
            b.hash(hasher);
        }
        Value::Number(n) => {
            2u8.hash(hasher);
            n.to_string().hash(hasher);
        }
        Value::String(s) => {
            3u8.hash(hasher);
            s.hash(hasher);
        }
        Value::Array(items) => {
            4u8.hash(hasher);
            items.len().hash(hasher);
            for item in items {
                hash_value(item, hasher);
            }
        }
        Value::Object(map) => {
            5u8.hash(hasher);
            map.len().hash(hasher);
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            for (key, item) in entries {
                key.hash(hasher);
                hash_value(item, hasher);
            }
        }
    }
}
