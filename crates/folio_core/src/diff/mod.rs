//! Structural diff of canonical trees.
//!
//! [`diff`] compares two document revisions and returns a [`DiffNode`] tree
//! in which every node and text span is tagged with a [`ChangeState`].
//!
//! At each tree level children are aligned in two passes:
//!
//! 1. Whole subtrees are aligned by a deep content hash. Runs that line up
//!    are passed through as `unchanged` without descending into them.
//! 2. The remaining gaps are aligned by structural hash (node type plus
//!    non-ephemeral attributes). Matched pairs are diffed recursively, the
//!    rest become `removed`/`added` subtrees.
//!
//! Text blocks (elements whose children are all inline) are diffed at word
//! and character granularity instead.
//!
//! Reordered nodes are reported as removed at their old position and added
//! at their new one.
//!
//! ```
//! use folio_core::canonical::CanonicalNode;
//! use folio_core::diff::{ChangeState, diff};
//!
//! let old = CanonicalNode::doc(vec![CanonicalNode::paragraph("Hello world")]);
//! let new = CanonicalNode::doc(vec![CanonicalNode::paragraph("Hello brave world")]);
//!
//! let result = diff(&old, &new);
//! assert_eq!(result.state(), ChangeState::Unchanged);
//! assert!(result.has_changes());
//! assert_eq!(result.new_side(), Some(new));
//! ```

mod sequence;
mod text;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::json;
use thiserror::Error;
use ts_rs::TS;

use crate::canonical::{Attrs, CanonicalNode, ElementNode, Mark, TextNode, normalize_inline_runs};
use crate::hash::{DEFAULT_EPHEMERAL_ATTRS, match_key, subtree_key};
use sequence::{Edit, align};

/// Attribute (on elements) and mark type (on text spans) used to annotate
/// changes in serialized diffs.
pub const DIFF_ANNOTATION: &str = "diff";

/// Change classification of a node or text span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum ChangeState {
    /// Identical on both sides
    Unchanged,
    /// Present only in the new revision
    Added,
    /// Present only in the old revision
    Removed,
    /// Present on both sides with different attributes or marks
    Changed,
}

impl ChangeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeState::Unchanged => "unchanged",
            ChangeState::Added => "added",
            ChangeState::Removed => "removed",
            ChangeState::Changed => "changed",
        }
    }

    pub fn is_unchanged(&self) -> bool {
        *self == ChangeState::Unchanged
    }
}

/// Errors raised inside the diff engine. They never escape [`diff`]: the
/// affected node is degraded to `changed` instead.
#[derive(Debug, Error)]
pub enum DiffError {
    #[error("Malformed text delta: {0}")]
    MalformedDelta(String),
}

/// Options for [`diff_with_options`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffOptions {
    /// Attribute names ignored when matching nodes across revisions
    pub ephemeral_attrs: Vec<String>,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            ephemeral_attrs: DEFAULT_EPHEMERAL_ATTRS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl DiffOptions {
    /// Treat an additional attribute as ephemeral.
    pub fn with_ephemeral_attr(mut self, name: impl Into<String>) -> Self {
        self.ephemeral_attrs.push(name.into());
        self
    }
}

/// An element of a diff tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffElement {
    pub node_type: String,
    pub attrs: Attrs,
    pub marks: Vec<Mark>,
    pub state: ChangeState,
    pub children: Vec<DiffNode>,
}

/// A text span of a diff tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffText {
    pub text: String,
    /// Marks of the new revision, or of the old one for removed spans
    pub marks: Vec<Mark>,
    pub state: ChangeState,
}

/// A canonical node annotated with its change classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffNode {
    Element(DiffElement),
    Text(DiffText),
}

/// Summary counts of a diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct DiffStats {
    /// Added elements (an added subtree counts once)
    pub nodes_added: usize,
    /// Removed elements (a removed subtree counts once)
    pub nodes_removed: usize,
    /// Elements and text spans changed in place
    pub nodes_changed: usize,
    /// Characters of added text
    pub chars_added: usize,
    /// Characters of removed text
    pub chars_removed: usize,
}

/// Diff two trees with the default options.
pub fn diff(old: &CanonicalNode, new: &CanonicalNode) -> DiffNode {
    diff_with_options(old, new, &DiffOptions::default())
}

/// Diff two trees.
///
/// Both inputs are canonicalized first. The roots are always treated as
/// matched, so the result's root is never `added` or `removed`.
pub fn diff_with_options(
    old: &CanonicalNode,
    new: &CanonicalNode,
    options: &DiffOptions,
) -> DiffNode {
    Differ::new(options).diff(old, new)
}

/// Character-level diff of the inline children of two matched text blocks.
type InlineDiff =
    fn(&[CanonicalNode], &[CanonicalNode], &DiffOptions) -> Result<Vec<DiffNode>, DiffError>;

/// One diff run: the options plus the inline diff used for text blocks.
struct Differ<'a> {
    options: &'a DiffOptions,
    diff_inline: InlineDiff,
}

impl<'a> Differ<'a> {
    fn new(options: &'a DiffOptions) -> Self {
        Self {
            options,
            diff_inline: text::diff_inline,
        }
    }

    fn diff(&self, old: &CanonicalNode, new: &CanonicalNode) -> DiffNode {
        let old = old.canonicalize();
        let new = new.canonicalize();

        match (&old, &new) {
            (CanonicalNode::Element(o), CanonicalNode::Element(n)) => self.diff_elements(o, n),
            _ if old == new => DiffNode::lift(&new, ChangeState::Unchanged),
            _ => DiffNode::lift(&new, ChangeState::Changed),
        }
    }

    fn inline(
        &self,
        old: &[CanonicalNode],
        new: &[CanonicalNode],
    ) -> Result<Vec<DiffNode>, DiffError> {
        (self.diff_inline)(old, new, self.options)
    }

    /// Diff two elements already matched to each other.
    fn diff_elements(&self, old: &ElementNode, new: &ElementNode) -> DiffNode {
        let own_changed =
            old.node_type != new.node_type || old.attrs != new.attrs || old.marks != new.marks;
        let state = if own_changed {
            ChangeState::Changed
        } else {
            ChangeState::Unchanged
        };

        let children = if old.children == new.children {
            lift_all(&new.children, ChangeState::Unchanged)
        } else if is_text_block(&old.children, &new.children) {
            match self.inline(&old.children, &new.children) {
                Ok(spans) => spans,
                Err(e) => {
                    log::warn!("Degrading '{}' to a coarse change: {}", new.node_type, e);
                    return DiffNode::Element(DiffElement {
                        node_type: new.node_type.clone(),
                        attrs: new.attrs.clone(),
                        marks: new.marks.clone(),
                        state: ChangeState::Changed,
                        children: lift_all(&new.children, ChangeState::Unchanged),
                    });
                }
            }
        } else {
            self.diff_children(&old.children, &new.children)
        };

        DiffNode::Element(DiffElement {
            node_type: new.node_type.clone(),
            attrs: new.attrs.clone(),
            marks: new.marks.clone(),
            state,
            children,
        })
    }

    /// Align and diff a level of block children.
    fn diff_children(&self, old: &[CanonicalNode], new: &[CanonicalNode]) -> Vec<DiffNode> {
        let old_keys: Vec<u64> = old.iter().map(subtree_key).collect();
        let new_keys: Vec<u64> = new.iter().map(subtree_key).collect();

        let mut out = Vec::with_capacity(new.len());
        for edit in align(&old_keys, &new_keys) {
            match edit {
                Edit::Equal { old: o, new: n } => {
                    for (old_child, new_child) in old[o].iter().zip(&new[n]) {
                        // Confirm: subtree keys can collide
                        if old_child == new_child {
                            out.push(DiffNode::lift(new_child, ChangeState::Unchanged));
                        } else {
                            self.diff_pair(old_child, new_child, &mut out);
                        }
                    }
                }
                Edit::Delete { old: o } => out.extend(lift_all(&old[o], ChangeState::Removed)),
                Edit::Insert { new: n } => out.extend(lift_all(&new[n], ChangeState::Added)),
                Edit::Replace { old: o, new: n } => {
                    self.diff_gap(&old[o], &new[n], &mut out);
                }
            }
        }
        out
    }

    /// Second pass over a changed range: align by structural identity.
    fn diff_gap(&self, old: &[CanonicalNode], new: &[CanonicalNode], out: &mut Vec<DiffNode>) {
        let ephemeral = &self.options.ephemeral_attrs;
        let old_keys: Vec<u64> = old.iter().map(|n| match_key(n, ephemeral)).collect();
        let new_keys: Vec<u64> = new.iter().map(|n| match_key(n, ephemeral)).collect();

        for edit in align(&old_keys, &new_keys) {
            match edit {
                Edit::Equal { old: o, new: n } => {
                    for (old_child, new_child) in old[o].iter().zip(&new[n]) {
                        self.diff_pair(old_child, new_child, out);
                    }
                }
                Edit::Delete { old: o } => out.extend(lift_all(&old[o], ChangeState::Removed)),
                Edit::Insert { new: n } => out.extend(lift_all(&new[n], ChangeState::Added)),
                Edit::Replace { old: o, new: n } => {
                    out.extend(lift_all(&old[o], ChangeState::Removed));
                    out.extend(lift_all(&new[n], ChangeState::Added));
                }
            }
        }
    }

    /// Diff two nodes matched by structural identity.
    fn diff_pair(&self, old: &CanonicalNode, new: &CanonicalNode, out: &mut Vec<DiffNode>) {
        if old == new {
            out.push(DiffNode::lift(new, ChangeState::Unchanged));
            return;
        }

        match (old, new) {
            (CanonicalNode::Element(o), CanonicalNode::Element(n)) => {
                out.push(self.diff_elements(o, n));
            }
            (CanonicalNode::Text(_), CanonicalNode::Text(_)) => {
                match self.inline(std::slice::from_ref(old), std::slice::from_ref(new)) {
                    Ok(spans) => out.extend(spans),
                    Err(e) => {
                        log::warn!("Degrading text run to a coarse change: {}", e);
                        out.push(DiffNode::lift(new, ChangeState::Changed));
                    }
                }
            }
            _ => {
                out.push(DiffNode::lift(old, ChangeState::Removed));
                out.push(DiffNode::lift(new, ChangeState::Added));
            }
        }
    }
}

/// Children made only of inline content, with at least one text run.
fn is_text_block(old: &[CanonicalNode], new: &[CanonicalNode]) -> bool {
    let all_inline = old.iter().chain(new).all(CanonicalNode::is_inline);
    let has_text = old.iter().chain(new).any(CanonicalNode::is_text);
    all_inline && has_text
}

fn lift_all(nodes: &[CanonicalNode], state: ChangeState) -> Vec<DiffNode> {
    nodes.iter().map(|n| DiffNode::lift(n, state)).collect()
}

impl DiffNode {
    /// Copy a canonical subtree into a diff tree, tagging every node with
    /// `state`.
    pub fn lift(node: &CanonicalNode, state: ChangeState) -> DiffNode {
        match node {
            CanonicalNode::Text(t) => DiffNode::Text(DiffText {
                text: t.text.clone(),
                marks: t.marks.clone(),
                state,
            }),
            CanonicalNode::Element(el) => DiffNode::Element(DiffElement {
                node_type: el.node_type.clone(),
                attrs: el.attrs.clone(),
                marks: el.marks.clone(),
                state,
                children: lift_all(&el.children, state),
            }),
        }
    }

    pub fn state(&self) -> ChangeState {
        match self {
            DiffNode::Element(el) => el.state,
            DiffNode::Text(t) => t.state,
        }
    }

    pub fn children(&self) -> &[DiffNode] {
        match self {
            DiffNode::Element(el) => &el.children,
            DiffNode::Text(_) => &[],
        }
    }

    /// Whether anything in this subtree differs between the two revisions.
    pub fn has_changes(&self) -> bool {
        !self.state().is_unchanged() || self.children().iter().any(DiffNode::has_changes)
    }

    /// The new revision's content: removed nodes are dropped and change
    /// markers unwrapped. `None` if this node itself was removed.
    ///
    /// For `diff(a, b)` the root's new side equals the canonical form of `b`.
    pub fn new_side(&self) -> Option<CanonicalNode> {
        if self.state() == ChangeState::Removed {
            return None;
        }
        Some(match self {
            DiffNode::Text(t) => CanonicalNode::Text(TextNode {
                text: t.text.clone(),
                marks: t.marks.clone(),
            }),
            DiffNode::Element(el) => CanonicalNode::Element(ElementNode {
                node_type: el.node_type.clone(),
                attrs: el.attrs.clone(),
                marks: el.marks.clone(),
                children: normalize_inline_runs(el.children.iter().filter_map(DiffNode::new_side)),
            }),
        })
    }

    /// Render as a canonical tree carrying the change annotations.
    ///
    /// Changed elements get `attrs.diff`; changed text spans get a trailing
    /// `{"type": "diff", "attrs": {"diff": ...}}` mark. Unchanged content is
    /// emitted as is.
    pub fn to_canonical(&self) -> CanonicalNode {
        match self {
            DiffNode::Text(t) => {
                let mut marks = t.marks.clone();
                if !t.state.is_unchanged() {
                    marks.push(
                        Mark::new(DIFF_ANNOTATION).with_attr(DIFF_ANNOTATION, t.state.as_str()),
                    );
                }
                CanonicalNode::Text(TextNode {
                    text: t.text.clone(),
                    marks,
                })
            }
            DiffNode::Element(el) => {
                let mut attrs = el.attrs.clone();
                if !el.state.is_unchanged() {
                    attrs.insert(DIFF_ANNOTATION.to_string(), json!(el.state.as_str()));
                }
                CanonicalNode::Element(ElementNode {
                    node_type: el.node_type.clone(),
                    attrs,
                    marks: el.marks.clone(),
                    children: el.children.iter().map(DiffNode::to_canonical).collect(),
                })
            }
        }
    }

    /// Count the changes in this subtree.
    pub fn stats(&self) -> DiffStats {
        let mut stats = DiffStats::default();
        self.collect_stats(&mut stats);
        stats
    }

    fn collect_stats(&self, stats: &mut DiffStats) {
        match self {
            DiffNode::Text(t) => match t.state {
                ChangeState::Added => stats.chars_added += t.text.chars().count(),
                ChangeState::Removed => stats.chars_removed += t.text.chars().count(),
                ChangeState::Changed => stats.nodes_changed += 1,
                ChangeState::Unchanged => {}
            },
            DiffNode::Element(el) => match el.state {
                ChangeState::Added => {
                    stats.nodes_added += 1;
                    stats.chars_added += self.text_len();
                }
                ChangeState::Removed => {
                    stats.nodes_removed += 1;
                    stats.chars_removed += self.text_len();
                }
                ChangeState::Changed | ChangeState::Unchanged => {
                    if el.state == ChangeState::Changed {
                        stats.nodes_changed += 1;
                    }
                    for child in &el.children {
                        child.collect_stats(stats);
                    }
                }
            },
        }
    }

    fn text_len(&self) -> usize {
        match self {
            DiffNode::Text(t) => t.text.chars().count(),
            DiffNode::Element(el) => el.children.iter().map(DiffNode::text_len).sum(),
        }
    }
}

impl Serialize for DiffNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_canonical().serialize(serializer)
    }
}
