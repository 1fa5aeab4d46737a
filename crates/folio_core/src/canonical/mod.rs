//! Canonical document trees.
//!
//! A canonical tree is the library-agnostic representation of a rich-text
//! document shared by hashing, diffing and versioning. It reads and writes
//! the ProseMirror JSON shape:
//!
//! ```json
//! {"type": "doc", "content": [
//!   {"type": "paragraph", "content": [
//!     {"type": "text", "text": "Hello ", "marks": [{"type": "strong"}]}
//!   ]}
//! ]}
//! ```
//!
//! Text nodes and element nodes are separate variants of [`CanonicalNode`],
//! so a text node can never carry children and an element never carries raw
//! text.

#[cfg(feature = "markdown")]
pub mod markdown;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::FolioError;

/// Node type name reserved for text nodes.
pub const TEXT_NODE_TYPE: &str = "text";

/// Node type used for document roots.
pub const DOC_NODE_TYPE: &str = "doc";

/// Typed attributes of a node or mark, ordered by key.
pub type Attrs = BTreeMap<String, serde_json::Value>;

/// An inline formatting mark (bold, link, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mark {
    /// Mark type, e.g. `strong` or `link`
    #[serde(rename = "type")]
    pub mark_type: String,

    /// Mark attributes, e.g. `href` for links
    #[serde(default, skip_serializing_if = "Attrs::is_empty")]
    pub attrs: Attrs,
}

impl Mark {
    /// Create a mark without attributes.
    pub fn new(mark_type: impl Into<String>) -> Self {
        Self {
            mark_type: mark_type.into(),
            attrs: Attrs::new(),
        }
    }

    /// Add an attribute to this mark.
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }
}

/// A run of text with its marks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextNode {
    pub text: String,
    pub marks: Vec<Mark>,
}

impl TextNode {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            marks: Vec::new(),
        }
    }

    pub fn with_mark(mut self, mark: Mark) -> Self {
        self.marks.push(mark);
        self
    }
}

/// A block or inline element with ordered children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementNode {
    pub node_type: String,
    pub attrs: Attrs,
    /// Marks on inline elements (e.g. a linked image)
    pub marks: Vec<Mark>,
    pub children: Vec<CanonicalNode>,
}

impl ElementNode {
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            attrs: Attrs::new(),
            marks: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn with_mark(mut self, mark: Mark) -> Self {
        self.marks.push(mark);
        self
    }

    pub fn with_children(mut self, children: Vec<CanonicalNode>) -> Self {
        self.children = children;
        self
    }

    /// Elements without children (images, hard breaks, mentions).
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// A node of a canonical document tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawNode", into = "RawNode")]
pub enum CanonicalNode {
    Text(TextNode),
    Element(ElementNode),
}

impl CanonicalNode {
    /// Create an unmarked text node.
    pub fn text(text: impl Into<String>) -> Self {
        CanonicalNode::Text(TextNode::new(text))
    }

    /// Create an element node with the given children.
    pub fn element(node_type: impl Into<String>, children: Vec<CanonicalNode>) -> Self {
        CanonicalNode::Element(ElementNode::new(node_type).with_children(children))
    }

    /// Create a document root.
    pub fn doc(children: Vec<CanonicalNode>) -> Self {
        Self::element(DOC_NODE_TYPE, children)
    }

    /// An empty document, used as the "before" side of a first version.
    pub fn empty_doc() -> Self {
        Self::doc(Vec::new())
    }

    /// Create a paragraph holding a single unmarked text run.
    pub fn paragraph(text: impl Into<String>) -> Self {
        let text = text.into();
        if text.is_empty() {
            Self::element("paragraph", Vec::new())
        } else {
            Self::element("paragraph", vec![Self::text(text)])
        }
    }

    /// The node's type name (`"text"` for text nodes).
    pub fn node_type(&self) -> &str {
        match self {
            CanonicalNode::Text(_) => TEXT_NODE_TYPE,
            CanonicalNode::Element(el) => &el.node_type,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, CanonicalNode::Text(_))
    }

    /// Text or a childless element: content that lives inside a text block.
    pub fn is_inline(&self) -> bool {
        match self {
            CanonicalNode::Text(_) => true,
            CanonicalNode::Element(el) => el.is_leaf(),
        }
    }

    /// Children of an element; text nodes have none.
    pub fn children(&self) -> &[CanonicalNode] {
        match self {
            CanonicalNode::Text(_) => &[],
            CanonicalNode::Element(el) => &el.children,
        }
    }

    pub fn marks(&self) -> &[Mark] {
        match self {
            CanonicalNode::Text(t) => &t.marks,
            CanonicalNode::Element(el) => &el.marks,
        }
    }

    /// Concatenated text content of this subtree.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            CanonicalNode::Text(t) => out.push_str(&t.text),
            CanonicalNode::Element(el) => {
                for child in &el.children {
                    child.collect_text(out);
                }
            }
        }
    }

    /// Return the canonical form of this tree.
    ///
    /// Empty text nodes are dropped and adjacent text nodes with equal marks
    /// are merged. Two trees that render identically have the same canonical
    /// form, which is what hashing and diffing operate on.
    pub fn canonicalize(&self) -> CanonicalNode {
        match self {
            CanonicalNode::Text(t) => CanonicalNode::Text(t.clone()),
            CanonicalNode::Element(el) => CanonicalNode::Element(ElementNode {
                node_type: el.node_type.clone(),
                attrs: el.attrs.clone(),
                marks: el.marks.clone(),
                children: normalize_inline_runs(
                    el.children.iter().map(CanonicalNode::canonicalize),
                ),
            }),
        }
    }

    /// Whether this tree is already in canonical form.
    pub fn is_canonical(&self) -> bool {
        match self {
            CanonicalNode::Text(_) => true,
            CanonicalNode::Element(el) => {
                let runs_ok = el.children.windows(2).all(|pair| match pair {
                    [CanonicalNode::Text(a), CanonicalNode::Text(b)] => a.marks != b.marks,
                    _ => true,
                });
                let no_empty = el.children.iter().all(|c| match c {
                    CanonicalNode::Text(t) => !t.text.is_empty(),
                    CanonicalNode::Element(_) => true,
                });
                runs_ok && no_empty && el.children.iter().all(CanonicalNode::is_canonical)
            }
        }
    }
}

/// Drop empty text nodes and merge neighbouring text nodes with equal marks.
pub(crate) fn normalize_inline_runs(
    children: impl IntoIterator<Item = CanonicalNode>,
) -> Vec<CanonicalNode> {
    let mut out: Vec<CanonicalNode> = Vec::new();
    for child in children {
        match child {
            CanonicalNode::Text(t) if t.text.is_empty() => {}
            CanonicalNode::Text(t) => {
                if let Some(CanonicalNode::Text(prev)) = out.last_mut()
                    && prev.marks == t.marks
                {
                    prev.text.push_str(&t.text);
                    continue;
                }
                out.push(CanonicalNode::Text(t));
            }
            element => out.push(element),
        }
    }
    out
}

impl From<TextNode> for CanonicalNode {
    fn from(node: TextNode) -> Self {
        CanonicalNode::Text(node)
    }
}

impl From<ElementNode> for CanonicalNode {
    fn from(node: ElementNode) -> Self {
        CanonicalNode::Element(node)
    }
}

/// Wire shape shared by every node kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RawNode {
    #[serde(rename = "type")]
    node_type: String,

    #[serde(default, skip_serializing_if = "Attrs::is_empty")]
    attrs: Attrs,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    marks: Vec<Mark>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,

    #[serde(default, alias = "children", skip_serializing_if = "Option::is_none")]
    content: Option<Vec<RawNode>>,
}

impl TryFrom<RawNode> for CanonicalNode {
    type Error = FolioError;

    fn try_from(raw: RawNode) -> Result<Self, Self::Error> {
        if raw.node_type == TEXT_NODE_TYPE {
            if raw.content.is_some() {
                return Err(FolioError::InvalidNode(
                    "text node cannot have content".to_string(),
                ));
            }
            if !raw.attrs.is_empty() {
                return Err(FolioError::InvalidNode(
                    "text node cannot have attrs".to_string(),
                ));
            }
            let text = raw
                .text
                .ok_or_else(|| FolioError::InvalidNode("text node is missing text".to_string()))?;
            return Ok(CanonicalNode::Text(TextNode {
                text,
                marks: raw.marks,
            }));
        }

        if raw.text.is_some() {
            return Err(FolioError::InvalidNode(format!(
                "'{}' node cannot carry text",
                raw.node_type
            )));
        }

        let children = raw
            .content
            .unwrap_or_default()
            .into_iter()
            .map(CanonicalNode::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CanonicalNode::Element(ElementNode {
            node_type: raw.node_type,
            attrs: raw.attrs,
            marks: raw.marks,
            children,
        }))
    }
}

impl From<CanonicalNode> for RawNode {
    fn from(node: CanonicalNode) -> Self {
        match node {
            CanonicalNode::Text(t) => RawNode {
                node_type: TEXT_NODE_TYPE.to_string(),
                attrs: Attrs::new(),
                marks: t.marks,
                text: Some(t.text),
                content: None,
            },
            CanonicalNode::Element(el) => RawNode {
                node_type: el.node_type,
                attrs: el.attrs,
                marks: el.marks,
                text: None,
                content: if el.children.is_empty() {
                    None
                } else {
                    Some(el.children.into_iter().map(RawNode::from).collect())
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_prosemirror_json() {
        let value = json!({
            "type": "doc",
            "content": [
                {"type": "heading", "attrs": {"level": 1}, "content": [
                    {"type": "text", "text": "Title"}
                ]},
                {"type": "paragraph", "content": [
                    {"type": "text", "text": "Bold", "marks": [{"type": "strong"}]},
                    {"type": "hard_break"}
                ]}
            ]
        });

        let node: CanonicalNode = serde_json::from_value(value).unwrap();
        assert_eq!(node.node_type(), "doc");
        assert_eq!(node.children().len(), 2);

        let heading = &node.children()[0];
        match heading {
            CanonicalNode::Element(el) => assert_eq!(el.attrs["level"], json!(1)),
            CanonicalNode::Text(_) => panic!("Expected heading element"),
        }

        let paragraph = &node.children()[1];
        assert_eq!(paragraph.children()[0].marks()[0].mark_type, "strong");
        assert!(paragraph.children()[1].is_inline());
    }

    #[test]
    fn test_children_alias_and_absent_content() {
        let value = json!({
            "type": "doc",
            "children": [{"type": "paragraph"}]
        });

        let node: CanonicalNode = serde_json::from_value(value).unwrap();
        assert_eq!(node.children().len(), 1);
        assert!(node.children()[0].children().is_empty());
    }

    #[test]
    fn test_serialize_omits_empty_fields() {
        let node = CanonicalNode::doc(vec![CanonicalNode::element("paragraph", vec![])]);
        let value = serde_json::to_value(&node).unwrap();

        assert_eq!(
            value,
            json!({"type": "doc", "content": [{"type": "paragraph"}]})
        );
    }

    #[test]
    fn test_reject_text_node_with_content() {
        let value = json!({"type": "text", "text": "x", "content": []});
        let result: Result<CanonicalNode, _> = serde_json::from_value(value);
        assert!(result.is_err());
    }

    #[test]
    fn test_reject_element_with_text() {
        let value = json!({"type": "paragraph", "text": "x"});
        let result: Result<CanonicalNode, _> = serde_json::from_value(value);
        assert!(result.is_err());
    }

    #[test]
    fn test_reject_text_node_without_text() {
        let value = json!({"type": "text"});
        let result: Result<CanonicalNode, _> = serde_json::from_value(value);
        assert!(result.is_err());
    }

    #[test]
    fn test_canonicalize_merges_runs() {
        let bold = Mark::new("strong");
        let node = CanonicalNode::element(
            "paragraph",
            vec![
                CanonicalNode::text("Hello "),
                CanonicalNode::text(""),
                CanonicalNode::text("world"),
                TextNode::new("!").with_mark(bold.clone()).into(),
                TextNode::new("!").with_mark(bold.clone()).into(),
            ],
        );
        assert!(!node.is_canonical());

        let canonical = node.canonicalize();
        assert!(canonical.is_canonical());
        assert_eq!(
            canonical.children(),
            &[
                CanonicalNode::text("Hello world"),
                TextNode::new("!!").with_mark(bold).into(),
            ]
        );
        assert_eq!(canonical.text_content(), "Hello world!!");
    }

    #[test]
    fn test_canonicalize_keeps_inline_elements_between_runs() {
        let node = CanonicalNode::element(
            "paragraph",
            vec![
                CanonicalNode::text("a"),
                CanonicalNode::element("hard_break", vec![]),
                CanonicalNode::text("b"),
            ],
        );
        assert_eq!(node.canonicalize(), node);
    }
}
