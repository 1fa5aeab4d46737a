//! Markdown projection into canonical trees.
//!
//! Live bodies are edited as markdown text; this module parses CommonMark
//! with comrak and maps the resulting AST onto the canonical node
//! vocabulary (`doc`, `paragraph`, `heading`, ...). Inline formatting becomes
//! marks on text runs.

use comrak::nodes::{AstNode, ListType, NodeValue};
use comrak::{Arena, Options, parse_document};
use serde_json::json;

use super::{CanonicalNode, DOC_NODE_TYPE, ElementNode, Mark, TextNode};

/// Parse markdown into a canonical document tree.
pub fn from_markdown(markdown: &str) -> CanonicalNode {
    let arena = Arena::new();
    let mut options = Options::default();
    options.extension.strikethrough = true;
    let root = parse_document(&arena, markdown, &options);

    let doc = ElementNode::new(DOC_NODE_TYPE).with_children(convert_blocks(root));
    CanonicalNode::Element(doc).canonicalize()
}

fn convert_blocks<'a>(node: &'a AstNode<'a>) -> Vec<CanonicalNode> {
    node.children().filter_map(convert_block).collect()
}

fn convert_block<'a>(node: &'a AstNode<'a>) -> Option<CanonicalNode> {
    let ast = node.data.borrow();

    let element = match &ast.value {
        NodeValue::Paragraph => {
            ElementNode::new("paragraph").with_children(convert_inlines(node))
        }
        NodeValue::Heading(heading) => ElementNode::new("heading")
            .with_attr("level", heading.level)
            .with_children(convert_inlines(node)),
        NodeValue::BlockQuote => ElementNode::new("blockquote").with_children(convert_blocks(node)),
        NodeValue::List(list) => {
            let items = node
                .children()
                .map(|item| {
                    CanonicalNode::Element(
                        ElementNode::new("list_item").with_children(convert_blocks(item)),
                    )
                })
                .collect();
            match list.list_type {
                ListType::Bullet => ElementNode::new("bullet_list").with_children(items),
                ListType::Ordered => ElementNode::new("ordered_list")
                    .with_attr("order", list.start)
                    .with_children(items),
            }
        }
        NodeValue::CodeBlock(code_block) => {
            let language = code_block
                .info
                .split_whitespace()
                .next()
                .map(|lang| json!(lang))
                .unwrap_or(serde_json::Value::Null);
            let literal = code_block.literal.trim_end_matches('\n').to_string();
            ElementNode::new("code_block")
                .with_attr("language", language)
                .with_children(vec![CanonicalNode::text(literal)])
        }
        NodeValue::HtmlBlock(html) => {
            let literal = html.literal.trim_end_matches('\n').to_string();
            ElementNode::new("html_block").with_children(vec![CanonicalNode::text(literal)])
        }
        NodeValue::ThematicBreak => ElementNode::new("horizontal_rule"),
        // Front matter, tables and other extensions have no canonical counterpart
        _ => return None,
    };

    Some(CanonicalNode::Element(element))
}

fn convert_inlines<'a>(node: &'a AstNode<'a>) -> Vec<CanonicalNode> {
    let mut out = Vec::new();
    collect_inlines(node, &[], &mut out);
    out
}

fn collect_inlines<'a>(node: &'a AstNode<'a>, marks: &[Mark], out: &mut Vec<CanonicalNode>) {
    for child in node.children() {
        let ast = child.data.borrow();
        match &ast.value {
            NodeValue::Text(text) => out.push(text_with_marks(text.to_string(), marks)),
            NodeValue::Code(code) => {
                let marks = with_mark(marks, Mark::new("code"));
                out.push(text_with_marks(code.literal.to_string(), &marks));
            }
            NodeValue::HtmlInline(html) => out.push(text_with_marks(html.to_string(), marks)),
            NodeValue::SoftBreak => out.push(text_with_marks(" ".to_string(), marks)),
            NodeValue::LineBreak => {
                let mut el = ElementNode::new("hard_break");
                el.marks = marks.to_vec();
                out.push(CanonicalNode::Element(el));
            }
            NodeValue::Emph => collect_inlines(child, &with_mark(marks, Mark::new("em")), out),
            NodeValue::Strong => {
                collect_inlines(child, &with_mark(marks, Mark::new("strong")), out)
            }
            NodeValue::Strikethrough => {
                collect_inlines(child, &with_mark(marks, Mark::new("strike")), out)
            }
            NodeValue::Link(link) => {
                let mut mark = Mark::new("link").with_attr("href", link.url.to_string());
                if !link.title.is_empty() {
                    mark = mark.with_attr("title", link.title.to_string());
                }
                collect_inlines(child, &with_mark(marks, mark), out);
            }
            NodeValue::Image(link) => {
                let alt = inline_text(child);
                let mut el = ElementNode::new("image")
                    .with_attr("src", link.url.to_string())
                    .with_attr("alt", alt);
                if !link.title.is_empty() {
                    el = el.with_attr("title", link.title.to_string());
                }
                el.marks = marks.to_vec();
                out.push(CanonicalNode::Element(el));
            }
            _ => collect_inlines(child, marks, out),
        }
    }
}

/// Plain text of an inline subtree (used for image alt text).
fn inline_text<'a>(node: &'a AstNode<'a>) -> String {
    let mut runs = Vec::new();
    collect_inlines(node, &[], &mut runs);
    runs.iter().map(CanonicalNode::text_content).collect()
}

fn with_mark(marks: &[Mark], mark: Mark) -> Vec<Mark> {
    let mut marks = marks.to_vec();
    marks.push(mark);
    marks
}

fn text_with_marks(text: String, marks: &[Mark]) -> CanonicalNode {
    CanonicalNode::Text(TextNode {
        text,
        marks: marks.to_vec(),
    })
}
