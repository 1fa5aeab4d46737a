//! Character-level diffing of inline content.
//!
//! The children of a text block are flattened into atoms (one per character,
//! plus one per inline element such as an image or hard break). Atoms are
//! grouped into word, whitespace and punctuation tokens, the token sequences
//! are aligned, and the result is regrouped into tagged spans. Both removed
//! and added spans are emitted, removed ones first, so a reviewer sees the
//! old wording next to the new one.

use crate::canonical::{CanonicalNode, ElementNode, Mark};
use crate::hash::element_match_key;

use super::sequence::{Edit, align};
use super::{ChangeState, DiffError, DiffNode, DiffOptions, DiffText};

#[derive(Debug, Clone, Copy)]
enum Atom<'a> {
    Char { ch: char, marks: &'a [Mark] },
    Inline(&'a ElementNode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharClass {
    Word,
    Space,
    Other,
}

impl CharClass {
    fn of(ch: char) -> Self {
        if ch.is_alphanumeric() || ch == '_' {
            CharClass::Word
        } else if ch.is_whitespace() {
            CharClass::Space
        } else {
            CharClass::Other
        }
    }
}

/// Alignment key of a token. Marks are not part of the key, so a
/// formatting-only edit aligns as equal and is reported as `changed`. Inline
/// elements are keyed by type and non-ephemeral attributes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum TokenKey {
    Text(String),
    Inline(u64),
}

struct Tokens<'a> {
    atoms: Vec<Atom<'a>>,
    /// Atom range of each token
    spans: Vec<std::ops::Range<usize>>,
    keys: Vec<TokenKey>,
}

impl<'a> Tokens<'a> {
    fn new(children: &'a [CanonicalNode], ephemeral_attrs: &[String]) -> Self {
        let mut atoms = Vec::new();
        for child in children {
            match child {
                CanonicalNode::Text(t) => {
                    atoms.extend(t.text.chars().map(|ch| Atom::Char {
                        ch,
                        marks: &t.marks,
                    }));
                }
                CanonicalNode::Element(el) => atoms.push(Atom::Inline(el)),
            }
        }

        let mut spans = Vec::new();
        let mut keys = Vec::new();
        let mut i = 0;
        while i < atoms.len() {
            match atoms[i] {
                Atom::Inline(el) => {
                    spans.push(i..i + 1);
                    keys.push(TokenKey::Inline(element_match_key(el, ephemeral_attrs)));
                    i += 1;
                }
                Atom::Char { ch, .. } => {
                    let class = CharClass::of(ch);
                    let start = i;
                    let mut text = String::new();
                    text.push(ch);
                    i += 1;
                    if class != CharClass::Other {
                        while let Some(Atom::Char { ch, .. }) = atoms.get(i)
                            && CharClass::of(*ch) == class
                        {
                            text.push(*ch);
                            i += 1;
                        }
                    }
                    spans.push(start..i);
                    keys.push(TokenKey::Text(text));
                }
            }
        }

        Tokens { atoms, spans, keys }
    }

    /// Atoms covered by a range of tokens.
    fn atoms_of(&self, tokens: std::ops::Range<usize>) -> Result<&[Atom<'a>], DiffError> {
        if tokens.is_empty() {
            return Ok(&[]);
        }
        let first = self.spans.get(tokens.start).ok_or_else(malformed)?;
        let last = self.spans.get(tokens.end - 1).ok_or_else(malformed)?;
        self.atoms.get(first.start..last.end).ok_or_else(malformed)
    }
}

fn malformed() -> DiffError {
    DiffError::MalformedDelta("token range outside of inline content".to_string())
}

/// Accumulates tagged atoms and groups them into spans.
#[derive(Default)]
struct SpanBuilder {
    out: Vec<DiffNode>,
}

impl SpanBuilder {
    fn push_char(&mut self, ch: char, marks: &[Mark], state: ChangeState) {
        if let Some(DiffNode::Text(last)) = self.out.last_mut()
            && last.state == state
            && last.marks == marks
        {
            last.text.push(ch);
            return;
        }
        self.out.push(DiffNode::Text(DiffText {
            text: ch.to_string(),
            marks: marks.to_vec(),
            state,
        }));
    }

    fn push_atom(&mut self, atom: &Atom<'_>, state: ChangeState) {
        match atom {
            Atom::Char { ch, marks } => self.push_char(*ch, marks, state),
            Atom::Inline(el) => self
                .out
                .push(DiffNode::lift(&CanonicalNode::Element((*el).clone()), state)),
        }
    }

    fn push_all(&mut self, atoms: &[Atom<'_>], state: ChangeState) {
        for atom in atoms {
            self.push_atom(atom, state);
        }
    }

    /// Atoms aligned as equal: the text matches, marks may not.
    fn push_aligned(&mut self, old: &[Atom<'_>], new: &[Atom<'_>]) -> Result<(), DiffError> {
        if old.len() != new.len() {
            return Err(DiffError::MalformedDelta(format!(
                "equal run length mismatch ({} vs {})",
                old.len(),
                new.len()
            )));
        }
        for (o, n) in old.iter().zip(new) {
            match (o, n) {
                (
                    Atom::Char {
                        ch: old_ch,
                        marks: old_marks,
                    },
                    Atom::Char { ch, marks },
                ) => {
                    if old_ch != ch {
                        return Err(DiffError::MalformedDelta(format!(
                            "equal run differs: '{old_ch}' vs '{ch}'"
                        )));
                    }
                    let state = if old_marks == marks {
                        ChangeState::Unchanged
                    } else {
                        ChangeState::Changed
                    };
                    self.push_char(*ch, marks, state);
                }
                (Atom::Inline(old_el), Atom::Inline(new_el)) => {
                    let state = if old_el == new_el {
                        ChangeState::Unchanged
                    } else {
                        ChangeState::Changed
                    };
                    self.push_atom(n, state);
                }
                _ => {
                    return Err(DiffError::MalformedDelta(
                        "equal run mixes text and inline elements".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Diff the inline children of two matched text blocks.
pub(crate) fn diff_inline(
    old: &[CanonicalNode],
    new: &[CanonicalNode],
    options: &DiffOptions,
) -> Result<Vec<DiffNode>, DiffError> {
    let old_tokens = Tokens::new(old, &options.ephemeral_attrs);
    let new_tokens = Tokens::new(new, &options.ephemeral_attrs);

    let mut builder = SpanBuilder::default();
    for edit in align(&old_tokens.keys, &new_tokens.keys) {
        match edit {
            Edit::Equal { old, new } => {
                builder.push_aligned(old_tokens.atoms_of(old)?, new_tokens.atoms_of(new)?)?;
            }
            Edit::Delete { old } => {
                builder.push_all(old_tokens.atoms_of(old)?, ChangeState::Removed);
            }
            Edit::Insert { new } => {
                builder.push_all(new_tokens.atoms_of(new)?, ChangeState::Added);
            }
            Edit::Replace { old, new } => {
                builder.push_all(old_tokens.atoms_of(old)?, ChangeState::Removed);
                builder.push_all(new_tokens.atoms_of(new)?, ChangeState::Added);
            }
        }
    }

    Ok(builder.out)
}
