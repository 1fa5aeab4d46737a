//! Ordered sequence alignment.
//!
//! A thin layer over `similar`'s Myers implementation that turns two key
//! sequences into an edit script of index ranges. Both the block level
//! (children keyed by structural hash) and the text level (tokens keyed by
//! their text) are aligned through here. Moves are never detected: an item
//! that changes position shows up as a delete plus an insert.

use std::hash::Hash;
use std::ops::Range;

use similar::{Algorithm, DiffTag, capture_diff_slices};

/// One step of an edit script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Edit {
    /// Items with equal keys on both sides (same length ranges)
    Equal { old: Range<usize>, new: Range<usize> },
    /// Items present only in the old sequence
    Delete { old: Range<usize> },
    /// Items present only in the new sequence
    Insert { new: Range<usize> },
    /// An old range replaced by a new range
    Replace { old: Range<usize>, new: Range<usize> },
}

/// Align two key sequences.
///
/// The returned script covers both inputs completely and in order.
pub(crate) fn align<K: Hash + Eq + Ord>(old: &[K], new: &[K]) -> Vec<Edit> {
    capture_diff_slices(Algorithm::Myers, old, new)
        .into_iter()
        .map(|op| {
            let (tag, old, new) = op.as_tag_tuple();
            match tag {
                DiffTag::Equal => Edit::Equal { old, new },
                DiffTag::Delete => Edit::Delete { old },
                DiffTag::Insert => Edit::Insert { new },
                DiffTag::Replace => Edit::Replace { old, new },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_identical() {
        let script = align(&[1, 2, 3], &[1, 2, 3]);
        assert_eq!(script, vec![Edit::Equal { old: 0..3, new: 0..3 }]);
    }

    #[test]
    fn test_align_insert_in_middle() {
        let script = align(&["a", "c"], &["a", "b", "c"]);
        assert_eq!(
            script,
            vec![
                Edit::Equal { old: 0..1, new: 0..1 },
                Edit::Insert { new: 1..2 },
                Edit::Equal { old: 1..2, new: 2..3 },
            ]
        );
    }

    #[test]
    fn test_align_delete_tail() {
        let script = align(&["a", "b"], &["a"]);
        assert_eq!(
            script,
            vec![Edit::Equal { old: 0..1, new: 0..1 }, Edit::Delete { old: 1..2 }]
        );
    }

    #[test]
    fn test_align_empty_sides() {
        assert!(align::<u8>(&[], &[]).is_empty());
        assert_eq!(align(&[], &[1]), vec![Edit::Insert { new: 0..1 }]);
        assert_eq!(align(&[1], &[]), vec![Edit::Delete { old: 0..1 }]);
    }

    #[test]
    fn test_align_covers_both_sides() {
        let old = [1, 2, 3, 4, 5, 6];
        let new = [2, 9, 4, 6, 7];
        let script = align(&old, &new);

        let mut old_covered = 0;
        let mut new_covered = 0;
        for edit in &script {
            match edit {
                Edit::Equal { old: o, new: n } => {
                    assert_eq!(o.start, old_covered);
                    assert_eq!(n.start, new_covered);
                    assert_eq!(o.len(), n.len());
                    old_covered = o.end;
                    new_covered = n.end;
                }
                Edit::Delete { old: o } => {
                    assert_eq!(o.start, old_covered);
                    old_covered = o.end;
                }
                Edit::Insert { new: n } => {
                    assert_eq!(n.start, new_covered);
                    new_covered = n.end;
                }
                Edit::Replace { old: o, new: n } => {
                    assert_eq!(o.start, old_covered);
                    assert_eq!(n.start, new_covered);
                    old_covered = o.end;
                    new_covered = n.end;
                }
            }
        }
        assert_eq!(old_covered, old.len());
        assert_eq!(new_covered, new.len());
    }
}
