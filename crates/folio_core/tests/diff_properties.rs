//! Property tests for the diff engine.

use folio_core::canonical::{CanonicalNode, ElementNode, Mark, TextNode};
use folio_core::diff::{ChangeState, DiffNode, diff};
use proptest::prelude::*;

fn arb_marks() -> impl Strategy<Value = Vec<Mark>> {
    prop::sample::subsequence(vec!["strong", "em", "code"], 0..=2)
        .prop_map(|names| names.into_iter().map(Mark::new).collect())
}

fn arb_inline() -> impl Strategy<Value = CanonicalNode> {
    prop_oneof![
        4 => ("[a-c ,]{0,8}", arb_marks())
            .prop_map(|(text, marks)| CanonicalNode::Text(TextNode { text, marks })),
        1 => Just(CanonicalNode::element("hard_break", vec![])),
        1 => "[xy]".prop_map(|src| {
            CanonicalNode::Element(ElementNode::new("image").with_attr("src", src))
        }),
    ]
}

fn arb_block() -> impl Strategy<Value = CanonicalNode> {
    let leaf = prop_oneof![
        prop::collection::vec(arb_inline(), 0..5)
            .prop_map(|children| CanonicalNode::element("paragraph", children)),
        (1..=3i64, prop::collection::vec(arb_inline(), 0..4)).prop_map(|(level, children)| {
            CanonicalNode::Element(
                ElementNode::new("heading")
                    .with_attr("level", level)
                    .with_children(children),
            )
        }),
    ];

    leaf.prop_recursive(2, 16, 3, |inner| {
        prop::collection::vec(
            prop::collection::vec(inner, 1..3)
                .prop_map(|children| CanonicalNode::element("list_item", children)),
            1..4,
        )
        .prop_map(|items| CanonicalNode::element("bullet_list", items))
    })
}

fn arb_doc() -> impl Strategy<Value = CanonicalNode> {
    prop::collection::vec(arb_block(), 0..5).prop_map(CanonicalNode::doc)
}

/// A document plus a copy of it with extra blocks inserted.
fn arb_insertion() -> impl Strategy<Value = (CanonicalNode, CanonicalNode, usize)> {
    (
        prop::collection::vec(arb_block(), 0..5),
        prop::collection::vec((any::<prop::sample::Index>(), arb_block()), 1..3),
    )
        .prop_map(|(base, inserts)| {
            let count = inserts.len();
            let mut extended = base.clone();
            for (index, block) in inserts {
                let at = index.index(extended.len() + 1);
                extended.insert(at, block);
            }
            (
                CanonicalNode::doc(base),
                CanonicalNode::doc(extended),
                count,
            )
        })
}

fn all_unchanged(node: &DiffNode) -> bool {
    node.state() == ChangeState::Unchanged && node.children().iter().all(all_unchanged)
}

fn count_top_level(node: &DiffNode, state: ChangeState) -> usize {
    node.children().iter().filter(|c| c.state() == state).count()
}

proptest! {
    #[test]
    fn diff_of_identical_trees_is_unchanged(doc in arb_doc()) {
        let result = diff(&doc, &doc);
        prop_assert!(all_unchanged(&result));
        prop_assert!(!result.has_changes());
    }

    #[test]
    fn new_side_reconstructs_new_tree(old in arb_doc(), new in arb_doc()) {
        let result = diff(&old, &new);
        prop_assert_eq!(result.new_side(), Some(new.canonicalize()));
    }

    #[test]
    fn root_is_never_added_or_removed(old in arb_doc(), new in arb_doc()) {
        let state = diff(&old, &new).state();
        prop_assert!(state != ChangeState::Added && state != ChangeState::Removed);
    }

    #[test]
    fn diff_is_deterministic(old in arb_doc(), new in arb_doc()) {
        prop_assert_eq!(diff(&old, &new), diff(&old, &new));
    }

    #[test]
    fn insertions_mirror_removals((base, extended, count) in arb_insertion()) {
        let forward = diff(&base, &extended);
        let backward = diff(&extended, &base);

        prop_assert_eq!(count_top_level(&forward, ChangeState::Added), count);
        prop_assert_eq!(count_top_level(&forward, ChangeState::Removed), 0);
        prop_assert_eq!(count_top_level(&backward, ChangeState::Removed), count);
        prop_assert_eq!(count_top_level(&backward, ChangeState::Added), 0);
    }

    #[test]
    fn annotated_tree_round_trips_through_json(old in arb_doc(), new in arb_doc()) {
        let result = diff(&old, &new);
        let json = serde_json::to_string(&result).unwrap();
        let parsed: CanonicalNode = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(parsed, result.to_canonical());
    }
}
