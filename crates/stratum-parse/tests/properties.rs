use std::cell::RefCell;

use proptest::prelude::*;
use stratum_fixtures::{arithmetic, list};
use stratum_inputs::ChangedRange;
use stratum_parse::ParseConfig;
use stratum_tree::{DEFAULT_MIN_GAP, Parser as _, Tree, TreeFragment};

/// Every node lies inside its parent.
fn check_coverage(tree: &Tree, length: u32) {
    let open = RefCell::new(vec![(0, length)]);
    tree.iterate(
        0,
        length,
        |node| {
            let mut open = open.borrow_mut();
            let &(from, to) = open.last().unwrap();
            assert!(node.from() <= node.to());
            assert!(
                from <= node.from() && node.to() <= to,
                "{}..{} outside {from}..{to}",
                node.from(),
                node.to()
            );
            open.push((node.from(), node.to()));
            true
        },
        |_| {
            open.borrow_mut().pop();
        },
    );
}

fn numbers_text(numbers: &[u16]) -> String {
    numbers.iter().map(u16::to_string).collect::<Vec<_>>().join("+")
}

proptest! {
    #[test]
    fn parsing_is_deterministic(text in "[0-9+ #\n]{0,40}") {
        let grammar = arithmetic::ambiguous();
        let first = grammar.parse(&text).unwrap();
        let second = grammar.parse(&text).unwrap();
        prop_assert_eq!(first.to_string(), second.to_string());
    }

    #[test]
    fn trees_cover_the_whole_input(text in "[0-9a+ #\n]{0,60}") {
        let tree = arithmetic::grammar().parse(&text).unwrap();
        prop_assert_eq!(tree.length() as usize, text.len());
        check_coverage(&tree, tree.length());
    }

    #[test]
    fn recovery_always_finishes(text in "\\PC{0,30}") {
        let tree = list::grammar().parse(&text).unwrap();
        prop_assert_eq!(tree.length() as usize, text.len());
        check_coverage(&tree, tree.length());
    }

    #[test]
    fn incremental_parses_match_fresh_ones(
        numbers in proptest::collection::vec(0u16..1000, 20..80),
        index in any::<prop::sample::Index>(),
        replacement in 0u16..1000,
    ) {
        let grammar = arithmetic::grammar().configure(ParseConfig::DEFAULT.with_buffer_length(8));
        let old_text = numbers_text(&numbers);
        let old = grammar.parse(&old_text).unwrap();

        let index = index.index(numbers.len());
        let from = numbers[..index].iter().map(|n| n.to_string().len() + 1).sum::<usize>();
        let to = from + numbers[index].to_string().len();
        let mut edited = numbers.clone();
        edited[index] = replacement;
        let new_text = numbers_text(&edited);
        let change = ChangedRange::replace(from as u32, to as u32, replacement.to_string().len() as u32);

        let fragments = TreeFragment::apply_changes(
            &TreeFragment::add_tree(old, &[], false),
            &[change],
            DEFAULT_MIN_GAP,
        );
        let incremental = grammar.parse_incremental(&new_text, &fragments, &[]).unwrap();
        let fresh = grammar.parse(&new_text).unwrap();
        prop_assert_eq!(incremental.to_string(), fresh.to_string());
        prop_assert_eq!(incremental.length(), fresh.length());
    }
}
