use std::sync::Arc;

use expect_test::expect;
use pretty_assertions::assert_eq;
use stratum_errors::Error;
use stratum_fixtures::{arithmetic, template};
use stratum_inputs::{ChangedRange, TextRange, TextSize};
use stratum_tree::{DEFAULT_MIN_GAP, NodeProp, Parser, Tree, TreeFragment, parse_with_budget};

use crate::{MixedParser, NestedParse, SkippingParser, parse_mixed};

fn range(from: u32, to: u32) -> TextRange {
    TextRange::new(TextSize::new(from), TextSize::new(to))
}

/// Templates whose embeds, minus their braces, hold sums.
fn sums_in_templates() -> MixedParser {
    let sums: Arc<dyn Parser> = Arc::new(arithmetic::grammar());
    parse_mixed(Arc::new(template::grammar()), move |node, _| {
        let length = node.to() - node.from();
        (node.name() == "Embed" && length >= 2)
            .then(|| NestedParse::overlay(sums.clone(), vec![range(1, length - 1)]))
    })
}

fn mounted_trees(tree: &Tree) -> Vec<Tree> {
    let mut found = Vec::new();
    tree.iterate(
        0,
        tree.length(),
        |node| {
            if let Some(mounted) = node.tree().and_then(|t| t.prop(NodeProp::MOUNTED)) {
                found.push(mounted.tree().clone());
            }
            true
        },
        |_| {},
    );
    found
}

#[test]
fn overlays_are_reachable_through_resolve_inner() {
    let text = "a{1+2}b";
    let tree = sums_in_templates().parse(&text).unwrap();
    expect!["Document(Text,Embed,Text)"].assert_eq(&tree.to_string());
    assert_eq!(tree.length(), 7);
    assert_eq!(tree.resolve(2, 1).unwrap().name(), "Embed");

    let inner = tree.resolve_inner(2, 1).unwrap();
    assert_eq!(inner.name(), "Number");
    assert_eq!((inner.from(), inner.to()), (2, 3));
    assert_eq!(tree.resolve_inner(4, 1).unwrap().name(), "Number");
    assert_eq!(tree.resolve_inner(0, 1).unwrap().name(), "Text");

    let mounted = mounted_trees(&tree);
    assert_eq!(mounted.len(), 1);
    expect![[r#"Program(E(E(Number),"+",E(Number)))"#]].assert_eq(&mounted[0].to_string());
}

#[test]
fn skipped_content_disappears_from_the_tree() {
    let parser = parse_mixed(Arc::new(template::grammar()), |node, _| {
        (node.name() == "Embed").then(NestedParse::skipping)
    });
    let tree = parser.parse(&"a{x}b").unwrap();
    expect!["Document(Text,Text)"].assert_eq(&tree.to_string());
    assert_eq!(tree.length(), 5);
}

#[test]
fn skipping_parser_covers_its_ranges() {
    let text = "abcdef";
    let tree = SkippingParser.parse_incremental(&text, &[], &[range(1, 2), range(4, 5)]).unwrap();
    assert_eq!(tree.length(), 4);
    assert!(tree.ty().is_anonymous());
    assert!(tree.children().is_empty());
}

#[test]
fn documents_without_nested_content_are_unchanged() {
    let text = "plain text";
    let mixed = sums_in_templates().parse(&text).unwrap();
    let plain = template::grammar().parse(&text).unwrap();
    assert_eq!(mixed.to_string(), plain.to_string());
    assert!(mounted_trees(&mixed).is_empty());
}

#[test]
fn nested_parses_advance_in_steps() {
    let text = "{1}{2+3}";
    let parser = sums_in_templates();
    let mut parse = parser.create_parse(&text, &[], &[]).unwrap();
    assert!(parse_with_budget(&mut *parse, || true).unwrap().is_none());
    let tree = parse_with_budget(&mut *parse, || false).unwrap().unwrap();
    assert_eq!(mounted_trees(&tree).len(), 2);
    assert_eq!(parse.parsed_pos(), 8);
}

#[test]
fn overlays_must_stay_inside_their_node() {
    let sums: Arc<dyn Parser> = Arc::new(arithmetic::grammar());
    let parser = parse_mixed(Arc::new(template::grammar()), move |node, _| {
        (node.name() == "Embed").then(|| NestedParse::overlay(sums.clone(), vec![range(0, 50)]))
    });
    assert!(matches!(parser.parse(&"{1}"), Err(Error::InvalidRanges(_))));
}

#[test]
fn unchanged_mounts_are_reused() {
    let parser = sums_in_templates();
    let old_text = format!("{}{{1+2}}{}", "x".repeat(300), "y".repeat(300));
    let old = parser.parse(&old_text).unwrap();

    let new_text = format!("z{old_text}");
    let fragments = TreeFragment::apply_changes(
        &TreeFragment::add_tree(old.clone(), &[], false),
        &[ChangedRange::replace(0, 0, 1)],
        DEFAULT_MIN_GAP,
    );
    let new = parser.parse_incremental(&new_text, &fragments, &[]).unwrap();
    assert_eq!(new.length() as usize, new_text.len());
    assert_eq!(new.resolve_inner(302, 1).unwrap().name(), "Number");

    let (old_mounts, new_mounts) = (mounted_trees(&old), mounted_trees(&new));
    assert_eq!(new_mounts.len(), 1);
    assert!(old_mounts[0].ptr_eq(&new_mounts[0]));
}

#[test]
fn edited_mounts_are_parsed_again() {
    let parser = sums_in_templates();
    let old_text = "a{1+2}b";
    let old = parser.parse(&old_text).unwrap();

    let new_text = "a{1+23}b";
    let fragments = TreeFragment::apply_changes(
        &TreeFragment::add_tree(old.clone(), &[], false),
        &[ChangedRange::replace(5, 5, 1)],
        DEFAULT_MIN_GAP,
    );
    let new = parser.parse_incremental(&new_text, &fragments, &[]).unwrap();
    let inner = new.resolve_inner(5, 1).unwrap();
    assert_eq!(inner.name(), "Number");
    assert_eq!((inner.from(), inner.to()), (4, 6));
    assert!(!mounted_trees(&old)[0].ptr_eq(&mounted_trees(&new)[0]));
}

#[test]
fn stop_positions_past_the_document_are_rejected() {
    let text = "a{1}b";
    let parser = sums_in_templates();
    let mut parse = parser.create_parse(&text, &[], &[]).unwrap();
    assert_eq!(parse.stop_at(6), Err(Error::InvalidPosition { pos: 6, len: 5 }));
    assert_eq!(parse.stopped_at(), None);

    let mut skipping = SkippingParser.create_parse(&text, &[], &[]).unwrap();
    assert_eq!(skipping.stop_at(9), Err(Error::InvalidPosition { pos: 9, len: 5 }));
    skipping.stop_at(3).unwrap();
    assert_eq!(skipping.stop_at(4), Err(Error::StopAtMovedForward { current: 3, requested: 4 }));
}
