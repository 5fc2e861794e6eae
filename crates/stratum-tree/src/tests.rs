use std::sync::Arc;

use expect_test::expect;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use stratum_errors::{Error, Result};
use stratum_inputs::{Input, TextRange};

use crate::*;

fn node_set() -> NodeSet {
    let ty = |id, name: &str| NodeType::define(id, name, NodeFlags::empty(), PropMap::new());
    NodeSet::new(vec![
        NodeType::define(0, "⚠", NodeFlags::ERROR, PropMap::new()),
        NodeType::define(1, "Doc", NodeFlags::TOP, PropMap::new()),
        ty(2, "Para"),
        ty(3, "Word"),
        ty(4, ""),
    ])
}

fn leaf(set: &NodeSet, id: u16, length: u32) -> Subtree {
    Subtree::Tree(Tree::new(set.get(id).clone(), Vec::new(), Vec::new(), length))
}

/// `Doc(Para(Word,Word),Para(Word),⚠,Word)` over 20 bytes, with the last
/// three nodes inside an anonymous group and words stored in buffers.
fn sample(set: &NodeSet) -> Tree {
    let words = TreeBuffer::new(vec![3, 0, 4, 4, 3, 5, 9, 8], 9, set.clone());
    let first = Tree::new(set.get(2).clone(), vec![words.into()], vec![0], 9);
    let word = TreeBuffer::new(vec![3, 0, 4, 4], 4, set.clone());
    let second = Tree::new(set.get(2).clone(), vec![word.into()], vec![0], 4);
    let group = Tree::new(
        set.get(4).clone(),
        vec![second.into(), leaf(set, 0, 0), leaf(set, 3, 4)],
        vec![0, 5, 6],
        10,
    );
    Tree::new(set.get(1).clone(), vec![first.into(), group.into()], vec![0, 10], 20)
}

fn position(cursor: &TreeCursor) -> String {
    format!("{}@{}..{}", cursor.name(), cursor.from(), cursor.to())
}

#[test]
fn display_flattens_anonymous_nodes() {
    let tree = sample(&node_set());
    expect!["Doc(Para(Word,Word),Para(Word),⚠,Word)"].assert_eq(&tree.to_string());
}

#[test]
fn cursor_walks_visible_nodes() {
    let tree = sample(&node_set());
    let mut cursor = tree.cursor();
    let mut visited = vec![position(&cursor)];
    assert!(cursor.first_child());
    visited.push(position(&cursor));
    assert!(cursor.first_child());
    visited.push(position(&cursor));
    assert!(cursor.next_sibling());
    visited.push(position(&cursor));
    assert!(!cursor.next_sibling());
    assert!(cursor.parent());
    while cursor.next_sibling() {
        visited.push(position(&cursor));
    }
    assert!(cursor.prev_sibling());
    visited.push(position(&cursor));
    assert!(cursor.parent());
    visited.push(position(&cursor));
    assert!(!cursor.parent());

    expect![[r#"
        [
            "Doc@0..20",
            "Para@0..9",
            "Word@0..4",
            "Word@5..9",
            "Para@10..14",
            "⚠@15..15",
            "Word@16..20",
            "⚠@15..15",
            "Doc@0..20",
        ]
    "#]]
    .assert_debug_eq(&visited);
}

#[test]
fn include_anonymous_stops_on_groups() {
    let tree = sample(&node_set());
    let mut cursor = tree.cursor_with(IterMode::INCLUDE_ANONYMOUS);
    assert!(cursor.first_child());
    assert!(cursor.next_sibling());
    assert_eq!(position(&cursor), "@10..20");
    assert!(cursor.ty().is_anonymous());
}

#[test]
fn child_before_and_after() {
    let tree = sample(&node_set());
    let mut cursor = tree.cursor();
    assert!(cursor.child_before(10));
    assert_eq!(position(&cursor), "Para@0..9");

    let mut cursor = tree.cursor();
    assert!(cursor.child_after(9));
    assert_eq!(position(&cursor), "Para@10..14");

    let mut cursor = tree.cursor();
    assert!(!cursor.child_after(20));
    assert_eq!(position(&cursor), "Doc@0..20");
}

#[test]
fn resolve_respects_side() {
    let tree = sample(&node_set());
    assert_eq!(position(&tree.resolve(6, 1).unwrap()), "Word@5..9");
    assert_eq!(position(&tree.resolve(4, -1).unwrap()), "Word@0..4");
    assert_eq!(position(&tree.resolve(4, 1).unwrap()), "Para@0..9");
    assert_eq!(position(&tree.resolve(12, 0).unwrap()), "Word@10..14");
    assert_eq!(position(&tree.resolve(10, 0).unwrap()), "Doc@0..20");
    assert_eq!(position(&tree.resolve(10, 1).unwrap()), "Word@10..14");

    let mut cursor = tree.resolve(6, 1).unwrap();
    cursor.move_to(17, 0);
    assert_eq!(position(&cursor), "Word@16..20");

    assert_eq!(position(&tree.resolve(20, -1).unwrap()), "Word@16..20");
    assert_eq!(tree.resolve(21, -1).err(), Some(Error::InvalidPosition { pos: 21, len: 20 }));
    assert!(tree.cursor_at(100, 0).is_err());
}

#[test]
fn iterate_can_skip_children() {
    let tree = sample(&node_set());
    let mut entered = Vec::new();
    let mut left = 0;
    tree.iterate(
        0,
        tree.length(),
        |node| {
            entered.push(node.name().to_owned());
            node.name() != "Para" || node.from() >= 10
        },
        |_| left += 1,
    );
    assert_eq!(entered, ["Doc", "Para", "Para", "Word", "⚠", "Word"]);
    // Everything but the skipped paragraph.
    assert_eq!(left, 5);
}

#[test]
fn iterate_restricts_to_range() {
    let tree = sample(&node_set());
    let mut entered = Vec::new();
    tree.iterate(
        11,
        13,
        |node| {
            entered.push(position(node));
            true
        },
        |_| {},
    );
    assert_eq!(entered, ["Doc@0..20", "Para@10..14", "Word@10..14"]);
}

#[test]
fn buffer_expands_to_same_shape() {
    let set = node_set();
    let buffer = TreeBuffer::new(vec![2, 0, 9, 12, 3, 0, 4, 8, 3, 5, 9, 12, 3, 10, 12, 16], 12, set);
    let tree = buffer.to_tree();
    assert_eq!(tree.to_string(), buffer.to_string());
    expect!["Para(Word,Word),Word"].assert_eq(&tree.to_string());
    assert_eq!(tree.positions(), &[0, 10]);
    assert_eq!(tree.flatten(), buffer.data());
}

#[test]
fn diagnostics_point_at_error_nodes() {
    let tree = sample(&node_set());
    let diagnostics = collect_diagnostics(&tree);
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].message(), "missing syntax");
    assert_eq!(diagnostics[0].range(), TextRange::new(15.into(), 15.into()));
}

struct NullParser;

impl Parser for NullParser {
    fn create_parse<'a>(
        &self,
        _input: &'a dyn Input,
        _fragments: &[TreeFragment],
        _ranges: &[TextRange],
    ) -> Result<Box<dyn PartialParse + 'a>> {
        Err(Error::NoParse { pos: 0 })
    }
}

fn inner_set() -> NodeSet {
    NodeSet::new(vec![
        NodeType::define(0, "Inner", NodeFlags::TOP, PropMap::new()),
        NodeType::define(1, "Name", NodeFlags::empty(), PropMap::new()),
    ])
}

#[test]
fn mounted_trees_replace_their_host() {
    let set = node_set();
    let inner = inner_set();
    let mounted = Tree::new(inner.get(0).clone(), vec![leaf(&inner, 1, 4)], vec![0], 4);
    let host = Tree::new(set.get(2).clone(), vec![leaf(&set, 3, 4)], vec![0], 4).set_prop(
        NodeProp::MOUNTED,
        MountedTree::new(mounted, None, Arc::new(NullParser)),
    );
    let doc = Tree::new(set.get(1).clone(), vec![host.into()], vec![3], 7);

    expect!["Doc(Inner(Name))"].assert_eq(&doc.to_string());
    assert_eq!(position(&doc.resolve(4, 1).unwrap()), "Name@3..7");

    let mut cursor = doc.cursor_with(IterMode::IGNORE_MOUNTS);
    cursor.move_to(4, 1);
    assert_eq!(position(&cursor), "Word@3..7");
}

#[test]
fn resolve_inner_enters_overlays() {
    let set = node_set();
    let inner = inner_set();
    // Overlay ranges 2..5 and 10..15 of the host, which starts at 0.
    let mounted = Tree::new(
        inner.get(0).clone(),
        vec![leaf(&inner, 1, 3), leaf(&inner, 1, 5)],
        vec![0, 8],
        13,
    );
    let overlay = vec![TextRange::new(2.into(), 5.into()), TextRange::new(10.into(), 15.into())];
    let host = Tree::new(set.get(2).clone(), vec![leaf(&set, 3, 5)], vec![5], 20).set_prop(
        NodeProp::MOUNTED,
        MountedTree::new(mounted, Some(overlay), Arc::new(NullParser)),
    );
    let doc = Tree::new(set.get(1).clone(), vec![host.into()], vec![0], 20);

    expect!["Doc(Para(Word))"].assert_eq(&doc.to_string());
    assert_eq!(position(&doc.resolve(11, 1).unwrap()), "Para@0..20");
    assert_eq!(position(&doc.resolve_inner(11, 1).unwrap()), "Name@10..15");
    assert_eq!(position(&doc.resolve_inner(3, 1).unwrap()), "Name@2..5");
    assert_eq!(position(&doc.resolve_inner(7, 1).unwrap()), "Word@5..10");

    let mut cursor = doc.resolve_inner(11, 1).unwrap();
    assert!(cursor.parent());
    assert_eq!(position(&cursor), "Inner@2..15");
    assert!(cursor.parent());
    assert_eq!(position(&cursor), "Para@0..20");
}

/// Encodes nesting operations as a postfix buffer: 0 adds a one-byte Word
/// followed by a space, 1 opens a Para, 2 closes it.
fn postfix(ops: &[u8]) -> (Vec<i32>, u32) {
    struct Open {
        at: usize,
        start: Option<i32>,
        end: i32,
    }
    fn close(buffer: &mut Vec<i32>, open: &mut Vec<Open>, node: Open, pos: i32) {
        let start = node.start.unwrap_or(pos);
        let end = if node.start.is_some() { node.end } else { pos };
        buffer.extend([2, start, end, (buffer.len() - node.at) as i32 + 4]);
        if let Some(parent) = open.last_mut() {
            parent.start.get_or_insert(start);
            parent.end = end;
        }
    }

    let mut buffer = Vec::new();
    let mut open: Vec<Open> = Vec::new();
    let mut pos = 0;
    for &op in ops {
        match op {
            0 => {
                buffer.extend([3, pos, pos + 1, 4]);
                if let Some(parent) = open.last_mut() {
                    parent.start.get_or_insert(pos);
                    parent.end = pos + 1;
                }
                pos += 2;
            }
            1 => open.push(Open { at: buffer.len(), start: None, end: pos }),
            _ => {
                if let Some(node) = open.pop() {
                    close(&mut buffer, &mut open, node, pos);
                }
            }
        }
    }
    while let Some(node) = open.pop() {
        close(&mut buffer, &mut open, node, pos);
    }
    (buffer, pos as u32)
}

fn walk(tree: &Tree) -> Vec<(String, u32, u32)> {
    let mut nodes = Vec::new();
    tree.iterate(
        0,
        tree.length(),
        |node| {
            nodes.push((node.name().to_owned(), node.from(), node.to()));
            true
        },
        |_| {},
    );
    nodes
}

proptest! {
    #[test]
    fn buffers_preserve_structure(ops in proptest::collection::vec(0u8..3, 0..300)) {
        let set = node_set();
        let (buffer, length) = postfix(&ops);

        let mut plain = BuildConfig::new(&set, 1);
        plain.max_buffer_length = 0;
        plain.length = Some(length);
        let unbuffered = build(FlatBufferCursor::new(&buffer), &plain);

        let mut packed = BuildConfig::new(&set, 1);
        packed.max_buffer_length = 8;
        packed.length = Some(length);
        let buffered = build(FlatBufferCursor::new(&buffer), &packed);

        prop_assert_eq!(unbuffered.to_string(), buffered.to_string());
        prop_assert_eq!(walk(&unbuffered), walk(&buffered));
        prop_assert_eq!(buffered.length(), length);
    }
}
