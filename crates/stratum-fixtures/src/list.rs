//! Nested bracketed lists of numbers, words and the `null` keyword, as in
//! `[1 [a b] null]`.
//!
//! Values inside a list are collected with a repeat term, so long lists
//! come out balanced. `null` is a word specialized by its text.

use std::sync::Arc;

use stratum_parse::{
    DfaState, Grammar, GrammarSpec, SpecializeKind, Specializer, TableBuilder, TokenGroup,
    Tokenizer, reduce, repeat, stay,
};
use stratum_tree::{NodeFlags, NodeProp, NodeSet, NodeType, PropMap};

use crate::{error_node, node, top_node};

pub const DOCUMENT: u32 = 1;
pub const LIST: u32 = 2;
pub const NUMBER: u32 = 3;
pub const WORD: u32 = 4;
pub const NULL: u32 = 5;
pub const OPEN: u32 = 6;
pub const CLOSE: u32 = 7;
pub const VALUES: u32 = 8;
pub const EOF: u32 = 9;
pub const SPACE: u32 = 10;

pub fn node_set() -> NodeSet {
    let names = |names: &[&str]| -> Box<[Box<str>]> { names.iter().map(|&n| n.into()).collect() };
    NodeSet::new(vec![
        error_node(),
        top_node(DOCUMENT, "Document"),
        node(LIST, "List"),
        node(NUMBER, "Number"),
        node(WORD, "Word"),
        node(NULL, "null"),
        NodeType::define(
            OPEN as u16,
            "[",
            NodeFlags::empty(),
            PropMap::new().with(NodeProp::CLOSED_BY, names(&["]"])),
        ),
        NodeType::define(
            CLOSE as u16,
            "]",
            NodeFlags::empty(),
            PropMap::new().with(NodeProp::OPENED_BY, names(&["["])),
        ),
        node(VALUES, ""),
    ])
}

pub fn tokenizer() -> TokenGroup {
    let letters = |target| [('a', 'z', target), ('A', 'Z', target)];
    let mut start = vec![('0', '9', 1), ('[', '[', 3), (']', ']', 4), (' ', ' ', 5), ('\n', '\n', 5)];
    start.extend(letters(2));
    TokenGroup::new(vec![
        DfaState::new(vec![], start),
        DfaState::new(vec![NUMBER], vec![('0', '9', 1)]),
        DfaState::new(vec![WORD], letters(2).to_vec()),
        DfaState::new(vec![OPEN], vec![]),
        DfaState::new(vec![CLOSE], vec![]),
        DfaState::new(vec![SPACE], vec![(' ', ' ', 5), ('\n', '\n', 5)]),
    ])
    .expect("list token automaton is valid")
}

pub fn grammar() -> Grammar {
    let mut tables = TableBuilder::new();
    let start = tables.state();
    let done = tables.state();
    let open = tables.state();
    let value = tables.state();
    let values = tables.state();
    let empty = tables.state();
    let pair = tables.state();
    let closed = tables.state();

    for state in [start, open, values] {
        for term in [NUMBER, WORD, NULL] {
            tables.shift(state, term, if state == start { done } else { value });
        }
        tables.shift(state, OPEN, open);
    }
    tables.goto(start, LIST, done).goto(open, LIST, value).goto(values, LIST, value);
    tables.goto(open, VALUES, values).goto(values, VALUES, pair);

    tables.accepting(done);
    tables.shift(open, CLOSE, empty).forced_reduce(open, reduce(LIST, 1));
    tables.default_reduce(value, reduce(VALUES, 1)).forced_reduce(value, reduce(VALUES, 1));
    tables.shift(values, CLOSE, closed).forced_reduce(values, reduce(LIST, 2));
    tables.default_reduce(empty, reduce(LIST, 2)).forced_reduce(empty, reduce(LIST, 2));
    tables.default_reduce(pair, repeat(VALUES, 2)).forced_reduce(pair, repeat(VALUES, 2));
    tables.default_reduce(closed, reduce(LIST, 3)).forced_reduce(closed, reduce(LIST, 3));
    for state in [start, done, open, value, values, empty, pair, closed] {
        tables.skip(state, SPACE, stay());
    }

    let tokenizers: Vec<Arc<dyn Tokenizer>> = vec![Arc::new(tokenizer())];
    let mut spec = GrammarSpec::new(tables.finish(), node_set(), tokenizers, (start, DOCUMENT), EOF);
    spec.min_repeat_term = VALUES;
    spec.specializers.push(Specializer::new(WORD, SpecializeKind::Replace, [("null", NULL)]));
    Grammar::new(spec).expect("list tables are valid")
}
