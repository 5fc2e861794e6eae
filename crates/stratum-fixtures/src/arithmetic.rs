//! Sums of numbers: `E -> E "+" E | Number`, left associative, with
//! spaces and `#` line comments skipped.
//!
//! The [`ambiguous`] variant leaves the `E "+" E . "+"` conflict in the
//! tables, so every `+` after the second number forks the parse.

use std::sync::Arc;

use stratum_parse::{
    DfaState, Grammar, GrammarSpec, TableBuilder, TokenGroup, Tokenizer, reduce, stay,
};
use stratum_tree::{NodeFlags, NodeSet, NodeType, PropMap};

use crate::{error_node, node, top_node};

pub const PROGRAM: u32 = 1;
pub const E: u32 = 2;
pub const NUMBER: u32 = 3;
pub const PLUS: u32 = 4;
pub const COMMENT: u32 = 5;
pub const EOF: u32 = 6;
pub const SPACE: u32 = 7;

pub fn grammar() -> Grammar {
    build(false)
}

pub fn ambiguous() -> Grammar {
    build(true)
}

pub fn node_set() -> NodeSet {
    NodeSet::new(vec![
        error_node(),
        top_node(PROGRAM, "Program"),
        node(E, "E"),
        node(NUMBER, "Number"),
        node(PLUS, "+"),
        NodeType::define(COMMENT as u16, "Comment", NodeFlags::SKIPPED, PropMap::new()),
    ])
}

pub fn tokenizer() -> TokenGroup {
    let rest_of_line = vec![('\0', '\t', 4), ('\u{b}', char::MAX, 4)];
    TokenGroup::new(vec![
        DfaState::new(
            vec![],
            vec![('0', '9', 1), ('+', '+', 2), (' ', ' ', 3), ('\n', '\n', 3), ('#', '#', 4)],
        ),
        DfaState::new(vec![NUMBER], vec![('0', '9', 1)]),
        DfaState::new(vec![PLUS], vec![]),
        DfaState::new(vec![SPACE], vec![(' ', ' ', 3), ('\n', '\n', 3)]),
        DfaState::new(vec![COMMENT], rest_of_line),
    ])
    .expect("arithmetic token automaton is valid")
}

fn build(ambiguous: bool) -> Grammar {
    let mut tables = TableBuilder::new();
    let start = tables.state();
    let number = tables.state();
    let left = tables.state();
    let plus = tables.state();
    let right = tables.state();

    tables.shift(start, NUMBER, number).goto(start, E, left);
    tables.default_reduce(number, reduce(E, 1)).forced_reduce(number, reduce(E, 1));
    tables.accepting(left).shift(left, PLUS, plus);
    tables.shift(plus, NUMBER, number).goto(plus, E, right);
    tables.forced_reduce(right, reduce(E, 3));
    if ambiguous {
        tables.shift(right, PLUS, plus).reduce(right, PLUS, E, 3).reduce(right, EOF, E, 3);
    } else {
        tables.default_reduce(right, reduce(E, 3));
    }
    for state in [start, number, left, plus, right] {
        tables.skip(state, SPACE, stay()).skip(state, COMMENT, stay());
    }

    let tokenizers: Vec<Arc<dyn Tokenizer>> = vec![Arc::new(tokenizer())];
    let spec = GrammarSpec::new(tables.finish(), node_set(), tokenizers, (start, PROGRAM), EOF);
    Grammar::new(spec).expect("arithmetic tables are valid")
}
