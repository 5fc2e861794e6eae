//! Space-separated words and numbers where `let` is a contextual keyword:
//! `let x` is a binding, but `let` on its own is a plain word. The keyword
//! is offered next to the word and the parse forks, with bindings winning
//! through a dynamic precedence.
//!
//! After `let`, a fallback tokenizer accepts any run of non-space
//! characters as a name, so `let 42` is a binding too.
//!
//! [`grammar`] finds the keyword with an extending specializer,
//! [`with_keyword_tokenizer`] with an extending tokenizer in front of the
//! word automaton. Both produce the same trees.

use std::sync::Arc;

use stratum_parse::{
    DfaState, ExternalTokenizer, Grammar, GrammarSpec, InputStream, SpecializeKind, Specializer,
    StackView, TableBuilder, TokenGroup, Tokenizer, TokenizerOptions, reduce, repeat, stay,
};
use stratum_tree::NodeSet;

use crate::{error_node, node, top_node};

pub const DOCUMENT: u32 = 1;
pub const BINDING: u32 = 2;
pub const WORD: u32 = 3;
pub const NUMBER: u32 = 4;
pub const LET: u32 = 5;
pub const NAME: u32 = 6;
pub const ITEMS: u32 = 7;
pub const EOF: u32 = 8;
pub const SPACE: u32 = 9;

pub fn node_set() -> NodeSet {
    NodeSet::new(vec![
        error_node(),
        top_node(DOCUMENT, "Document"),
        node(BINDING, "Binding"),
        node(WORD, "Word"),
        node(NUMBER, "Number"),
        node(LET, "let"),
        node(NAME, "Name"),
        node(ITEMS, ""),
    ])
}

pub fn tokenizer() -> TokenGroup {
    TokenGroup::new(vec![
        DfaState::new(vec![], vec![('a', 'z', 1), ('0', '9', 2), (' ', ' ', 3)]),
        DfaState::new(vec![WORD], vec![('a', 'z', 1)]),
        DfaState::new(vec![NUMBER], vec![('0', '9', 2)]),
        DfaState::new(vec![SPACE], vec![(' ', ' ', 3)]),
    ])
    .expect("keyword token automaton is valid")
}

fn read_name(input: &mut InputStream<'_>, _stack: &StackView<'_>) {
    let start = input.pos();
    while input.next().is_some_and(|ch| ch != ' ') {
        input.advance();
    }
    if input.pos() > start {
        input.accept_token(NAME);
    }
}

fn read_keyword(input: &mut InputStream<'_>, _stack: &StackView<'_>) {
    let mut word = String::new();
    while let Some(ch) = input.next().filter(char::is_ascii_lowercase) {
        word.push(ch);
        input.advance();
    }
    if word == "let" {
        input.accept_token(LET);
    }
}

pub fn grammar() -> Grammar {
    let word = Specializer::new(WORD, SpecializeKind::Extend, [("let", LET)]);
    build(Vec::new(), vec![word])
}

pub fn with_keyword_tokenizer() -> Grammar {
    let options = TokenizerOptions { extend: true, ..TokenizerOptions::default() };
    let keyword: Arc<dyn Tokenizer> = Arc::new(ExternalTokenizer::with_options(options, read_keyword));
    build(vec![keyword], Vec::new())
}

/// `before` run ahead of the word automaton in every state.
fn build(before: Vec<Arc<dyn Tokenizer>>, specializers: Vec<Specializer>) -> Grammar {
    let mut tables = TableBuilder::new();
    let start = tables.state();
    let items = tables.state();
    let item = tables.state();
    let keyword = tables.state();
    let bound = tables.state();
    let pair = tables.state();

    for state in [start, items] {
        tables.accepting(state);
        tables.shift(state, WORD, item).shift(state, NUMBER, item).shift(state, LET, keyword);
        tables.goto(state, BINDING, item);
    }
    tables.goto(start, ITEMS, items).goto(items, ITEMS, pair);
    tables.default_reduce(item, reduce(ITEMS, 1)).forced_reduce(item, reduce(ITEMS, 1));
    tables.shift(keyword, WORD, bound).shift(keyword, NAME, bound);
    tables.default_reduce(bound, reduce(BINDING, 2)).forced_reduce(bound, reduce(BINDING, 2));
    tables.default_reduce(pair, repeat(ITEMS, 2)).forced_reduce(pair, repeat(ITEMS, 2));

    let main = before.len() as u32;
    let everywhere = (1 << (main + 1)) - 1;
    for state in [start, items, item, keyword, bound, pair] {
        tables.skip(state, SPACE, stay()).tokenizers(state, everywhere);
    }
    tables.tokenizers(keyword, everywhere | 1 << (main + 1));

    let name = TokenizerOptions { fallback: true, ..TokenizerOptions::default() };
    let mut tokenizers = before;
    tokenizers.push(Arc::new(tokenizer()));
    tokenizers.push(Arc::new(ExternalTokenizer::with_options(name, read_name)));

    let mut spec = GrammarSpec::new(tables.finish(), node_set(), tokenizers, (start, DOCUMENT), EOF);
    spec.min_repeat_term = ITEMS;
    spec.specializers = specializers;
    spec.dynamic_precedences.insert(BINDING, 1);
    Grammar::new(spec).expect("keyword tables are valid")
}
