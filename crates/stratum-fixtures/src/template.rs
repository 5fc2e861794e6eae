//! Text with `{...}` embeds, read by a hand-written tokenizer. A context
//! tracker counts the embeds shifted so far, and once the limit given to
//! [`with_embed_limit`] is reached, braces are read as plain text.
//!
//! Text runs stop before every `{`. A `{` without a matching `}` later in
//! the document is a one-character text token, so reading it looks ahead
//! to the end of the document.

use std::sync::Arc;

use stratum_parse::{
    ContextTracker, ExternalTokenizer, Grammar, GrammarSpec, InputStream, StackView, TableBuilder,
    Tokenizer, reduce, repeat,
};
use stratum_tree::{NodeSet, Tree};

use crate::{error_node, node, top_node};

pub const DOCUMENT: u32 = 1;
pub const TEXT: u32 = 2;
pub const EMBED: u32 = 3;
pub const ITEMS: u32 = 4;
pub const EOF: u32 = 5;

struct EmbedCounter;

impl ContextTracker for EmbedCounter {
    fn start(&self) -> u64 {
        0
    }

    fn shift(&self, context: u64, term: u32, _stack: &StackView<'_>, _input: &mut InputStream<'_>) -> u64 {
        if term == EMBED { context + 1 } else { context }
    }

    fn reuse(&self, context: u64, node: &Tree, _stack: &StackView<'_>, _input: &mut InputStream<'_>) -> u64 {
        let mut embeds = 0;
        node.iterate(
            0,
            node.length(),
            |inner| {
                if u32::from(inner.ty().id()) == EMBED {
                    embeds += 1;
                }
                true
            },
            |_| {},
        );
        context + embeds
    }
}

pub fn node_set() -> NodeSet {
    NodeSet::new(vec![
        error_node(),
        top_node(DOCUMENT, "Document"),
        node(TEXT, "Text"),
        node(EMBED, "Embed"),
        node(ITEMS, ""),
    ])
}

fn read_token(input: &mut InputStream<'_>, stack: &StackView<'_>, limit: u64) {
    let embeds_allowed = stack.context().unwrap_or(0) < limit;
    let start = input.pos();
    if embeds_allowed && input.next() == Some('{') {
        while let Some(ch) = input.advance() {
            if ch == '}' {
                input.advance();
                input.accept_token(EMBED);
                return;
            }
        }
        input.accept_token_to(TEXT, start + 1);
        return;
    }
    if input.next().is_some() {
        input.advance();
    }
    while input.next().is_some_and(|ch| ch != '{') {
        input.advance();
    }
    if input.pos() > start {
        input.accept_token(TEXT);
    }
}

pub fn grammar() -> Grammar {
    with_embed_limit(u64::MAX)
}

pub fn with_embed_limit(limit: u64) -> Grammar {
    let mut tables = TableBuilder::new();
    let start = tables.state();
    let item = tables.state();
    let items = tables.state();
    let pair = tables.state();

    for state in [start, items] {
        tables.accepting(state).shift(state, TEXT, item).shift(state, EMBED, item);
    }
    tables.goto(start, ITEMS, items).goto(items, ITEMS, pair);
    tables.default_reduce(item, reduce(ITEMS, 1)).forced_reduce(item, reduce(ITEMS, 1));
    tables.default_reduce(pair, repeat(ITEMS, 2)).forced_reduce(pair, repeat(ITEMS, 2));

    let tokenizer = ExternalTokenizer::new(move |input, stack| read_token(input, stack, limit));
    let tokenizers: Vec<Arc<dyn Tokenizer>> = vec![Arc::new(tokenizer)];
    let mut spec = GrammarSpec::new(tables.finish(), node_set(), tokenizers, (start, DOCUMENT), EOF);
    spec.min_repeat_term = ITEMS;
    spec.context = Some(Arc::new(EmbedCounter));
    Grammar::new(spec).expect("template tables are valid")
}
