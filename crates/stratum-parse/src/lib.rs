//! A table-driven LR parser that keeps going.
//!
//! Conflicts in the tables are explored in parallel (GLR style), syntax
//! errors are repaired by inserting, deleting or force-reducing, and a
//! reparse after an edit reuses the unchanged parts of the previous
//! tree. A [`Grammar`] implements [`stratum_tree::Parser`].

mod cache;
mod config;
mod context;
mod fragments;
mod grammar;
mod parse;
mod stack;
mod stream;
mod table;
mod tokens;

pub use config::ParseConfig;
pub use context::ContextTracker;
pub use grammar::{Grammar, GrammarSpec, SpecializeKind, Specializer};
pub use parse::Parse;
pub use stack::StackView;
pub use stream::InputStream;
pub use table::{
    GOTO_FLAG, ParseTables, REDUCE_DEPTH_SHIFT, REDUCE_FLAG, REPEAT_FLAG, SEQ_END, SEQ_OTHER,
    STATE_ACCEPTING, STATE_SIZE, STATE_SKIPPED, STAY_FLAG, TABLE_VERSION, TableBuilder,
    VALUE_MASK, goto_shift, reduce, repeat, shift, stay, stay_reduce,
};
pub use tokens::{DfaState, ExternalTokenizer, TokenGroup, Tokenizer, TokenizerOptions};
