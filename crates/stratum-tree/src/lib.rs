//! Immutable syntax trees for incremental parsing.
//!
//! A [`Tree`] is a persistent node with children and their positions.
//! Runs of small nodes are packed into [`TreeBuffer`]s. Trees are shared
//! between parses: an incremental parse reuses whole subtrees of the old
//! tree through [`TreeFragment`]s.

mod build;
mod cursor;
mod diagnostics;
mod fragment;
mod node_type;
mod parser;
mod tree;

#[cfg(test)]
mod tests;

pub use build::{
    BufferCursor, BuildConfig, CONTEXT_RECORD, DEFAULT_BUFFER_LENGTH, DEFAULT_LOOK_AHEAD_MARGIN,
    FlatBufferCursor, LOOK_AHEAD_RECORD, REUSE_RECORD, build,
};
pub use cursor::{IterMode, TreeCursor};
pub use diagnostics::collect_diagnostics;
pub use fragment::{DEFAULT_MIN_GAP, TreeFragment};
pub use node_type::{NodeFlags, NodeProp, NodeSet, NodeType, PropMap};
pub use parser::{MountedTree, PartialParse, Parser, parse_with_budget};
pub use tree::{Subtree, Tree, TreeBuffer};
