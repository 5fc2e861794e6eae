use stratum_tree::Tree;

use crate::stack::StackView;
use crate::stream::InputStream;

/// Tracks a value alongside the parse, such as indentation depth or
/// whether the parser is inside a template. Each stack carries its own
/// context; tokenizers can read it through [`StackView::context`].
///
/// The input stream handed to the callbacks is positioned at the start
/// of the token or node being processed.
pub trait ContextTracker: Send + Sync {
    /// Context at the start of the document.
    fn start(&self) -> u64;

    /// Called after shifting a token of type `term`.
    fn shift(&self, context: u64, _term: u32, _stack: &StackView<'_>, _input: &mut InputStream<'_>) -> u64 {
        context
    }

    /// Called after reducing to `term`.
    fn reduce(&self, context: u64, _term: u32, _stack: &StackView<'_>, _input: &mut InputStream<'_>) -> u64 {
        context
    }

    /// Called after reusing `node` from an earlier tree.
    fn reuse(&self, context: u64, _node: &Tree, _stack: &StackView<'_>, _input: &mut InputStream<'_>) -> u64 {
        context
    }

    /// Reduces a context to the hash stored on trees. Trees built in
    /// contexts with different hashes are never reused for each other when
    /// the tracker is strict.
    fn hash(&self, context: u64) -> u32 {
        context as u32
    }

    fn strict(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StackContext {
    pub(crate) value: u64,
    pub(crate) hash: u32,
}

impl StackContext {
    pub(crate) fn new(tracker: &dyn ContextTracker, value: u64) -> Self {
        Self { value, hash: tracker.hash(value) }
    }
}
