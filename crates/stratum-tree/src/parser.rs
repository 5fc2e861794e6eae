use std::fmt;
use std::sync::Arc;

use stratum_errors::Result;
use stratum_inputs::{Input, TextRange};

use crate::fragment::TreeFragment;
use crate::tree::Tree;

/// A parse in progress. Call [`PartialParse::advance`] until it returns a
/// tree.
pub trait PartialParse {
    /// Does a bounded amount of work. Returns the finished tree once the
    /// parse is done.
    fn advance(&mut self) -> Result<Option<Tree>>;

    /// Position up to which the document has been consumed. Parsing beyond
    /// it has not started yet.
    fn parsed_pos(&self) -> u32;

    /// Tells the parse to finish at `pos`, producing a tree that only
    /// covers the text before it. The position may only move backwards.
    fn stop_at(&mut self, pos: u32) -> Result<()>;

    fn stopped_at(&self) -> Option<u32>;
}

/// Anything that can start parses.
pub trait Parser: Send + Sync {
    /// Starts a parse of `input`, reusing nodes from `fragments` where
    /// possible. An empty `ranges` list means the whole document.
    fn create_parse<'a>(
        &self,
        input: &'a dyn Input,
        fragments: &[TreeFragment],
        ranges: &[TextRange],
    ) -> Result<Box<dyn PartialParse + 'a>>;

    fn parse(&self, input: &dyn Input) -> Result<Tree> {
        self.parse_incremental(input, &[], &[])
    }

    fn parse_incremental(
        &self,
        input: &dyn Input,
        fragments: &[TreeFragment],
        ranges: &[TextRange],
    ) -> Result<Tree> {
        let mut parse = self.create_parse(input, fragments, ranges)?;
        loop {
            if let Some(tree) = parse.advance()? {
                return Ok(tree);
            }
        }
    }
}

/// Advances `parse` until it finishes or `should_yield` asks to pause.
/// Returns `None` when paused, in which case the parse can be resumed later.
pub fn parse_with_budget(
    parse: &mut dyn PartialParse,
    mut should_yield: impl FnMut() -> bool,
) -> Result<Option<Tree>> {
    loop {
        if let Some(tree) = parse.advance()? {
            return Ok(Some(tree));
        }
        if should_yield() {
            return Ok(None);
        }
    }
}

/// A tree produced by a nested parser, attached to a node of its host tree
/// through [`crate::NodeProp::MOUNTED`].
#[derive(Clone)]
pub struct MountedTree {
    tree: Tree,
    overlay: Option<Box<[TextRange]>>,
    parser: Arc<dyn Parser>,
}

impl MountedTree {
    /// Without an overlay, the mounted tree replaces the host node. With
    /// one, it only covers the given ranges, relative to the host node's
    /// start.
    pub fn new(tree: Tree, overlay: Option<Vec<TextRange>>, parser: Arc<dyn Parser>) -> Self {
        Self { tree, overlay: overlay.map(Vec::into_boxed_slice), parser }
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn overlay(&self) -> Option<&[TextRange]> {
        self.overlay.as_deref()
    }

    pub fn parser(&self) -> &Arc<dyn Parser> {
        &self.parser
    }
}

impl fmt::Debug for MountedTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountedTree").field("tree", &self.tree).field("overlay", &self.overlay).finish()
    }
}
