use crate::node_type::{NodeProp, NodeType};
use crate::tree::{Subtree, Tree, TreeBuffer};

bitflags::bitflags! {
    /// Options that change which nodes a [`TreeCursor`] visits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct IterMode: u8 {
        /// Stop on anonymous nodes instead of looking through them.
        const INCLUDE_ANONYMOUS = 1 << 0;
        /// Show the host tree's own children instead of mounted trees.
        const IGNORE_MOUNTS = 1 << 1;
        /// Never descend into overlay mounts, even in `resolve_inner`.
        const IGNORE_OVERLAYS = 1 << 2;
    }
}

/// Index recorded for frames that have no parent child list: the root, and
/// the roots of entered overlay mounts.
const ROOT: usize = usize::MAX;

#[derive(Clone)]
enum Frame {
    Tree { tree: Tree, from: u32, index: usize },
    Buffer { buffer: TreeBuffer, base: u32, index: usize, tree_index: usize, start: usize, end: usize },
}

impl Frame {
    fn ty(&self) -> &NodeType {
        match self {
            Self::Tree { tree, .. } => tree.ty(),
            Self::Buffer { buffer, index, .. } => buffer.ty_at(*index),
        }
    }

    fn from(&self) -> u32 {
        match self {
            Self::Tree { from, .. } => *from,
            Self::Buffer { buffer, base, index, .. } => base + buffer.start_at(*index),
        }
    }

    fn to(&self) -> u32 {
        match self {
            Self::Tree { tree, from, .. } => from + tree.length(),
            Self::Buffer { buffer, base, index, .. } => base + buffer.end_at(*index),
        }
    }
}

/// Whether a node spanning `from..to` is a candidate for `pos` on `side`.
///
/// | side | condition                   |
/// |------|-----------------------------|
/// | -2   | starts before `pos`         |
/// | -1   | starts before, ends at/after|
/// | 0    | strictly covers `pos`       |
/// | 1    | starts at/before, ends after|
/// | 2    | ends after `pos`            |
fn check_side(side: i8, pos: u32, from: u32, to: u32) -> bool {
    match side {
        -2 => from < pos,
        -1 => to >= pos && from < pos,
        0 => from < pos && to > pos,
        1 => from <= pos && to > pos,
        2 => to > pos,
        _ => true,
    }
}

/// A movable position in a [`Tree`]. By default the cursor only stops on
/// named nodes, so anonymous grouping nodes and buffer boundaries are
/// invisible. Moving methods return `false` and leave the cursor in place
/// when there is nowhere to go.
#[derive(Clone)]
pub struct TreeCursor {
    mode: IterMode,
    stack: Vec<Frame>,
}

impl TreeCursor {
    pub(crate) fn new(tree: Tree, from: u32, mode: IterMode) -> Self {
        Self { mode, stack: vec![Frame::Tree { tree, from, index: ROOT }] }
    }

    fn top(&self) -> &Frame {
        &self.stack[self.stack.len() - 1]
    }

    pub fn mode(&self) -> IterMode {
        self.mode
    }

    pub fn ty(&self) -> &NodeType {
        self.top().ty()
    }

    pub fn name(&self) -> &str {
        self.ty().name()
    }

    pub fn from(&self) -> u32 {
        self.top().from()
    }

    pub fn to(&self) -> u32 {
        self.top().to()
    }

    /// The current node when it is a full tree node rather than a buffer
    /// entry.
    pub fn tree(&self) -> Option<&Tree> {
        match self.top() {
            Frame::Tree { tree, .. } => Some(tree),
            Frame::Buffer { .. } => None,
        }
    }

    /// Number of frames between the root and the current node, counting
    /// anonymous ones.
    pub fn depth(&self) -> usize {
        self.stack.len() - 1
    }

    fn is_visible(&self) -> bool {
        self.mode.contains(IterMode::INCLUDE_ANONYMOUS) || !self.ty().is_anonymous()
    }

    fn substitute(&self, tree: &Tree) -> Tree {
        if !self.mode.contains(IterMode::IGNORE_MOUNTS) {
            if let Some(mounted) = tree.prop(NodeProp::MOUNTED) {
                if mounted.overlay().is_none() {
                    return mounted.tree().clone();
                }
            }
        }
        tree.clone()
    }

    fn tree_child(&self, parent: &Tree, from: u32, i: usize, last: bool) -> Frame {
        let pos = from + parent.positions()[i];
        match &parent.children()[i] {
            Subtree::Tree(tree) => Frame::Tree { tree: self.substitute(tree), from: pos, index: i },
            Subtree::Buffer(buffer) => {
                let index = if last { buffer.last_in(0, buffer.len()) } else { 0 };
                Frame::Buffer {
                    buffer: buffer.clone(),
                    base: pos,
                    index,
                    tree_index: i,
                    start: 0,
                    end: buffer.len(),
                }
            }
        }
    }

    /// Moves to the first or last direct child, visible or not.
    fn raw_child(&mut self, last: bool) -> bool {
        let frame = match self.top() {
            Frame::Tree { tree, from, .. } => {
                let count = tree.children().len();
                if count == 0 {
                    return false;
                }
                self.tree_child(tree, *from, if last { count - 1 } else { 0 }, last)
            }
            Frame::Buffer { buffer, base, index, tree_index, .. } => {
                let first = index + 4;
                let end = buffer.end_index(*index);
                if first >= end {
                    return false;
                }
                Frame::Buffer {
                    buffer: buffer.clone(),
                    base: *base,
                    index: if last { buffer.last_in(first, end) } else { first },
                    tree_index: *tree_index,
                    start: first,
                    end,
                }
            }
        };
        self.stack.push(frame);
        true
    }

    fn tree_sibling(&self, parent_at: usize, index: usize, backward: bool) -> Option<Frame> {
        let Frame::Tree { tree, from, .. } = &self.stack[parent_at] else { return None };
        if index == ROOT {
            return None;
        }
        let i = if backward { index.checked_sub(1)? } else { index + 1 };
        if i >= tree.children().len() {
            return None;
        }
        Some(self.tree_child(tree, *from, i, backward))
    }

    /// Moves to the adjacent direct sibling, visible or not.
    fn raw_sibling(&mut self, backward: bool) -> bool {
        let len = self.stack.len();
        if len < 2 {
            return false;
        }
        let frame = match &self.stack[len - 1] {
            Frame::Tree { index, .. } => self.tree_sibling(len - 2, *index, backward),
            Frame::Buffer { buffer, base, index, tree_index, start, end } => {
                let next = if backward {
                    buffer.prev_sibling(*start, *index)
                } else {
                    Some(buffer.end_index(*index)).filter(|next| next < end)
                };
                match next {
                    Some(index) => Some(Frame::Buffer {
                        buffer: buffer.clone(),
                        base: *base,
                        index,
                        tree_index: *tree_index,
                        start: *start,
                        end: *end,
                    }),
                    None if *start == 0 => self.tree_sibling(len - 2, *tree_index, backward),
                    None => None,
                }
            }
        };
        match frame {
            Some(frame) => {
                self.stack[len - 1] = frame;
                true
            }
            None => false,
        }
    }

    /// Enters the first (or last) visible descendant reachable through
    /// anonymous nodes, optionally restricted to nodes matching `target`.
    fn enter_child(&mut self, last: bool, target: Option<(u32, i8)>) -> bool {
        let depth = self.stack.len();
        if !self.raw_child(last) {
            return false;
        }
        loop {
            let matches = target.is_none_or(|(pos, side)| check_side(side, pos, self.from(), self.to()));
            if matches {
                if self.is_visible() {
                    return true;
                }
                if self.raw_child(last) {
                    continue;
                }
            }
            loop {
                if self.raw_sibling(last) {
                    break;
                }
                self.stack.pop();
                if self.stack.len() == depth {
                    return false;
                }
            }
        }
    }

    pub fn first_child(&mut self) -> bool {
        self.enter_child(false, None)
    }

    pub fn last_child(&mut self) -> bool {
        self.enter_child(true, None)
    }

    /// Moves to the first child that ends after `pos`.
    pub fn child_after(&mut self, pos: u32) -> bool {
        self.enter_child(false, Some((pos, 2)))
    }

    /// Moves to the last child that starts before `pos`.
    pub fn child_before(&mut self, pos: u32) -> bool {
        self.enter_child(true, Some((pos, -2)))
    }

    /// Moves to the first child that holds `pos` on `side`.
    pub fn enter(&mut self, pos: u32, side: i8) -> bool {
        self.enter_child(false, Some((pos, side)))
    }

    fn sibling(&mut self, backward: bool) -> bool {
        if self.stack.len() < 2 {
            return false;
        }
        let saved = self.stack.clone();
        loop {
            if self.raw_sibling(backward) {
                if self.is_visible() || self.enter_child(backward, None) {
                    return true;
                }
                continue;
            }
            self.stack.pop();
            if self.stack.len() < 2 || self.is_visible() {
                self.stack = saved;
                return false;
            }
        }
    }

    pub fn next_sibling(&mut self) -> bool {
        self.sibling(false)
    }

    pub fn prev_sibling(&mut self) -> bool {
        self.sibling(true)
    }

    /// Moves to the closest visible ancestor. The root counts as visible.
    pub fn parent(&mut self) -> bool {
        if self.stack.len() < 2 {
            return false;
        }
        loop {
            self.stack.pop();
            if self.stack.len() == 1 || self.is_visible() {
                return true;
            }
        }
    }

    /// Moves to the innermost node that holds `pos` on `side`, first going
    /// up as far as needed.
    pub fn move_to(&mut self, pos: u32, side: i8) {
        loop {
            let (from, to) = (self.from(), self.to());
            let outside = from == to
                || (if side < 1 { from >= pos } else { from > pos })
                || (if side > -1 { to <= pos } else { to < pos });
            if !outside || !self.parent() {
                break;
            }
        }
        while self.enter(pos, side) {}
    }

    /// Enters the tree of an overlay mount on the current path that covers
    /// `pos`. Only looks at nodes below the last overlay entered.
    pub(crate) fn enter_overlay(&mut self, pos: u32, side: i8) -> bool {
        if self.mode.contains(IterMode::IGNORE_OVERLAYS) {
            return false;
        }
        for depth in (0..self.stack.len()).rev() {
            let Frame::Tree { tree, from, index } = &self.stack[depth] else { continue };
            let found = tree.prop(NodeProp::MOUNTED).and_then(|mounted| {
                let overlay = mounted.overlay()?;
                let rel = pos.checked_sub(*from)?;
                let covers = overlay.iter().any(|range| {
                    let (start, end) = (u32::from(range.start()), u32::from(range.end()));
                    (if side > 0 { start <= rel } else { start < rel })
                        && (if side < 0 { end >= rel } else { end > rel })
                });
                let first = overlay.first()?;
                covers.then(|| (mounted.tree().clone(), from + u32::from(first.start())))
            });
            if let Some((inner, inner_from)) = found {
                self.stack.truncate(depth + 1);
                self.stack.push(Frame::Tree { tree: inner, from: inner_from, index: ROOT });
                return true;
            }
            if *index == ROOT && depth > 0 {
                break;
            }
        }
        false
    }

    /// Calls `f` for the current node and its visible ancestors, innermost
    /// first, until it returns `false`.
    pub fn ancestors(&self, mut f: impl FnMut(&NodeType, u32, u32) -> bool) {
        let mut cursor = self.clone();
        loop {
            if !f(cursor.ty(), cursor.from(), cursor.to()) || !cursor.parent() {
                return;
            }
        }
    }
}

impl std::fmt::Debug for TreeCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}..{}", self.name(), self.from(), self.to())
    }
}
