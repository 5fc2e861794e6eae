use stratum_tree::{IterMode, NodeProp, Subtree, Tree, TreeFragment};

/// Walks the reusable fragments in document order, offering whole nodes
/// that start at the position the parser asks about. Positions passed to
/// [`FragmentCursor::node_at`] must not decrease.
pub(crate) struct FragmentCursor {
    fragments: Vec<TreeFragment>,
    next: usize,
    fragment: Option<usize>,
    /// Part of the current fragment where nodes may be reused.
    safe_from: i64,
    safe_to: i64,
    trees: Vec<Tree>,
    /// Document position of each tree in `trees`.
    start: Vec<i64>,
    index: Vec<usize>,
    next_start: i64,
    margin: u32,
}

impl FragmentCursor {
    pub(crate) fn new(fragments: Vec<TreeFragment>, margin: u32) -> Self {
        let mut cursor = Self {
            fragments,
            next: 0,
            fragment: None,
            safe_from: -1,
            safe_to: -1,
            trees: Vec::new(),
            start: Vec::new(),
            index: Vec::new(),
            next_start: 0,
            margin,
        };
        cursor.next_fragment();
        cursor
    }

    fn next_fragment(&mut self) {
        self.trees.clear();
        self.start.clear();
        self.index.clear();
        let Some(fragment) = self.fragments.get(self.next) else {
            self.fragment = None;
            self.next_start = i64::MAX;
            return;
        };
        self.fragment = Some(self.next);
        self.next += 1;

        let (from, to, offset) = (i64::from(fragment.from), i64::from(fragment.to), fragment.offset);
        let tree_pos = |pos: i64| u32::try_from(pos + offset).unwrap_or(0);
        self.safe_from = if fragment.open_start() {
            i64::from(cut_at(&fragment.tree, tree_pos(from), 1, self.margin)) - offset
        } else {
            from
        };
        self.safe_to = if fragment.open_end() {
            i64::from(cut_at(&fragment.tree, tree_pos(to), -1, self.margin)) - offset
        } else {
            to
        };
        self.trees.push(fragment.tree.clone());
        self.start.push(-offset);
        self.index.push(0);
        self.next_start = self.safe_from;
    }

    /// A node from the fragments that starts at `pos` and can be reused
    /// there, or `None`.
    pub(crate) fn node_at(&mut self, pos: u32) -> Option<Tree> {
        let pos = i64::from(pos);
        if pos < self.next_start {
            return None;
        }
        while self.fragment.is_some() && self.safe_to <= pos {
            self.next_fragment();
        }
        let fragment_to = i64::from(self.fragments[self.fragment?].to);

        loop {
            let Some(last) = self.trees.len().checked_sub(1) else {
                self.next_fragment();
                return None;
            };
            let top = &self.trees[last];
            let index = self.index[last];
            if index == top.children().len() {
                self.trees.pop();
                self.start.pop();
                self.index.pop();
                continue;
            }
            let start = self.start[last] + i64::from(top.positions()[index]);
            if start > pos {
                self.next_start = start;
                return None;
            }
            match &top.children()[index] {
                Subtree::Tree(next) => {
                    let end = start + i64::from(next.length());
                    if start == pos {
                        if start < self.safe_from {
                            return None;
                        }
                        if end <= self.safe_to {
                            let look_ahead = next.prop(NodeProp::LOOK_AHEAD).copied();
                            if look_ahead.is_none_or(|la| end + i64::from(la) < fragment_to) {
                                return Some(next.clone());
                            }
                        }
                    }
                    let next = next.clone();
                    self.index[last] += 1;
                    if end >= self.safe_from.max(pos) {
                        self.trees.push(next);
                        self.start.push(start);
                        self.index.push(0);
                    }
                }
                Subtree::Buffer(buffer) => {
                    self.next_start = start + i64::from(buffer.length());
                    self.index[last] += 1;
                }
            }
        }
    }
}

/// Finds a position near `pos` where `tree` can safely be cut: moving away
/// from `pos` in direction `side` up to a node boundary, and at least
/// `margin` away to leave room for look-ahead.
pub(crate) fn cut_at(tree: &Tree, pos: u32, side: i8, margin: u32) -> u32 {
    let mut cursor = tree.cursor_with(IterMode::INCLUDE_ANONYMOUS);
    cursor.move_to(pos, 0);
    loop {
        let entered = if side < 0 { cursor.child_before(pos) } else { cursor.child_after(pos) };
        if entered {
            continue;
        }
        loop {
            let past = if side < 0 { cursor.to() < pos } else { cursor.from() > pos };
            if past && !cursor.ty().is_error() {
                return if side < 0 {
                    cursor.to().saturating_sub(1).min(pos.saturating_sub(margin))
                } else {
                    tree.length().min((cursor.from() + 1).max(pos + margin))
                };
            }
            let moved = if side < 0 { cursor.prev_sibling() } else { cursor.next_sibling() };
            if moved {
                break;
            }
            if !cursor.parent() {
                return if side < 0 { 0 } else { tree.length() };
            }
        }
    }
}
