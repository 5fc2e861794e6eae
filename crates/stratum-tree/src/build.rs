//! Turning a postfix node buffer into a [`Tree`].
//!
//! Parsers emit nodes as groups of four integers `(type, start, end, size)`
//! in post-order, where `size` counts the slots taken by the node and its
//! descendants (four times the node count). Negative sizes mark records
//! that are not nodes:
//!
//! | size | meaning                                          |
//! |------|--------------------------------------------------|
//! | -1   | reuse: `type` indexes into the `reused` trees    |
//! | -3   | context change: `type` holds the new hash        |
//! | -4   | look-ahead: `type` holds the furthest position   |
//!
//! Records with any other negative size are skipped.

use rustc_hash::FxHashMap;

use crate::node_type::{NodeProp, NodeSet, NodeType, PropMap};
use crate::tree::{Subtree, Tree, TreeBuffer};

pub const REUSE_RECORD: i32 = -1;
pub const CONTEXT_RECORD: i32 = -3;
pub const LOOK_AHEAD_RECORD: i32 = -4;

/// Default upper bound on the length of a node stored in a [`TreeBuffer`].
pub const DEFAULT_BUFFER_LENGTH: u32 = 1024;

pub(crate) const BRANCH_FACTOR: usize = 8;

/// Nesting depth past which leaves are collected into flat buffers instead of
/// recursing further.
const CUT_DEPTH: usize = 2500;

/// Default distance a tokenizer may look past a node's end before the node
/// records its look-ahead.
pub const DEFAULT_LOOK_AHEAD_MARGIN: u32 = 25;

/// Reads a postfix buffer backwards, one record at a time.
pub trait BufferCursor: Clone {
    /// Number of slots left before the cursor.
    fn pos(&self) -> usize;
    fn id(&self) -> i32;
    fn start(&self) -> u32;
    fn end(&self) -> u32;
    fn size(&self) -> i32;
    fn next(&mut self);
}

/// A [`BufferCursor`] over one contiguous slice.
#[derive(Clone)]
pub struct FlatBufferCursor<'a> {
    buffer: &'a [i32],
    index: usize,
}

impl<'a> FlatBufferCursor<'a> {
    pub fn new(buffer: &'a [i32]) -> Self {
        Self { buffer, index: buffer.len() }
    }
}

impl BufferCursor for FlatBufferCursor<'_> {
    fn pos(&self) -> usize {
        self.index
    }

    fn id(&self) -> i32 {
        self.buffer[self.index - 4]
    }

    fn start(&self) -> u32 {
        self.buffer[self.index - 3] as u32
    }

    fn end(&self) -> u32 {
        self.buffer[self.index - 2] as u32
    }

    fn size(&self) -> i32 {
        self.buffer[self.index - 1]
    }

    fn next(&mut self) {
        self.index -= 4;
    }
}

/// Everything [`build`] needs besides the buffer.
pub struct BuildConfig<'a> {
    pub node_set: &'a NodeSet,
    pub top_id: u16,
    pub max_buffer_length: u32,
    pub reused: &'a [Tree],
    /// Type ids at or above this one are repeat helpers, which get balanced.
    pub min_repeat_type: u16,
    pub start: u32,
    /// Slot position where the buffer content starts.
    pub buffer_start: usize,
    /// Total length. Defaults to the end of the last top-level node.
    pub length: Option<u32>,
    /// Nodes whose tokens looked further than this past their end get a
    /// [`NodeProp::LOOK_AHEAD`] prop.
    pub look_ahead_margin: u32,
}

impl<'a> BuildConfig<'a> {
    pub fn new(node_set: &'a NodeSet, top_id: u16) -> Self {
        Self {
            node_set,
            top_id,
            max_buffer_length: DEFAULT_BUFFER_LENGTH,
            reused: &[],
            min_repeat_type: node_set.len() as u16,
            start: 0,
            buffer_start: 0,
            length: None,
            look_ahead_margin: DEFAULT_LOOK_AHEAD_MARGIN,
        }
    }
}

/// Builds a tree from a postfix buffer, packing small nodes into
/// [`TreeBuffer`]s and balancing long repetitions.
///
/// # Panics
///
/// Node records must use type ids from `config.node_set`, and their sizes
/// must match the records actually before them.
pub fn build<C: BufferCursor>(cursor: C, config: &BuildConfig<'_>) -> Tree {
    let mut builder = Builder {
        cursor,
        types: config.node_set.types(),
        set: config.node_set,
        max_buffer_length: config.max_buffer_length,
        reused: config.reused,
        min_repeat_type: config.min_repeat_type,
        look_ahead_margin: config.look_ahead_margin,
        context_hash: 0,
        look_ahead: 0,
        sizes: FxHashMap::default(),
    };
    let mut children = Vec::new();
    let mut positions = Vec::new();
    while builder.cursor.pos() > config.buffer_start {
        builder.take_node(config.start, config.buffer_start, &mut children, &mut positions, -1, 0);
    }
    let length = config.length.unwrap_or_else(|| {
        children.first().zip(positions.first()).map_or(0, |(child, &pos)| pos + child.length())
    });
    children.reverse();
    positions.reverse();
    tracing::trace!(top = config.top_id, length, children = children.len(), "built tree");
    Tree::new(config.node_set.get(config.top_id).clone(), children, positions, length)
}

struct BufferSize {
    size: usize,
    start: u32,
    skip: usize,
}

struct Builder<'a, C> {
    cursor: C,
    types: &'a [NodeType],
    set: &'a NodeSet,
    max_buffer_length: u32,
    reused: &'a [Tree],
    min_repeat_type: u16,
    look_ahead_margin: u32,
    context_hash: u32,
    look_ahead: u32,
    sizes: FxHashMap<usize, usize>,
}

impl<C: BufferCursor> Builder<'_, C> {
    fn take_node(
        &mut self,
        parent_start: u32,
        min_pos: usize,
        children: &mut Vec<Subtree>,
        positions: &mut Vec<u32>,
        in_repeat: i32,
        depth: usize,
    ) {
        let (id, start, end, size) =
            (self.cursor.id(), self.cursor.start(), self.cursor.end(), self.cursor.size());
        let look_ahead_at_start = self.look_ahead;
        let context_at_start = self.context_hash;
        if size < 0 {
            self.cursor.next();
            match size {
                REUSE_RECORD => match self.reused.get(id as usize) {
                    Some(tree) => {
                        children.push(Subtree::Tree(tree.clone()));
                        positions.push(start - parent_start);
                    }
                    None => tracing::warn!(index = id, "skipping reuse record without a tree"),
                },
                CONTEXT_RECORD => self.context_hash = id as u32,
                LOOK_AHEAD_RECORD => self.look_ahead = id as u32,
                _ => tracing::warn!(size, "skipping unrecognized buffer record"),
            }
            return;
        }

        let ty = self.types[id as usize].clone();
        let mut start_pos = start - parent_start;
        let buffer = if end - start <= self.max_buffer_length {
            self.find_buffer_size(self.cursor.pos() - min_pos, in_repeat)
        } else {
            None
        };
        let node = if let Some(buffer) = buffer {
            let mut data = vec![0u32; buffer.size - buffer.skip];
            let end_pos = self.cursor.pos() - buffer.size;
            let mut index = data.len();
            while self.cursor.pos() > end_pos {
                index = self.copy_to_buffer(buffer.start, &mut data, index);
            }
            start_pos = buffer.start - parent_start;
            Subtree::Buffer(TreeBuffer::new(data, end - buffer.start, self.set.clone()))
        } else {
            let end_pos = self.cursor.pos() - size as usize;
            self.cursor.next();
            let mut local_children = Vec::new();
            let mut local_positions = Vec::new();
            let local_in_repeat = if id as u16 >= self.min_repeat_type { id } else { -1 };
            let mut last_group = 0;
            let mut last_end = end;
            while self.cursor.pos() > end_pos {
                if local_in_repeat >= 0 && self.cursor.id() == local_in_repeat && self.cursor.size() >= 0
                {
                    if self.cursor.end() + self.max_buffer_length <= last_end {
                        let group_end = self.cursor.end();
                        self.make_repeat_leaf(
                            &mut local_children,
                            &mut local_positions,
                            start,
                            last_group,
                            group_end,
                            last_end,
                            local_in_repeat as u16,
                            look_ahead_at_start,
                            context_at_start,
                        );
                        last_group = local_children.len();
                        last_end = group_end;
                    }
                    self.cursor.next();
                } else if depth > CUT_DEPTH {
                    self.take_flat_node(start, end_pos, &mut local_children, &mut local_positions);
                } else {
                    self.take_node(
                        start,
                        end_pos,
                        &mut local_children,
                        &mut local_positions,
                        local_in_repeat,
                        depth + 1,
                    );
                }
            }
            if local_in_repeat >= 0 && last_group > 0 && last_group < local_children.len() {
                self.make_repeat_leaf(
                    &mut local_children,
                    &mut local_positions,
                    start,
                    last_group,
                    start,
                    last_end,
                    local_in_repeat as u16,
                    look_ahead_at_start,
                    context_at_start,
                );
            }
            local_children.reverse();
            local_positions.reverse();

            if local_in_repeat > -1 && last_group > 0 {
                let margin = self.look_ahead_margin;
                let mk = |children: Vec<Subtree>, positions: Vec<u32>, length: u32| {
                    make_balanced(&ty, context_at_start, margin, children, positions, length)
                };
                Subtree::Tree(balance_range(
                    &ty,
                    &local_children,
                    &local_positions,
                    0,
                    local_children.len(),
                    0,
                    end - start,
                    Some(&mk),
                    &mk,
                    &mut self.sizes,
                ))
            } else {
                Subtree::Tree(make_tree(
                    ty,
                    local_children,
                    local_positions,
                    end - start,
                    i64::from(look_ahead_at_start) - i64::from(end),
                    context_at_start,
                    self.look_ahead_margin,
                ))
            }
        };
        children.push(node);
        positions.push(start_pos);
    }

    /// Collects leaves into flat buffers once the tree gets too deep.
    fn take_flat_node(
        &mut self,
        parent_start: u32,
        min_pos: usize,
        children: &mut Vec<Subtree>,
        positions: &mut Vec<u32>,
    ) {
        // (id, start, end) in reverse document order
        let mut nodes: Vec<(u32, u32, u32)> = Vec::new();
        let mut stop_at: Option<u32> = None;
        while self.cursor.pos() > min_pos {
            let (id, start, end, size) =
                (self.cursor.id(), self.cursor.start(), self.cursor.end(), self.cursor.size());
            if size > 4 || size < 0 {
                self.cursor.next();
            } else if stop_at.is_some_and(|stop| start < stop) {
                break;
            } else {
                if stop_at.is_none() {
                    stop_at = Some(end.saturating_sub(self.max_buffer_length));
                }
                nodes.push((id as u32, start, end));
                self.cursor.next();
            }
        }
        let (Some(&(_, start, _)), Some(&(_, _, end))) = (nodes.last(), nodes.first()) else {
            return;
        };
        let mut data = Vec::with_capacity(nodes.len() * 4);
        for &(id, from, to) in nodes.iter().rev() {
            data.extend([id, from - start, to - start, data.len() as u32 + 4]);
        }
        children.push(Subtree::Buffer(TreeBuffer::new(data, end - start, self.set.clone())));
        positions.push(start - parent_start);
    }

    #[allow(clippy::too_many_arguments)]
    fn make_repeat_leaf(
        &self,
        children: &mut Vec<Subtree>,
        positions: &mut Vec<u32>,
        base: u32,
        i: usize,
        from: u32,
        to: u32,
        ty: u16,
        look_ahead: u32,
        context_hash: u32,
    ) {
        let mut local_children = Vec::new();
        let mut local_positions = Vec::new();
        while children.len() > i {
            let (Some(child), Some(pos)) = (children.pop(), positions.pop()) else { break };
            local_children.push(child);
            local_positions.push(pos + base - from);
        }
        children.push(Subtree::Tree(make_tree(
            self.types[usize::from(ty)].clone(),
            local_children,
            local_positions,
            to - from,
            i64::from(look_ahead) - i64::from(to),
            context_hash,
            self.look_ahead_margin,
        )));
        positions.push(from - base);
    }

    /// Checks whether the nodes before the cursor, up to `max_size` slots,
    /// can be stored as a buffer. Returns the slots they take, their start,
    /// and how many slots of repeat wrappers will be dropped.
    fn find_buffer_size(&self, max_size: usize, in_repeat: i32) -> Option<BufferSize> {
        let mut fork = self.cursor.clone();
        let mut size = 0;
        let mut start = 0;
        let mut skip = 0;
        let min_start = i64::from(fork.end()) - i64::from(self.max_buffer_length);
        let mut result = BufferSize { size: 0, start: 0, skip: 0 };
        let min_pos = fork.pos() - max_size;
        'scan: while fork.pos() > min_pos {
            let node_size = fork.size();
            // Nested repeat nodes of the current repetition are transparent,
            // but their boundaries are valid places to stop.
            if fork.id() == in_repeat && node_size >= 0 {
                result = BufferSize { size, start, skip };
                skip += 4;
                size += 4;
                fork.next();
                continue;
            }
            if node_size < 0 || i64::from(fork.start()) < min_start {
                break;
            }
            let node_size = node_size as usize;
            let Some(start_pos) = fork.pos().checked_sub(node_size) else { break };
            if start_pos < min_pos {
                break;
            }
            let node_start = fork.start();
            let mut local_skipped = if fork.id() >= i32::from(self.min_repeat_type) { 4 } else { 0 };
            fork.next();
            while fork.pos() > start_pos {
                if fork.size() < 0 {
                    if fork.size() == CONTEXT_RECORD || fork.size() == LOOK_AHEAD_RECORD {
                        local_skipped += 4;
                    } else {
                        break 'scan;
                    }
                } else if fork.id() >= i32::from(self.min_repeat_type) {
                    local_skipped += 4;
                }
                fork.next();
            }
            start = node_start;
            size += node_size;
            skip += local_skipped;
        }
        if in_repeat < 0 || size == max_size {
            result = BufferSize { size, start, skip };
        }
        (result.size > 4).then_some(result)
    }

    /// Copies the node at the cursor and its children into `buffer`, writing
    /// backwards from `index`. Repeat wrappers and records are dropped.
    fn copy_to_buffer(&mut self, buffer_start: u32, buffer: &mut [u32], mut index: usize) -> usize {
        let (id, start, end, size) =
            (self.cursor.id(), self.cursor.start(), self.cursor.end(), self.cursor.size());
        self.cursor.next();
        if size >= 0 && id < i32::from(self.min_repeat_type) {
            let start_index = index;
            if size > 4 {
                let end_pos = self.cursor.pos() - (size as usize - 4);
                while self.cursor.pos() > end_pos {
                    index = self.copy_to_buffer(buffer_start, buffer, index);
                }
            }
            index -= 4;
            buffer[index] = id as u32;
            buffer[index + 1] = start - buffer_start;
            buffer[index + 2] = end - buffer_start;
            buffer[index + 3] = start_index as u32;
        } else if size == CONTEXT_RECORD {
            self.context_hash = id as u32;
        } else if size == LOOK_AHEAD_RECORD {
            self.look_ahead = id as u32;
        }
        index
    }
}

fn make_tree(
    ty: NodeType,
    children: Vec<Subtree>,
    positions: Vec<u32>,
    length: u32,
    look_ahead: i64,
    context_hash: u32,
    margin: u32,
) -> Tree {
    let mut props = PropMap::new();
    if context_hash != 0 {
        props.insert(NodeProp::CONTEXT_HASH, context_hash);
    }
    if look_ahead > i64::from(margin) {
        props.insert(NodeProp::LOOK_AHEAD, look_ahead as u32);
    }
    Tree::with_props(ty, children, positions, length, props)
}

fn make_balanced(
    ty: &NodeType,
    context_hash: u32,
    margin: u32,
    children: Vec<Subtree>,
    positions: Vec<u32>,
    length: u32,
) -> Tree {
    let mut look_ahead = 0;
    let last = children.len().checked_sub(1);
    if let Some(last) = last {
        if let Subtree::Tree(tree) = &children[last] {
            if last == 0 && tree.ty() == ty && tree.length() == length {
                return tree.clone();
            }
            if let Some(&inner) = tree.prop(NodeProp::LOOK_AHEAD) {
                look_ahead = i64::from(positions[last]) + i64::from(tree.length()) + i64::from(inner);
            }
        }
    }
    make_tree(ty.clone(), children, positions, length, look_ahead, context_hash, margin)
}

type MakeTree<'a> = &'a dyn Fn(Vec<Subtree>, Vec<u32>, u32) -> Tree;

/// Number of leaf-ish units in `child`, looking through nested groups of
/// `balance_type`. Memoized by node address.
fn node_size(
    balance_type: &NodeType,
    child: &Subtree,
    sizes: &mut FxHashMap<usize, usize>,
) -> usize {
    let Subtree::Tree(tree) = child else { return 1 };
    if !balance_type.is_anonymous() || tree.ty() != balance_type {
        return 1;
    }
    if let Some(&size) = sizes.get(&tree.addr()) {
        return size;
    }
    let mut size = 1;
    for grandchild in tree.children() {
        match grandchild {
            Subtree::Tree(inner) if inner.ty() == balance_type => {
                size += node_size(balance_type, grandchild, sizes);
            }
            _ => {
                size = 1;
                break;
            }
        }
    }
    sizes.insert(tree.addr(), size);
    size
}

/// Groups `children[from..to]` into a tree whose nodes have at most about
/// [`BRANCH_FACTOR`] children each.
#[allow(clippy::too_many_arguments)]
pub(crate) fn balance_range(
    balance_type: &NodeType,
    children: &[Subtree],
    positions: &[u32],
    from: usize,
    to: usize,
    start: u32,
    length: u32,
    mk_top: Option<MakeTree<'_>>,
    mk_tree: MakeTree<'_>,
    sizes: &mut FxHashMap<usize, usize>,
) -> Tree {
    let total: usize = children[from..to].iter().map(|c| node_size(balance_type, c, sizes)).sum();
    let max_child = (total * 3).div_ceil(2 * BRANCH_FACTOR);
    let mut local_children = Vec::new();
    let mut local_positions = Vec::new();
    let mut division = Division {
        balance_type,
        mk_tree,
        max_child,
        start,
        children: &mut local_children,
        positions: &mut local_positions,
        sizes,
    };
    division.divide(children, positions, from, to, 0);
    mk_top.unwrap_or(mk_tree)(local_children, local_positions, length)
}

struct Division<'a, 'b> {
    balance_type: &'a NodeType,
    mk_tree: MakeTree<'a>,
    max_child: usize,
    start: u32,
    children: &'b mut Vec<Subtree>,
    positions: &'b mut Vec<u32>,
    sizes: &'b mut FxHashMap<usize, usize>,
}

impl Division<'_, '_> {
    fn divide(&mut self, children: &[Subtree], positions: &[u32], from: usize, to: usize, offset: u32) {
        let mut i = from;
        while i < to {
            let group_from = i;
            let group_start = positions[i];
            let mut group_size = node_size(self.balance_type, &children[i], self.sizes);
            i += 1;
            while i < to {
                let next_size = node_size(self.balance_type, &children[i], self.sizes);
                if group_size + next_size >= self.max_child {
                    break;
                }
                group_size += next_size;
                i += 1;
            }
            if i == group_from + 1 {
                if group_size > self.max_child {
                    if let Subtree::Tree(only) = &children[group_from] {
                        self.divide(
                            only.children(),
                            only.positions(),
                            0,
                            only.children().len(),
                            positions[group_from] + offset,
                        );
                        continue;
                    }
                }
                self.children.push(children[group_from].clone());
            } else {
                let length = positions[i - 1] + children[i - 1].length() - group_start;
                let group = balance_range(
                    self.balance_type,
                    children,
                    positions,
                    group_from,
                    i,
                    group_start,
                    length,
                    None,
                    self.mk_tree,
                    self.sizes,
                );
                self.children.push(Subtree::Tree(group));
            }
            self.positions.push(group_start + offset - self.start);
        }
    }
}

#[cfg(test)]
mod tests {
    use expect_test::expect;

    use super::*;
    use crate::node_type::NodeFlags;

    fn set() -> NodeSet {
        let ty = |id, name: &str| NodeType::define(id, name, NodeFlags::empty(), PropMap::new());
        NodeSet::new(vec![
            NodeType::define(0, "⚠", NodeFlags::ERROR, PropMap::new()),
            NodeType::define(1, "Program", NodeFlags::TOP, PropMap::new()),
            ty(2, "Item"),
            ty(3, "Word"),
            ty(4, "List"),
            NodeType::define(5, "", NodeFlags::empty(), PropMap::new()),
        ])
    }

    /// `count` words of length 1 separated by one space, inside a List made
    /// of right-nested repeat nodes (type 5).
    fn repeat_buffer(count: u32) -> Vec<i32> {
        let mut buffer = Vec::new();
        for i in 0..count {
            let pos = (i * 2) as i32;
            buffer.extend([3, pos, pos + 1, 4]);
            if i > 0 {
                buffer.extend([5, 0, pos + 1, buffer.len() as i32 + 4]);
            }
        }
        let len = buffer.len() as i32;
        let end = (count * 2 - 1) as i32;
        buffer.extend([4, 0, end, len + 4]);
        buffer
    }

    #[test]
    fn builds_nested_nodes() {
        let set = set();
        // Item(Word, Word) followed by a Word
        let buffer = [3, 0, 2, 4, 3, 3, 5, 4, 2, 0, 5, 12, 3, 6, 9, 4];
        let mut config = BuildConfig::new(&set, 1);
        config.max_buffer_length = 0;
        let tree = build(FlatBufferCursor::new(&buffer), &config);
        expect!["Program(Item(Word,Word),Word)"].assert_eq(&tree.to_string());
        assert_eq!(tree.length(), 9);
        assert_eq!(tree.positions(), &[0, 6]);
    }

    #[test]
    fn small_nodes_go_into_buffers() {
        let set = set();
        let buffer = [3, 0, 2, 4, 3, 3, 5, 4, 2, 0, 5, 12, 3, 6, 9, 4];
        let tree = build(FlatBufferCursor::new(&buffer), &BuildConfig::new(&set, 1));
        assert_eq!(tree.children().len(), 1);
        let Subtree::Buffer(buffer) = &tree.children()[0] else { panic!("expected a buffer") };
        assert_eq!(buffer.data(), &[2, 0, 5, 12, 3, 0, 2, 8, 3, 3, 5, 12, 3, 6, 9, 16]);
        expect!["Program(Item(Word,Word),Word)"].assert_eq(&tree.to_string());
    }

    #[test]
    fn reused_and_context_records() {
        let set = set();
        let reused = [Tree::new(set.get(3).clone(), Vec::new(), Vec::new(), 4)];
        let buffer = [0, 2, 6, REUSE_RECORD, 2, 2, 6, 8, 7, 6, 6, CONTEXT_RECORD];
        let mut config = BuildConfig::new(&set, 1);
        config.reused = &reused;
        config.max_buffer_length = 0;
        let tree = build(FlatBufferCursor::new(&buffer), &config);
        expect!["Program(Item(Word))"].assert_eq(&tree.to_string());
        let item = tree.children()[0].as_tree().unwrap();
        assert_eq!(item.prop(NodeProp::CONTEXT_HASH), Some(&7));
        assert!(item.children()[0].as_tree().unwrap().ptr_eq(&reused[0]));
    }

    #[test]
    fn look_ahead_past_the_margin_is_recorded() {
        let set = set();
        // Item(Word) ending at 2 that looked ahead to 40
        let buffer = [3, 0, 2, 4, 2, 0, 2, 8, 40, 2, 2, LOOK_AHEAD_RECORD];
        let item_look_ahead = |margin| {
            let mut config = BuildConfig::new(&set, 1);
            config.max_buffer_length = 0;
            config.look_ahead_margin = margin;
            let tree = build(FlatBufferCursor::new(&buffer), &config);
            tree.children()[0].as_tree().unwrap().prop(NodeProp::LOOK_AHEAD).copied()
        };
        assert_eq!(item_look_ahead(DEFAULT_LOOK_AHEAD_MARGIN), Some(38));
        assert_eq!(item_look_ahead(1000), None);
    }

    #[test]
    fn unknown_records_are_skipped() {
        let set = set();
        let buffer = [3, 0, 2, 4, 2, 0, 2, 8, 9, 2, 2, -2, 5, 2, 2, REUSE_RECORD];
        let mut config = BuildConfig::new(&set, 1);
        config.max_buffer_length = 0;
        config.length = Some(2);
        let tree = build(FlatBufferCursor::new(&buffer), &config);
        expect!["Program(Item(Word))"].assert_eq(&tree.to_string());
        assert_eq!(tree.length(), 2);
    }

    #[test]
    fn long_repetitions_are_balanced() {
        let set = set();
        let buffer = repeat_buffer(200);
        let mut config = BuildConfig::new(&set, 1);
        config.min_repeat_type = 5;
        config.max_buffer_length = 16;
        let tree = build(FlatBufferCursor::new(&buffer), &config);
        let list = tree.children()[0].as_tree().unwrap();
        assert_eq!(list.ty().name(), "List");
        assert!(list.children().len() <= BRANCH_FACTOR * 2);
        assert_eq!(list.length(), 399);

        let mut words = 0;
        tree.iterate(0, tree.length(), |c| {
            words += usize::from(c.ty().name() == "Word");
            true
        }, |_| {});
        assert_eq!(words, 200);
    }

    #[test]
    fn balance_bounds_fan_out() {
        let set = set();
        let words = (0..100u32)
            .map(|_| Subtree::Tree(Tree::new(set.get(3).clone(), Vec::new(), Vec::new(), 1)))
            .collect::<Vec<_>>();
        let positions = (0..100u32).collect();
        let flat = Tree::new(set.get(4).clone(), words, positions, 100);
        let balanced = flat.balance();
        assert_eq!(balanced.ty().name(), "List");
        assert!(balanced.children().len() <= BRANCH_FACTOR * 2);
        assert_eq!(balanced.to_string(), flat.to_string());
    }
}
