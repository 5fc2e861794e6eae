use std::fmt;

use stratum_errors::Result;
use stratum_inputs::check_position;

use crate::cursor::{IterMode, TreeCursor};
use crate::node_type::{NodeProp, NodeSet, NodeType, PropMap};

pub(crate) struct TreeData {
    ty: NodeType,
    children: Box<[Subtree]>,
    positions: Box<[u32]>,
    length: u32,
    props: PropMap,
}

/// An immutable syntax tree node. Cloning is cheap and shares the node.
#[derive(Clone)]
pub struct Tree(triomphe::Arc<TreeData>);

/// A child of a [`Tree`]: either another tree or a packed buffer of small
/// nodes.
#[derive(Clone)]
pub enum Subtree {
    Tree(Tree),
    Buffer(TreeBuffer),
}

impl Tree {
    /// `positions[i]` is the start of `children[i]` relative to this node.
    pub fn new(ty: NodeType, children: Vec<Subtree>, positions: Vec<u32>, length: u32) -> Self {
        Self::with_props(ty, children, positions, length, PropMap::new())
    }

    pub fn with_props(
        ty: NodeType,
        children: Vec<Subtree>,
        positions: Vec<u32>,
        length: u32,
        props: PropMap,
    ) -> Self {
        assert_eq!(children.len(), positions.len());
        Self(triomphe::Arc::new(TreeData {
            ty,
            children: children.into(),
            positions: positions.into(),
            length,
            props,
        }))
    }

    /// An anonymous tree without children.
    pub fn empty() -> Self {
        Self::new(NodeType::none(), Vec::new(), Vec::new(), 0)
    }

    pub fn ty(&self) -> &NodeType {
        &self.0.ty
    }

    pub fn children(&self) -> &[Subtree] {
        &self.0.children
    }

    pub fn positions(&self) -> &[u32] {
        &self.0.positions
    }

    pub fn length(&self) -> u32 {
        self.0.length
    }

    /// Looks a prop up on the node itself first, then on its type.
    pub fn prop<T: Send + Sync + 'static>(&self, prop: NodeProp<T>) -> Option<&T> {
        if prop.is_per_node() { self.0.props.get(prop) } else { self.0.ty.prop(prop) }
    }

    pub fn props(&self) -> &PropMap {
        &self.0.props
    }

    /// Returns a copy of this node with an extra per-node prop.
    pub fn set_prop<T: Send + Sync + 'static>(&self, prop: NodeProp<T>, value: T) -> Self {
        let mut props = self.0.props.clone();
        props.insert(prop, value);
        Self::with_props(
            self.0.ty.clone(),
            self.0.children.to_vec(),
            self.0.positions.to_vec(),
            self.0.length,
            props,
        )
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        triomphe::Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        triomphe::Arc::as_ptr(&self.0) as usize
    }

    /// A cursor on this tree's root that skips anonymous nodes.
    pub fn cursor(&self) -> TreeCursor {
        TreeCursor::new(self.clone(), 0, IterMode::empty())
    }

    pub fn cursor_with(&self, mode: IterMode) -> TreeCursor {
        TreeCursor::new(self.clone(), 0, mode)
    }

    /// A cursor pointing at the innermost node covering `pos`. Fails when
    /// `pos` is past the end of the tree.
    pub fn cursor_at(&self, pos: u32, side: i8) -> Result<TreeCursor> {
        check_position(pos, self.length())?;
        let mut cursor = self.cursor();
        cursor.move_to(pos, side);
        Ok(cursor)
    }

    /// Finds the innermost node at `pos`. `side` picks between nodes that
    /// only touch `pos`: negative prefers nodes ending there, positive nodes
    /// starting there, zero requires the node to strictly cover `pos`.
    pub fn resolve(&self, pos: u32, side: i8) -> Result<TreeCursor> {
        self.cursor_at(pos, side)
    }

    /// Like [`Tree::resolve`], but also descends into overlay mounts.
    pub fn resolve_inner(&self, pos: u32, side: i8) -> Result<TreeCursor> {
        let mut cursor = self.resolve(pos, side)?;
        while cursor.enter_overlay(pos, side) {
            cursor.move_to(pos, side);
        }
        Ok(cursor)
    }

    /// The root of this tree as seen by a cursor: the node itself unless it
    /// is anonymous, in which case its visible children are the top level.
    pub fn top_node(&self) -> TreeCursor {
        self.cursor()
    }

    /// Walks every visible node overlapping `from..to` in document order.
    /// Returning `false` from `enter` skips the node's children.
    pub fn iterate<E, L>(&self, from: u32, to: u32, mut enter: E, mut leave: L)
    where
        E: FnMut(&TreeCursor) -> bool,
        L: FnMut(&TreeCursor),
    {
        let mut cursor = self.cursor();
        let anonymous = cursor.mode().contains(IterMode::INCLUDE_ANONYMOUS);
        loop {
            let mut entered = false;
            if cursor.from() <= to
                && cursor.to() >= from
                && ((!anonymous && cursor.ty().is_anonymous()) || enter(&cursor))
            {
                if cursor.first_child() {
                    continue;
                }
                entered = true;
            }
            loop {
                if entered && (anonymous || !cursor.ty().is_anonymous()) {
                    leave(&cursor);
                }
                if cursor.next_sibling() {
                    break;
                }
                if !cursor.parent() {
                    return;
                }
                entered = true;
            }
        }
    }

    /// Lists the descendants of this node in the [`TreeBuffer`] layout:
    /// prefix order, `(type, from, to, end_index)` per node, positions
    /// relative to this node.
    pub fn flatten(&self) -> Vec<u32> {
        let mut out = Vec::new();
        flatten_into(self, 0, &mut out);
        out
    }

    /// Rebalances a flat node with many children into a bounded-depth tree
    /// of anonymous grouping nodes.
    pub fn balance(&self) -> Self {
        if self.children().len() <= crate::build::BRANCH_FACTOR {
            return self.clone();
        }
        let ty = self.ty().clone();
        let props = self.props().clone();
        let mk_top = move |children: Vec<Subtree>, positions: Vec<u32>, length: u32| {
            Self::with_props(ty.clone(), children, positions, length, props.clone())
        };
        let mk_tree = |children: Vec<Subtree>, positions: Vec<u32>, length: u32| {
            Self::new(NodeType::none(), children, positions, length)
        };
        crate::build::balance_range(
            &NodeType::none(),
            self.children(),
            self.positions(),
            0,
            self.children().len(),
            0,
            self.length(),
            Some(&mk_top),
            &mk_tree,
            &mut Default::default(),
        )
    }
}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(mounted) = self.prop(NodeProp::MOUNTED) {
            if mounted.overlay().is_none() {
                return fmt::Display::fmt(mounted.tree(), f);
            }
        }
        let mut children = String::new();
        for child in self.children() {
            let text = child.to_string();
            if !text.is_empty() {
                if !children.is_empty() {
                    children.push(',');
                }
                children.push_str(&text);
            }
        }
        write_node(f, self.ty(), &children)
    }
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self} @ 0..{}", self.length())
    }
}

fn flatten_into(tree: &Tree, offset: u32, out: &mut Vec<u32>) {
    for (child, &pos) in tree.children().iter().zip(tree.positions()) {
        let start = offset + pos;
        match child {
            Subtree::Tree(inner) => {
                let at = out.len();
                out.extend([u32::from(inner.ty().id()), start, start + inner.length(), 0]);
                flatten_into(inner, start, out);
                out[at + 3] = out.len() as u32;
            }
            Subtree::Buffer(buffer) => {
                let base = out.len() as u32;
                for node in buffer.data().chunks_exact(4) {
                    out.extend([node[0], node[1] + start, node[2] + start, node[3] + base]);
                }
            }
        }
    }
}

fn write_node(f: &mut fmt::Formatter<'_>, ty: &NodeType, children: &str) -> fmt::Result {
    let name = ty.name();
    if name.is_empty() {
        return f.write_str(children);
    }
    if !ty.is_error() && name.chars().any(|c| !(c.is_alphanumeric() || c == '_')) {
        write!(f, "{name:?}")?;
    } else {
        f.write_str(name)?;
    }
    if !children.is_empty() {
        write!(f, "({children})")?;
    }
    Ok(())
}

impl Subtree {
    pub fn length(&self) -> u32 {
        match self {
            Self::Tree(tree) => tree.length(),
            Self::Buffer(buffer) => buffer.length(),
        }
    }

    pub fn as_tree(&self) -> Option<&Tree> {
        match self {
            Self::Tree(tree) => Some(tree),
            Self::Buffer(_) => None,
        }
    }
}

impl fmt::Display for Subtree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tree(tree) => fmt::Display::fmt(tree, f),
            Self::Buffer(buffer) => fmt::Display::fmt(buffer, f),
        }
    }
}

impl From<Tree> for Subtree {
    fn from(tree: Tree) -> Self {
        Self::Tree(tree)
    }
}

impl From<TreeBuffer> for Subtree {
    fn from(buffer: TreeBuffer) -> Self {
        Self::Buffer(buffer)
    }
}

struct BufferData {
    buffer: Box<[u32]>,
    length: u32,
    set: NodeSet,
}

/// A flat, prefix-ordered encoding of small leaf-heavy subtrees. Every node
/// takes four slots: type id, start, end (relative to the buffer start) and
/// the index just past the node's last descendant.
#[derive(Clone)]
pub struct TreeBuffer(triomphe::Arc<BufferData>);

impl TreeBuffer {
    pub fn new(buffer: Vec<u32>, length: u32, set: NodeSet) -> Self {
        debug_assert_eq!(buffer.len() % 4, 0);
        Self(triomphe::Arc::new(BufferData { buffer: buffer.into(), length, set }))
    }

    pub fn data(&self) -> &[u32] {
        &self.0.buffer
    }

    pub fn length(&self) -> u32 {
        self.0.length
    }

    pub fn set(&self) -> &NodeSet {
        &self.0.set
    }

    pub(crate) fn len(&self) -> usize {
        self.0.buffer.len()
    }

    pub(crate) fn ty_at(&self, index: usize) -> &NodeType {
        self.0.set.get(self.0.buffer[index] as u16)
    }

    pub(crate) fn start_at(&self, index: usize) -> u32 {
        self.0.buffer[index + 1]
    }

    pub(crate) fn end_at(&self, index: usize) -> u32 {
        self.0.buffer[index + 2]
    }

    /// Index just past the node at `index` and its descendants.
    pub(crate) fn end_index(&self, index: usize) -> usize {
        self.0.buffer[index + 3] as usize
    }

    /// Last sibling in `start..end`.
    pub(crate) fn last_in(&self, start: usize, end: usize) -> usize {
        let mut index = start;
        loop {
            let next = self.end_index(index);
            if next >= end {
                return index;
            }
            index = next;
        }
    }

    /// Sibling before `index`, scanning from `start`.
    pub(crate) fn prev_sibling(&self, start: usize, index: usize) -> Option<usize> {
        let mut at = start;
        while at < index {
            let next = self.end_index(at);
            if next == index {
                return Some(at);
            }
            at = next;
        }
        None
    }

    /// Expands the buffer into ordinary [`Tree`] nodes. The result has the
    /// same shape as the buffer, under an anonymous root.
    pub fn to_tree(&self) -> Tree {
        let mut children = Vec::new();
        let mut positions = Vec::new();
        let mut index = 0;
        while index < self.len() {
            positions.push(self.start_at(index));
            children.push(Subtree::Tree(self.node_to_tree(index)));
            index = self.end_index(index);
        }
        Tree::new(NodeType::none(), children, positions, self.length())
    }

    fn node_to_tree(&self, index: usize) -> Tree {
        let start = self.start_at(index);
        let end_index = self.end_index(index);
        let mut children = Vec::new();
        let mut positions = Vec::new();
        let mut child = index + 4;
        while child < end_index {
            positions.push(self.start_at(child) - start);
            children.push(Subtree::Tree(self.node_to_tree(child)));
            child = self.end_index(child);
        }
        Tree::new(self.ty_at(index).clone(), children, positions, self.end_at(index) - start)
    }

    fn fmt_node(&self, index: usize, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let end_index = self.end_index(index);
        let mut children = String::new();
        let mut child = index + 4;
        while child < end_index {
            let text = BufferNode { buffer: self, index: child }.to_string();
            if !text.is_empty() {
                if !children.is_empty() {
                    children.push(',');
                }
                children.push_str(&text);
            }
            child = self.end_index(child);
        }
        write_node(f, self.ty_at(index), &children)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        triomphe::Arc::ptr_eq(&self.0, &other.0)
    }
}

struct BufferNode<'a> {
    buffer: &'a TreeBuffer,
    index: usize,
}

impl fmt::Display for BufferNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.buffer.fmt_node(self.index, f)
    }
}

impl fmt::Display for TreeBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut index = 0;
        let mut first = true;
        while index < self.len() {
            let text = BufferNode { buffer: self, index }.to_string();
            if !text.is_empty() {
                if !first {
                    f.write_str(",")?;
                }
                f.write_str(&text)?;
                first = false;
            }
            index = self.end_index(index);
        }
        Ok(())
    }
}

impl fmt::Debug for TreeBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TreeBuffer({self})")
    }
}
