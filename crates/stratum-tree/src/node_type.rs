use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, LazyLock};

use crate::MountedTree;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct NodeFlags: u8 {
        /// The grammar's top node.
        const TOP = 1 << 0;
        /// Produced by a skip rule (whitespace, comments).
        const SKIPPED = 1 << 1;
        /// An error node.
        const ERROR = 1 << 2;
        /// Structural node that cursors step through by default.
        const ANONYMOUS = 1 << 3;
    }
}

struct NodeTypeData {
    name: Box<str>,
    id: u16,
    flags: NodeFlags,
    props: PropMap,
}

/// A kind of syntax node. Two node types are equal only if they are the same
/// object, so a type taken from one [`NodeSet`] never equals a type with the
/// same id from another set.
#[derive(Clone)]
pub struct NodeType(triomphe::Arc<NodeTypeData>);

static NONE: LazyLock<NodeType> =
    LazyLock::new(|| NodeType::define(0, "", NodeFlags::ANONYMOUS, PropMap::default()));

impl NodeType {
    /// Defines a node type. An empty name makes the type anonymous.
    pub fn define(id: u16, name: &str, mut flags: NodeFlags, props: PropMap) -> Self {
        if name.is_empty() {
            flags |= NodeFlags::ANONYMOUS;
        }
        Self(triomphe::Arc::new(NodeTypeData { name: name.into(), id, flags, props }))
    }

    /// The anonymous type used for synthetic grouping nodes.
    pub fn none() -> Self {
        NONE.clone()
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn id(&self) -> u16 {
        self.0.id
    }

    pub fn flags(&self) -> NodeFlags {
        self.0.flags
    }

    pub fn is_top(&self) -> bool {
        self.0.flags.contains(NodeFlags::TOP)
    }

    pub fn is_skipped(&self) -> bool {
        self.0.flags.contains(NodeFlags::SKIPPED)
    }

    pub fn is_error(&self) -> bool {
        self.0.flags.contains(NodeFlags::ERROR)
    }

    pub fn is_anonymous(&self) -> bool {
        self.0.flags.contains(NodeFlags::ANONYMOUS)
    }

    /// Checks the name, or one of the `group` prop entries.
    pub fn is(&self, name: &str) -> bool {
        if self.name() == name {
            return true;
        }
        self.prop(NodeProp::GROUP).is_some_and(|group| group.iter().any(|g| &**g == name))
    }

    pub fn prop<T: Send + Sync + 'static>(&self, prop: NodeProp<T>) -> Option<&T> {
        self.0.props.get(prop)
    }

    pub fn props(&self) -> &PropMap {
        &self.0.props
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        triomphe::Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for NodeType {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for NodeType {}

impl fmt::Debug for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name(), self.id())
    }
}

/// The node types of one grammar, indexed by id.
#[derive(Clone)]
pub struct NodeSet {
    types: Arc<[NodeType]>,
}

impl NodeSet {
    /// Every type's id must equal its index.
    pub fn new(types: Vec<NodeType>) -> Self {
        for (i, ty) in types.iter().enumerate() {
            assert_eq!(usize::from(ty.id()), i, "node type ids must match their index in the set");
        }
        Self { types: types.into() }
    }

    pub fn types(&self) -> &[NodeType] {
        &self.types
    }

    pub fn get(&self, id: u16) -> &NodeType {
        &self.types[usize::from(id)]
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<&NodeType> {
        self.types.iter().find(|ty| ty.name() == name)
    }

    /// Creates a copy of this set where `source` may attach a value of
    /// `prop` to every type. Types are always copied, so trees built with
    /// the old set will not match types of the new one.
    pub fn extend<T, F>(&self, prop: NodeProp<T>, source: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&NodeType) -> Option<T>,
    {
        let types = self
            .types
            .iter()
            .map(|ty| {
                let mut props = ty.props().clone();
                if let Some(value) = source(ty) {
                    props.insert(prop, value);
                }
                NodeType::define(ty.id(), ty.name(), ty.flags(), props)
            })
            .collect::<Vec<_>>();
        Self { types: types.into() }
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.types, &other.types)
    }
}

impl fmt::Debug for NodeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.types.iter()).finish()
    }
}

const PROP_CLOSED_BY: u32 = 0;
const PROP_OPENED_BY: u32 = 1;
const PROP_GROUP: u32 = 2;
const PROP_CONTEXT_HASH: u32 = 3;
const PROP_LOOK_AHEAD: u32 = 4;
const PROP_MOUNTED: u32 = 5;
const FIRST_USER_PROP: u32 = 16;

static NEXT_PROP: AtomicU32 = AtomicU32::new(FIRST_USER_PROP);

/// A typed key for metadata attached to node types or individual trees.
pub struct NodeProp<T> {
    id: u32,
    per_node: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for NodeProp<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for NodeProp<T> {}

impl<T> fmt::Debug for NodeProp<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeProp").field("id", &self.id).field("per_node", &self.per_node).finish()
    }
}

impl<T: Send + Sync + 'static> NodeProp<T> {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self { id: NEXT_PROP.fetch_add(1, Ordering::Relaxed), per_node: false, _marker: PhantomData }
    }

    /// A prop stored on tree instances rather than on node types.
    pub fn per_node() -> Self {
        Self { per_node: true, ..Self::new() }
    }

    const fn builtin(id: u32, per_node: bool) -> Self {
        Self { id, per_node, _marker: PhantomData }
    }

    pub fn id(self) -> u32 {
        self.id
    }

    pub fn is_per_node(self) -> bool {
        self.per_node
    }
}

impl NodeProp<Box<[Box<str>]>> {
    /// Names of the node types that close a bracket-like node.
    pub const CLOSED_BY: Self = Self::builtin(PROP_CLOSED_BY, false);
    /// Names of the node types that open a bracket-like node.
    pub const OPENED_BY: Self = Self::builtin(PROP_OPENED_BY, false);
    /// Extra names a node type answers to in [`NodeType::is`].
    pub const GROUP: Self = Self::builtin(PROP_GROUP, false);
}

impl NodeProp<u32> {
    /// Hash of the parse context a reused subtree was built in.
    pub const CONTEXT_HASH: Self = Self::builtin(PROP_CONTEXT_HASH, true);
    /// How far past its end the parser looked while building a tree.
    pub const LOOK_AHEAD: Self = Self::builtin(PROP_LOOK_AHEAD, true);
}

impl NodeProp<MountedTree> {
    /// A tree produced by another parser for this node's content.
    pub const MOUNTED: Self = Self::builtin(PROP_MOUNTED, true);
}

/// Values attached to a node type or a tree, keyed by [`NodeProp`].
#[derive(Clone, Default)]
pub struct PropMap {
    entries: Vec<(u32, Arc<dyn Any + Send + Sync>)>,
}

impl PropMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T: Send + Sync + 'static>(mut self, prop: NodeProp<T>, value: T) -> Self {
        self.insert(prop, value);
        self
    }

    pub fn insert<T: Send + Sync + 'static>(&mut self, prop: NodeProp<T>, value: T) {
        let value: Arc<dyn Any + Send + Sync> = Arc::new(value);
        match self.entries.iter_mut().find(|(id, _)| *id == prop.id) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((prop.id, value)),
        }
    }

    pub fn get<T: Send + Sync + 'static>(&self, prop: NodeProp<T>) -> Option<&T> {
        self.entries.iter().find(|(id, _)| *id == prop.id).and_then(|(_, value)| value.downcast_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for PropMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.iter().map(|(id, _)| id)).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_equality_is_identity() {
        let a = NodeType::define(1, "Number", NodeFlags::empty(), PropMap::new());
        let b = NodeType::define(1, "Number", NodeFlags::empty(), PropMap::new());
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn empty_name_is_anonymous() {
        let ty = NodeType::define(3, "", NodeFlags::empty(), PropMap::new());
        assert!(ty.is_anonymous());
        assert!(NodeType::none().is_anonymous());
    }

    #[test]
    fn props_are_typed() {
        let indent = NodeProp::<u32>::new();
        let group: Box<[Box<str>]> = vec!["Expression".into()].into();
        let ty = NodeType::define(
            0,
            "Call",
            NodeFlags::empty(),
            PropMap::new().with(indent, 4).with(NodeProp::GROUP, group),
        );
        assert_eq!(ty.prop(indent), Some(&4));
        assert!(ty.is("Call"));
        assert!(ty.is("Expression"));
        assert!(!ty.is("Statement"));
    }

    #[test]
    fn extend_copies_types() {
        let set = NodeSet::new(vec![
            NodeType::define(0, "A", NodeFlags::empty(), PropMap::new()),
            NodeType::define(1, "B", NodeFlags::empty(), PropMap::new()),
        ]);
        let weight = NodeProp::<u32>::new();
        let extended = set.extend(weight, |ty| (ty.name() == "B").then_some(7));
        assert_eq!(extended.get(1).prop(weight), Some(&7));
        assert_eq!(extended.get(0).prop(weight), None);
        assert_ne!(extended.get(0), set.get(0));
    }
}
