use stratum_tree::{MountedTree, NodeProp, Subtree, Tree};

/// A nested tree attached, or waiting to be attached, to the host node of
/// type `ty` spanning `from..to`.
pub(crate) struct Mount {
    pub(crate) from: u32,
    pub(crate) to: u32,
    pub(crate) ty: u16,
    pub(crate) mounted: MountedTree,
}

/// Rebuilds the path from `tree` down to every mount target, attaching the
/// mounted trees. Subtrees without targets are shared with the old tree;
/// buffers holding a target are expanded into tree nodes.
pub(crate) fn mount_all(tree: &Tree, offset: u32, mounts: &[Mount]) -> Tree {
    let end = offset + tree.length();
    if !mounts.iter().any(|m| m.from >= offset && m.to <= end) {
        return tree.clone();
    }
    if let Some(target) = mounts
        .iter()
        .find(|m| m.from == offset && m.to == end && m.ty == tree.ty().id() && !tree.ty().is_anonymous())
    {
        return tree.set_prop(NodeProp::MOUNTED, target.mounted.clone());
    }

    let mut children = Vec::with_capacity(tree.children().len());
    for (child, &pos) in tree.children().iter().zip(tree.positions()) {
        let from = offset + pos;
        let to = from + child.length();
        let has_target = mounts.iter().any(|m| m.from >= from && m.to <= to);
        children.push(match child {
            _ if !has_target => child.clone(),
            Subtree::Tree(child) => Subtree::Tree(mount_all(child, from, mounts)),
            Subtree::Buffer(buffer) => Subtree::Tree(mount_all(&buffer.to_tree(), from, mounts)),
        });
    }
    Tree::with_props(
        tree.ty().clone(),
        children,
        tree.positions().to_vec(),
        tree.length(),
        tree.props().clone(),
    )
}

/// Lists the mounts in `tree`. Does not look inside mounted trees.
pub(crate) fn collect_mounts(tree: &Tree, offset: u32, out: &mut Vec<Mount>) {
    if let Some(mounted) = tree.prop(NodeProp::MOUNTED) {
        out.push(Mount {
            from: offset,
            to: offset + tree.length(),
            ty: tree.ty().id(),
            mounted: mounted.clone(),
        });
        return;
    }
    for (child, &pos) in tree.children().iter().zip(tree.positions()) {
        if let Subtree::Tree(child) = child {
            collect_mounts(child, offset + pos, out);
        }
    }
}
