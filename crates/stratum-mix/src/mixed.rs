use std::collections::VecDeque;
use std::sync::Arc;

use stratum_errors::{Error, Result};
use stratum_inputs::{Input, TextRange, TextSize, check_position};
use stratum_tree::{MountedTree, PartialParse, Parser, Tree, TreeCursor, TreeFragment};
use tracing::{debug, trace};

use crate::mount::{Mount, collect_mounts, mount_all};
use crate::skipping::SkippingParser;

/// Decides, for a node of the host tree, whether its content belongs to
/// another language.
pub type NestFn = dyn Fn(&TreeCursor, &dyn Input) -> Option<NestedParse> + Send + Sync;

/// How to parse the content of a host node.
#[derive(Clone)]
pub struct NestedParse {
    parser: Arc<dyn Parser>,
    overlay: Option<Vec<TextRange>>,
}

impl NestedParse {
    /// Parses the whole node with `parser`. The result replaces the node's
    /// children.
    pub fn new(parser: Arc<dyn Parser>) -> Self {
        Self { parser, overlay: None }
    }

    /// Parses only `ranges` of the node, given relative to its start. The
    /// host's children stay in place and the result is reachable through
    /// [`Tree::resolve_inner`].
    pub fn overlay(parser: Arc<dyn Parser>, ranges: Vec<TextRange>) -> Self {
        Self { parser, overlay: Some(ranges) }
    }

    /// Leaves the node's content unparsed.
    pub fn skipping() -> Self {
        Self::new(Arc::new(SkippingParser))
    }
}

/// Wraps `host` so that nodes picked by `nest` get a nested tree mounted.
pub fn parse_mixed<F>(host: Arc<dyn Parser>, nest: F) -> MixedParser
where
    F: Fn(&TreeCursor, &dyn Input) -> Option<NestedParse> + Send + Sync + 'static,
{
    MixedParser { host, nest: Arc::new(nest) }
}

#[derive(Clone)]
pub struct MixedParser {
    host: Arc<dyn Parser>,
    nest: Arc<NestFn>,
}

impl Parser for MixedParser {
    fn create_parse<'a>(
        &self,
        input: &'a dyn Input,
        fragments: &[TreeFragment],
        ranges: &[TextRange],
    ) -> Result<Box<dyn PartialParse + 'a>> {
        let host = self.host.create_parse(input, fragments, ranges)?;
        let mut old_mounts = Vec::new();
        for (index, fragment) in fragments.iter().enumerate() {
            let mut found = Vec::new();
            collect_mounts(&fragment.tree, 0, &mut found);
            old_mounts.extend(found.into_iter().map(|mount| (index, mount)));
        }
        Ok(Box::new(MixedParse {
            input,
            nest: self.nest.clone(),
            fragments: fragments.to_vec(),
            old_mounts,
            host_start: ranges.first().map_or(0, |r| u32::from(r.start())),
            host: Some(host),
            host_tree: None,
            pending: VecDeque::new(),
            active: None,
            mounts: Vec::new(),
            stopped_at: None,
        }))
    }
}

struct Pending {
    from: u32,
    to: u32,
    ty: u16,
    nested: NestedParse,
}

struct Active<'a> {
    target: Pending,
    parse: Box<dyn PartialParse + 'a>,
}

/// A mixed parse in progress. Runs the host parse to completion, then the
/// nested parses one after the other.
pub struct MixedParse<'a> {
    input: &'a dyn Input,
    nest: Arc<NestFn>,
    fragments: Vec<TreeFragment>,
    old_mounts: Vec<(usize, Mount)>,
    host_start: u32,
    host: Option<Box<dyn PartialParse + 'a>>,
    host_tree: Option<Tree>,
    pending: VecDeque<Pending>,
    active: Option<Active<'a>>,
    mounts: Vec<Mount>,
    stopped_at: Option<u32>,
}

impl MixedParse<'_> {
    fn start_nested(&mut self, target: Pending) -> Result<()> {
        if let Some(mounted) = self.reusable_mount(&target) {
            trace!(from = target.from, to = target.to, "reusing mounted tree");
            self.mounts.push(Mount { from: target.from, to: target.to, ty: target.ty, mounted });
            return Ok(());
        }

        let ranges = match &target.nested.overlay {
            None => vec![TextRange::new(TextSize::new(target.from), TextSize::new(target.to))],
            Some(overlay) => {
                let length = target.to - target.from;
                let mut ranges = Vec::with_capacity(overlay.len());
                for range in overlay {
                    if u32::from(range.end()) > length {
                        return Err(Error::InvalidRanges(format!(
                            "overlay range {range:?} extends past its node ({length})"
                        )));
                    }
                    ranges.push(*range + TextSize::new(target.from));
                }
                ranges
            }
        };
        let ranges: Vec<_> = ranges.into_iter().filter(|r| !r.is_empty()).collect();
        if ranges.is_empty() {
            return Ok(());
        }

        let fragments = self.inner_fragments(&target);
        let mut parse = target.nested.parser.create_parse(self.input, &fragments, &ranges)?;
        let (start, end) = (u32::from(ranges[0].start()), u32::from(ranges[ranges.len() - 1].end()));
        if let Some(stop) = self.stopped_at.filter(|&stop| stop < end) {
            parse.stop_at(stop.max(start))?;
        }
        debug!(from = target.from, to = target.to, reused = fragments.len(), "starting nested parse");
        self.active = Some(Active { target, parse });
        Ok(())
    }

    /// Finds an old mount for an unchanged node of the same type, parsed by
    /// the same parser.
    fn reusable_mount(&self, target: &Pending) -> Option<MountedTree> {
        self.old_mounts.iter().find_map(|(index, old)| {
            let fragment = &self.fragments[*index];
            let inside = fragment.from <= target.from && target.to <= fragment.to;
            let from = i64::from(target.from) + fragment.offset;
            let to = i64::from(target.to) + fragment.offset;
            let same = inside
                && old.ty == target.ty
                && i64::from(old.from) == from
                && i64::from(old.to) == to
                && Arc::ptr_eq(old.mounted.parser(), &target.nested.parser);
            same.then(|| old.mounted.clone())
        })
    }

    /// Fragments of old nested trees from the same parser that overlap the
    /// target, addressed relative to where each old tree started.
    fn inner_fragments(&self, target: &Pending) -> Vec<TreeFragment> {
        let mut result = Vec::new();
        for (index, old) in &self.old_mounts {
            if !Arc::ptr_eq(old.mounted.parser(), &target.nested.parser) {
                continue;
            }
            let fragment = &self.fragments[*index];
            let old_inner_start =
                old.from + old.mounted.overlay().and_then(|o| o.first()).map_or(0, |r| u32::from(r.start()));
            let old_from = i64::from(old_inner_start) - fragment.offset;
            let old_to = old_from + i64::from(old.mounted.tree().length());
            let from = old_from.max(i64::from(fragment.from)).max(i64::from(target.from));
            let to = old_to.min(i64::from(fragment.to)).min(i64::from(target.to));
            if from >= to {
                continue;
            }
            let (Ok(from), Ok(to)) = (u32::try_from(from), u32::try_from(to)) else { continue };
            result.push(TreeFragment::new(
                from,
                to,
                old.mounted.tree().clone(),
                fragment.offset - i64::from(old_inner_start),
                fragment.open_start() || i64::from(from) > old_from,
                fragment.open_end() || i64::from(to) < old_to,
            ));
        }
        result.sort_by_key(|f| f.from);
        result.dedup_by(|later, kept| later.from < kept.to);
        result
    }
}

fn find_nested(tree: &Tree, start: u32, nest: &NestFn, input: &dyn Input) -> VecDeque<Pending> {
    let mut found = VecDeque::new();
    tree.iterate(
        0,
        tree.length(),
        |node| match nest(node, input) {
            Some(nested) => {
                found.push_back(Pending {
                    from: start + node.from(),
                    to: start + node.to(),
                    ty: node.ty().id(),
                    nested,
                });
                false
            }
            None => true,
        },
        |_| {},
    );
    found
}

impl PartialParse for MixedParse<'_> {
    fn advance(&mut self) -> Result<Option<Tree>> {
        if let Some(host) = &mut self.host {
            if let Some(tree) = host.advance()? {
                self.host = None;
                self.pending = find_nested(&tree, self.host_start, &*self.nest, self.input);
                debug!(nested = self.pending.len(), "host parse finished");
                self.host_tree = Some(tree);
            }
            return Ok(None);
        }

        if let Some(active) = &mut self.active {
            if let Some(tree) = active.parse.advance()? {
                if let Some(Active { target, .. }) = self.active.take() {
                    let mounted = MountedTree::new(tree, target.nested.overlay, target.nested.parser);
                    self.mounts.push(Mount { from: target.from, to: target.to, ty: target.ty, mounted });
                }
            }
            return Ok(None);
        }

        if let Some(target) = self.pending.pop_front() {
            self.start_nested(target)?;
            return Ok(None);
        }

        Ok(self.host_tree.as_ref().map(|host| mount_all(host, self.host_start, &self.mounts)))
    }

    fn parsed_pos(&self) -> u32 {
        if let Some(host) = &self.host {
            return host.parsed_pos();
        }
        if let Some(active) = &self.active {
            return active.parse.parsed_pos();
        }
        if let Some(next) = self.pending.front() {
            return next.from;
        }
        self.host_tree.as_ref().map_or(self.host_start, |tree| self.host_start + tree.length())
    }

    fn stop_at(&mut self, pos: u32) -> Result<()> {
        check_position(pos, self.input.len())?;
        if let Some(current) = self.stopped_at {
            if pos > current {
                return Err(Error::StopAtMovedForward { current, requested: pos });
            }
        }
        self.stopped_at = Some(pos);
        if let Some(host) = &mut self.host {
            host.stop_at(pos)?;
        }
        if let Some(active) = &mut self.active {
            if active.parse.stopped_at().is_none_or(|stop| pos < stop) {
                active.parse.stop_at(pos.max(active.target.from))?;
            }
        }
        self.pending.retain(|p| p.from < pos);
        Ok(())
    }

    fn stopped_at(&self) -> Option<u32> {
        self.stopped_at
    }
}
